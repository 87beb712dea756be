// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use crate::args::Args;
use crate::log_renderer::LogRenderer;
use bytes::Bytes;
use clap::Parser;
use eyre::{Report, eyre};
use tabula_common::SyncEvent;
use tabula_sync::{DroppedFile, EngineHandle, HttpStorage, SyncEngine};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

mod args;
mod log_renderer;

async fn log_events(mut events: broadcast::Receiver<SyncEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => debug!(?event, "sync event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn drop_file(args: &Args, handle: &EngineHandle) -> Result<(), Report> {
    let Some(path) = args.drop_args.drop_file.as_ref() else {
        return Ok(());
    };
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| eyre!("Unable to read {:?}: {}", path, e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dropped".to_string());
    let file = DroppedFile {
        name,
        mime_type: args.drop_args.content_type(path),
        bytes: Bytes::from(bytes),
        position: args.drop_args.position(),
        size: args.drop_args.size(),
        layer: args.drop_args.layer.clone(),
    };
    match handle.drop_file(file).await {
        Ok(sprite_id) => info!(%sprite_id, ?path, "Placed provisional sprite"),
        Err(e) => error!(?path, "Unable to drop file: {}", e),
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let args: Args = Args::parse();

    tabula_common::tracing::init_tracing(args.debug)
        .map_err(|e| eyre!("Unable to configure logging: {}", e))?;

    let config = args.load_config()?;
    let storage = HttpStorage::new()?;
    let mut engine = SyncEngine::new(config, LogRenderer::new(), storage)?;
    engine.connect(&args.server_url);
    info!(url = %args.server_url, "Connecting");

    let handle = engine.handle();
    tokio::spawn(log_events(engine.events().subscribe()));
    let engine_task = tokio::spawn(engine.run());

    drop_file(&args, &handle).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    if let Err(e) = handle.shutdown() {
        warn!("Engine already stopped: {}", e);
    }
    engine_task.await?;
    Ok(())
}
