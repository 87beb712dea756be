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

//! Direct binary transfers to and from storage URLs handed out by the server.

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::future::Future;
use std::time::SystemTime;
use tabula_common::{ContentHash, SyncError, unix_timestamp_secs};
use tracing::{debug, trace};
use url::Url;

pub const CONTENT_HASH_HEADER: &str = "x-meta-content-hash";
pub const UPLOAD_TIMESTAMP_HEADER: &str = "x-meta-upload-timestamp";

/// Where asset bytes actually go. Implementations are cheap to clone and are moved into spawned
/// transfer tasks.
pub trait StorageClient: Clone + Send + Sync + 'static {
    /// PUT `bytes` to `target`, reporting progress as a percentage as it goes.
    fn put<P>(
        &self,
        target: String,
        hash: ContentHash,
        bytes: Bytes,
        content_type: String,
        progress: P,
    ) -> impl Future<Output = Result<(), SyncError>> + Send
    where
        P: Fn(u8) + Send + Sync + 'static;

    fn get(&self, url: String) -> impl Future<Output = Result<Bytes, SyncError>> + Send;
}

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

fn transport(e: impl std::fmt::Display) -> SyncError {
    SyncError::TransportFailure(e.to_string())
}

fn percent_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done as u64 * 100) / total as u64).min(100) as u8
}

/// Storage over plain HTTP(S).
#[derive(Clone)]
pub struct HttpStorage {
    client: reqwest::Client,
}

impl HttpStorage {
    pub fn new() -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tabula/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(transport)?;
        Ok(Self { client })
    }
}

impl StorageClient for HttpStorage {
    async fn put<P>(
        &self,
        target: String,
        hash: ContentHash,
        bytes: Bytes,
        content_type: String,
        progress: P,
    ) -> Result<(), SyncError>
    where
        P: Fn(u8) + Send + Sync + 'static,
    {
        let url = Url::parse(&target).map_err(transport)?;
        let total = bytes.len();
        let chunks: Vec<Bytes> = (0..total)
            .step_by(UPLOAD_CHUNK_BYTES)
            .map(|start| bytes.slice(start..(start + UPLOAD_CHUNK_BYTES).min(total)))
            .collect();
        let mut sent = 0;
        // Progress is counted as the client pulls each chunk into the request body.
        let body = stream::iter(chunks).map(move |chunk| {
            sent += chunk.len();
            progress(percent_of(sent, total));
            Ok::<_, std::io::Error>(chunk)
        });

        debug!(%hash, %url, size = total, "Uploading to storage");
        let response = self
            .client
            .put(url)
            .header(CONTENT_HASH_HEADER, hash.to_string())
            .header(
                UPLOAD_TIMESTAMP_HEADER,
                unix_timestamp_secs(SystemTime::now()).to_string(),
            )
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(transport)?;
        response.error_for_status().map_err(transport)?;
        trace!(%hash, "Upload accepted by storage");
        Ok(())
    }

    async fn get(&self, url: String) -> Result<Bytes, SyncError> {
        let url = Url::parse(&url).map_err(transport)?;
        debug!(%url, "Downloading from storage");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?;
        response.bytes().await.map_err(transport)
    }
}
