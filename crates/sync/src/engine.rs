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

//! The engine: owns every component and runs the one loop that mutates them.
//!
//! Nothing here is shared between threads. Link events, finished transfers, rollback timers, the
//! keepalive and outside commands are all funnelled through `step`, which handles exactly one of
//! them to completion before looking at the next.

use crate::materializer::SpriteMaterializer;
use crate::optimistic::OptimisticTracker;
use crate::render::{GridSpec, LightSpec, RenderEngine};
use crate::storage::StorageClient;
use crate::uploads::{
    DownloadStep, PendingUpload, TransferRequest, UploadCoordinator, UploadOutcome, UploadStep,
};
use bytes::Bytes;
use futures_util::FutureExt;
use std::str::FromStr;
use tabula_assets::{AssetCache, AssetMetadata, CacheStats};
use tabula_channel::{LinkEvent, MessageChannel, UnansweredRequest};
use tabula_common::{
    ClientMessage, ContentHash, CreateReply, Envelope, EventBus, MessageType, Scale,
    ServerEnvelope, ServerMessage, Size, SpriteDescriptor, SpriteId, SpriteUpdate, SyncConfig,
    SyncError, SyncEvent, TextureRef, Tint, WorldPosition,
};
use tokio::select;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

const DOWNLOADED_MIME_TYPE: &str = "application/octet-stream";

/// A local file dropped onto the table.
#[derive(Clone, Debug)]
pub struct DroppedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
    pub position: WorldPosition,
    pub size: Size,
    pub layer: String,
}

/// Requests from outside the engine loop.
pub enum EngineCommand {
    DropFile {
        file: DroppedFile,
        reply: oneshot::Sender<Result<SpriteId, SyncError>>,
    },
    InsertSprite {
        sprite: SpriteDescriptor,
        reply: oneshot::Sender<Result<SpriteId, SyncError>>,
    },
    UploadAsset {
        upload: PendingUpload,
        reply: oneshot::Sender<Result<oneshot::Receiver<UploadOutcome>, SyncError>>,
    },
    UpdateSprite {
        sprite_id: SpriteId,
        update: SpriteUpdate,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    RemoveSprite {
        sprite_id: SpriteId,
        reply: oneshot::Sender<Result<bool, SyncError>>,
    },
    SetGrid(GridSpec),
    AddLight(LightSpec),
    CleanupCache {
        reply: oneshot::Sender<Vec<ContentHash>>,
    },
    CacheStats {
        reply: oneshot::Sender<CacheStats>,
    },
    Shutdown,
}

/// A handle for talking to a running engine from other tasks.
#[derive(Clone)]
pub struct EngineHandle {
    sender: UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, SyncError> {
        let (reply, receive) = oneshot::channel();
        self.sender
            .send(command(reply))
            .map_err(|_| SyncError::ChannelClosed)?;
        receive.await.map_err(|_| SyncError::ChannelClosed)
    }

    /// Show a local file on the table right away and make sure the server ends up with it.
    /// Returns the provisional sprite's id.
    pub async fn drop_file(&self, file: DroppedFile) -> Result<SpriteId, SyncError> {
        self.request(|reply| EngineCommand::DropFile { file, reply })
            .await?
    }

    pub async fn insert_sprite(&self, sprite: SpriteDescriptor) -> Result<SpriteId, SyncError> {
        self.request(|reply| EngineCommand::InsertSprite { sprite, reply })
            .await?
    }

    /// Upload without placing anything, waiting for the handshake to finish.
    pub async fn upload_asset(&self, upload: PendingUpload) -> Result<UploadOutcome, SyncError> {
        let outcome = self
            .request(|reply| EngineCommand::UploadAsset { upload, reply })
            .await??;
        outcome.await.map_err(|_| SyncError::ChannelClosed)
    }

    pub async fn update_sprite(
        &self,
        sprite_id: SpriteId,
        update: SpriteUpdate,
    ) -> Result<(), SyncError> {
        self.request(|reply| EngineCommand::UpdateSprite {
            sprite_id,
            update,
            reply,
        })
        .await?
    }

    pub async fn remove_sprite(&self, sprite_id: SpriteId) -> Result<bool, SyncError> {
        self.request(|reply| EngineCommand::RemoveSprite { sprite_id, reply })
            .await?
    }

    pub fn set_grid(&self, grid: GridSpec) -> Result<(), SyncError> {
        self.sender
            .send(EngineCommand::SetGrid(grid))
            .map_err(|_| SyncError::ChannelClosed)
    }

    pub fn add_light(&self, light: LightSpec) -> Result<(), SyncError> {
        self.sender
            .send(EngineCommand::AddLight(light))
            .map_err(|_| SyncError::ChannelClosed)
    }

    pub async fn cleanup_cache(&self) -> Result<Vec<ContentHash>, SyncError> {
        self.request(|reply| EngineCommand::CleanupCache { reply })
            .await
    }

    pub async fn cache_stats(&self) -> Result<CacheStats, SyncError> {
        self.request(|reply| EngineCommand::CacheStats { reply })
            .await
    }

    pub fn shutdown(&self) -> Result<(), SyncError> {
        self.sender
            .send(EngineCommand::Shutdown)
            .map_err(|_| SyncError::ChannelClosed)
    }
}

enum TransferUpdate {
    Progress {
        hash: ContentHash,
        percent: u8,
    },
    Uploaded {
        hash: ContentHash,
        result: Result<(), SyncError>,
    },
    Downloaded {
        hash: ContentHash,
        result: Result<Bytes, SyncError>,
    },
}

async fn keepalive_due(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

pub struct SyncEngine<R: RenderEngine, S: StorageClient> {
    events: EventBus,
    channel: MessageChannel,
    cache: AssetCache,
    uploads: UploadCoordinator,
    tracker: OptimisticTracker,
    materializer: SpriteMaterializer<R>,
    storage: S,
    transfers_tx: UnboundedSender<TransferUpdate>,
    transfers_rx: UnboundedReceiver<TransferUpdate>,
    commands_tx: UnboundedSender<EngineCommand>,
    commands_rx: UnboundedReceiver<EngineCommand>,
}

impl<R: RenderEngine, S: StorageClient> SyncEngine<R, S> {
    pub fn new(config: SyncConfig, renderer: R, storage: S) -> Result<Self, SyncError> {
        config.validate()?;
        let events = EventBus::new();
        let (transfers_tx, transfers_rx) = unbounded_channel();
        let (commands_tx, commands_rx) = unbounded_channel();
        Ok(Self {
            channel: MessageChannel::new(config.channel.clone(), events.clone()),
            cache: AssetCache::new(config.cache.clone()),
            uploads: UploadCoordinator::new(events.clone(), config.session_context.clone()),
            tracker: OptimisticTracker::new(config.optimistic.rollback_timeout, events.clone()),
            materializer: SpriteMaterializer::new(
                renderer,
                config.sprites.placeholder_texture.clone(),
                events.clone(),
            ),
            events,
            storage,
            transfers_tx,
            transfers_rx,
            commands_tx,
            commands_rx,
        })
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            sender: self.commands_tx.clone(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Start connecting to the server. Sends made before the link is up are queued.
    pub fn connect(&mut self, url: &str) {
        self.channel.connect(url);
        self.settle_unanswered();
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    pub fn tracker(&self) -> &OptimisticTracker {
        &self.tracker
    }

    pub fn materializer(&self) -> &SpriteMaterializer<R> {
        &self.materializer
    }

    /// Run until shut down.
    pub async fn run(mut self) {
        info!("Sync engine running");
        while self.step().await {}
        self.channel.disconnect();
        info!("Sync engine stopped");
    }

    /// Wait for one thing to happen and deal with it. Returns false once shutdown is requested.
    pub async fn step(&mut self) -> bool {
        let keepalive_at = self.channel.keepalive_deadline();
        let timers_armed = self.tracker.has_timers();
        select! {
            Some(event) = self.channel.next_link_event() => self.on_link_event(event),
            Some(update) = self.transfers_rx.recv() => self.on_transfer(update),
            Some(temp_id) = self.tracker.next_expired(), if timers_armed => {
                self.on_rollback_timer(temp_id)
            }
            _ = keepalive_due(keepalive_at) => {
                self.channel.keepalive_tick(Instant::now());
                self.settle_unanswered();
            }
            Some(command) = self.commands_rx.recv() => return self.on_command(command),
        }
        true
    }

    /// Handle everything that is ready without waiting on timers. Spawned transfers get a chance
    /// to run in between.
    pub async fn settle(&mut self) {
        let mut idle_rounds = 0;
        while idle_rounds < 3 {
            tokio::task::yield_now().await;
            match self.step().now_or_never() {
                Some(true) => idle_rounds = 0,
                Some(false) => return,
                None => idle_rounds += 1,
            }
        }
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        if let Some(envelope) = self.channel.handle_link_event(event) {
            self.on_server_message(envelope);
        }
        self.settle_unanswered();
    }

    /// Give up on requests whose link went away before the server answered them.
    fn settle_unanswered(&mut self) {
        for request in self.channel.take_unanswered() {
            let UnansweredRequest {
                message_type,
                correlation_key,
            } = request;
            let error = SyncError::TransportFailure(format!(
                "connection lost before the server answered {message_type}"
            ));
            match message_type {
                MessageType::AssetUploadRequest | MessageType::AssetUploadConfirm => {
                    let Ok(hash) = ContentHash::from_str(&correlation_key) else {
                        continue;
                    };
                    let step = self.uploads.reply_lost(hash, error);
                    self.apply_upload_step(step);
                }
                MessageType::AssetDownloadRequest => {
                    let Ok(hash) = ContentHash::from_str(&correlation_key) else {
                        continue;
                    };
                    if self.uploads.download_lost(hash, error).is_some() {
                        self.materializer.asset_failed(hash);
                    }
                }
                MessageType::SpriteCreate => {
                    let temp_id = SpriteId::from(correlation_key);
                    self.tracker
                        .rollback(&temp_id, &error.to_string(), &mut self.materializer);
                }
                _ => {}
            }
        }
    }

    fn on_server_message(&mut self, envelope: ServerEnvelope) {
        let Envelope {
            message,
            correlation_key,
            ..
        } = envelope;
        let message_type = message.message_type();
        if let ServerMessage::Error { message } = message {
            warn!(%message, "Server reported an error");
            self.events.publish(SyncEvent::ProtocolError {
                message_type: None,
                reason: message,
            });
            return;
        }
        match self.route(message, correlation_key.as_deref()) {
            Ok(()) => {
                if message_type != MessageType::Pong {
                    self.events
                        .publish(SyncEvent::ProtocolSuccess { message_type });
                }
            }
            Err(e) if e.is_benign() => {
                warn!(%message_type, ?correlation_key, error = %e, "Ignoring server message");
            }
            Err(e) => self.report(Some(message_type), e),
        }
    }

    fn report(&self, message_type: Option<MessageType>, e: SyncError) {
        error!(?message_type, error = %e, "Failed to apply server message");
        self.events.publish(SyncEvent::ProtocolError {
            message_type,
            reason: e.to_string(),
        });
    }

    fn route(
        &mut self,
        message: ServerMessage,
        correlation_key: Option<&str>,
    ) -> Result<(), SyncError> {
        match message {
            ServerMessage::AssetUploadResponse(reply) => {
                let step = self.uploads.handle_upload_response(correlation_key, reply)?;
                self.apply_upload_step(step);
            }
            ServerMessage::AssetUploadConfirmed(reply) => {
                let step = self.uploads.handle_confirm(correlation_key, reply)?;
                self.apply_upload_step(step);
            }
            ServerMessage::AssetDownloadResponse(reply) => {
                match self
                    .uploads
                    .handle_download_response(correlation_key, reply)?
                {
                    DownloadStep::Fetch { hash, url } => self.start_download(hash, url),
                    DownloadStep::Missing { hash, .. } => {
                        self.materializer.asset_failed(hash);
                    }
                }
            }
            ServerMessage::SpriteCreateResponse(reply) => {
                let temp_id = SpriteId::from(
                    correlation_key
                        .ok_or_else(|| SyncError::CorrelationMiss("<none>".to_string()))?,
                );
                self.on_create_reply(temp_id, reply)?;
            }
            ServerMessage::SpriteCreated { sprite } => {
                let awaiting = self.materializer.materialize(sprite, &mut self.cache)?;
                self.fetch_missing(awaiting);
            }
            ServerMessage::SpriteUpdate {
                sprite_id,
                changed_fields,
                ..
            } => {
                let awaiting =
                    self.materializer
                        .update(&sprite_id, &changed_fields, &mut self.cache)?;
                self.fetch_missing(awaiting);
            }
            ServerMessage::SpriteRemove { sprite_id } => {
                self.materializer.remove(&sprite_id);
            }
            ServerMessage::Pong { .. } | ServerMessage::Error { .. } => {}
        }
        Ok(())
    }

    fn on_create_reply(&mut self, temp_id: SpriteId, reply: CreateReply) -> Result<(), SyncError> {
        match reply {
            CreateReply::Created { sprite_id, sprite } => {
                let Some(provisional) = self.tracker.provisional(&temp_id) else {
                    return Err(SyncError::CorrelationMiss(temp_id.to_string()));
                };
                // Without an echoed descriptor, ours stands apart from the id.
                let authoritative = sprite
                    .unwrap_or_else(|| provisional.clone())
                    .with_id(sprite_id);
                let awaiting = self.tracker.reconcile(
                    &temp_id,
                    authoritative,
                    &mut self.materializer,
                    &mut self.cache,
                )?;
                self.fetch_missing(awaiting);
            }
            CreateReply::Rejected { error } => {
                if !self
                    .tracker
                    .rollback(&temp_id, &error, &mut self.materializer)
                {
                    return Err(SyncError::CorrelationMiss(temp_id.to_string()));
                }
            }
        }
        Ok(())
    }

    fn apply_upload_step(&mut self, step: UploadStep) {
        match step {
            UploadStep::Waiting => {}
            UploadStep::Transfer(transfer) => self.start_upload(transfer),
            UploadStep::Resolved { hash, released, .. } => {
                for temp_id in released {
                    match self.tracker.commit(&temp_id, &mut self.channel) {
                        Ok(()) => {}
                        // Already rolled back by its timer while the upload ran.
                        Err(SyncError::CorrelationMiss(_)) => {
                            debug!(%temp_id, %hash, "Asset resolved after its sprite was withdrawn");
                        }
                        Err(e) => {
                            self.tracker
                                .rollback(&temp_id, &e.to_string(), &mut self.materializer);
                        }
                    }
                }
                self.materializer.asset_resolved(hash, &mut self.cache);
            }
            UploadStep::Failed {
                reason, discarded, ..
            } => {
                for temp_id in discarded {
                    self.tracker
                        .rollback(&temp_id, &reason, &mut self.materializer);
                }
            }
        }
    }

    fn start_upload(&self, transfer: TransferRequest) {
        let TransferRequest {
            hash,
            target,
            bytes,
            content_type,
        } = transfer;
        let storage = self.storage.clone();
        let finished = self.transfers_tx.clone();
        let progress = self.transfers_tx.clone();
        tokio::spawn(async move {
            let result = storage
                .put(target, hash, bytes, content_type, move |percent| {
                    let _ = progress.send(TransferUpdate::Progress { hash, percent });
                })
                .await;
            let _ = finished.send(TransferUpdate::Uploaded { hash, result });
        });
    }

    fn start_download(&self, hash: ContentHash, url: String) {
        let storage = self.storage.clone();
        let finished = self.transfers_tx.clone();
        tokio::spawn(async move {
            let result = storage.get(url).await;
            let _ = finished.send(TransferUpdate::Downloaded { hash, result });
        });
    }

    /// Ask the server for an asset a sprite is waiting on.
    fn fetch_missing(&mut self, awaiting: Option<ContentHash>) {
        let Some(hash) = awaiting else {
            return;
        };
        let asset_id = self
            .uploads
            .asset_id(&hash)
            .map(str::to_string)
            .unwrap_or_else(|| hash.to_string());
        if let Err(e) = self
            .uploads
            .request_download(asset_id, hash, &mut self.channel)
        {
            self.report(Some(MessageType::AssetDownloadRequest), e);
        }
    }

    fn on_transfer(&mut self, update: TransferUpdate) {
        match update {
            TransferUpdate::Progress { hash, percent } => {
                self.uploads.transfer_progress(hash, percent);
            }
            TransferUpdate::Uploaded { hash, result } => {
                match self
                    .uploads
                    .transfer_finished(hash, result, &mut self.channel)
                {
                    Ok(step) => self.apply_upload_step(step),
                    Err(e) => warn!(%hash, error = %e, "Transfer finished for unknown upload"),
                }
            }
            TransferUpdate::Downloaded { hash, result } => self.on_downloaded(hash, result),
        }
    }

    fn on_downloaded(&mut self, hash: ContentHash, result: Result<Bytes, SyncError>) {
        let Some((asset_id, url)) = self.uploads.download_finished(&hash) else {
            warn!(%hash, "Download finished for an asset we were not fetching");
            return;
        };
        let stored = result.and_then(|bytes| {
            let mut metadata = AssetMetadata::new(asset_id, DOWNLOADED_MIME_TYPE);
            if let Some(url) = url {
                metadata = metadata.with_origin(url);
            }
            self.cache.put(hash, bytes, metadata)
        });
        match stored {
            Ok(_) => {
                debug!(%hash, "Asset downloaded");
                self.events.publish(SyncEvent::AssetDownloaded { hash });
                self.materializer.asset_resolved(hash, &mut self.cache);
            }
            Err(e) => {
                error!(%hash, error = %e, "Could not obtain asset");
                self.events.publish(SyncEvent::AssetMissing {
                    hash,
                    reason: e.to_string(),
                });
                self.materializer.asset_failed(hash);
            }
        }
    }

    fn on_rollback_timer(&mut self, temp_id: SpriteId) {
        let reason = SyncError::Timeout(temp_id.clone()).to_string();
        self.tracker
            .rollback(&temp_id, &reason, &mut self.materializer);
    }

    fn on_command(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::DropFile { file, reply } => {
                let _ = reply.send(self.drop_file(file));
            }
            EngineCommand::InsertSprite { sprite, reply } => {
                let _ = reply.send(self.insert_sprite(sprite));
            }
            EngineCommand::UploadAsset { upload, reply } => {
                let _ = reply.send(self.upload_asset(upload));
            }
            EngineCommand::UpdateSprite {
                sprite_id,
                update,
                reply,
            } => {
                let _ = reply.send(self.update_sprite(&sprite_id, update));
            }
            EngineCommand::RemoveSprite { sprite_id, reply } => {
                let _ = reply.send(self.remove_sprite(&sprite_id));
            }
            EngineCommand::SetGrid(grid) => self.materializer.set_grid(&grid),
            EngineCommand::AddLight(light) => self.materializer.add_light(&light),
            EngineCommand::CleanupCache { reply } => {
                let _ = reply.send(self.cache.cleanup());
            }
            EngineCommand::CacheStats { reply } => {
                let _ = reply.send(self.cache.stats().clone());
            }
            EngineCommand::Shutdown => {
                info!("Sync engine shutting down");
                return false;
            }
        }
        true
    }

    /// Place a local file: cache its bytes, show a provisional sprite at once, and create it on
    /// the server after the server holds the asset.
    pub fn drop_file(&mut self, file: DroppedFile) -> Result<SpriteId, SyncError> {
        let DroppedFile {
            name,
            mime_type,
            bytes,
            position,
            size,
            layer,
        } = file;
        let hash = ContentHash::of(&bytes);
        self.cache.put(
            hash,
            bytes.clone(),
            AssetMetadata::new(name.clone(), mime_type.clone()),
        )?;

        let descriptor = SpriteDescriptor {
            id: SpriteId::new(""),
            position,
            size,
            scale: Scale::default(),
            rotation: 0.0,
            layer,
            texture: TextureRef::Asset(hash),
            tint: Tint::WHITE,
        };
        let temp_id = OptimisticTracker::mint_temp_id();
        self.tracker.stage(
            temp_id.clone(),
            descriptor,
            &mut self.materializer,
            &mut self.cache,
        )?;

        let pending = PendingUpload {
            content_hash: hash,
            raw_bytes: bytes,
            target_world_position: Some(position),
            display_name: name,
            mime_type,
        };
        if let Err(e) = self.uploads.request_upload(pending, &mut self.channel) {
            self.tracker
                .rollback(&temp_id, &e.to_string(), &mut self.materializer);
            return Err(e);
        }
        if let Err(ready) = self.uploads.defer(hash, temp_id.clone()) {
            // The server already holds these bytes.
            if let Err(e) = self.tracker.commit(&ready, &mut self.channel) {
                self.tracker
                    .rollback(&ready, &e.to_string(), &mut self.materializer);
                return Err(e);
            }
        }
        Ok(temp_id)
    }

    /// Cache `upload`'s bytes and make sure the server ends up holding them. The bytes must match
    /// the claimed hash.
    pub fn upload_asset(
        &mut self,
        upload: PendingUpload,
    ) -> Result<oneshot::Receiver<UploadOutcome>, SyncError> {
        self.cache.put(
            upload.content_hash,
            upload.raw_bytes.clone(),
            AssetMetadata::new(upload.display_name.clone(), upload.mime_type.clone()),
        )?;
        self.uploads.request_upload(upload, &mut self.channel)
    }

    /// Place a sprite whose texture needs no upload (compendium art, an asset already on the
    /// server).
    pub fn insert_sprite(&mut self, sprite: SpriteDescriptor) -> Result<SpriteId, SyncError> {
        self.insert_sprite_as(OptimisticTracker::mint_temp_id(), sprite)
    }

    /// As `insert_sprite`, under a caller-chosen provisional id.
    pub fn insert_sprite_as(
        &mut self,
        temp_id: SpriteId,
        sprite: SpriteDescriptor,
    ) -> Result<SpriteId, SyncError> {
        let temp_id = self.tracker.begin_optimistic_with(
            temp_id,
            sprite,
            &mut self.materializer,
            &mut self.cache,
            &mut self.channel,
        )?;
        if self.materializer.is_awaiting_texture(&temp_id) {
            let awaiting = self
                .materializer
                .sprite(&temp_id)
                .and_then(|s| s.texture.asset_hash());
            self.fetch_missing(awaiting);
        }
        Ok(temp_id)
    }

    /// Apply a local edit and tell the server about it.
    pub fn update_sprite(
        &mut self,
        sprite_id: &SpriteId,
        update: SpriteUpdate,
    ) -> Result<(), SyncError> {
        if self.tracker.is_pending(sprite_id) {
            return Err(SyncError::ReentrantUpdate(sprite_id.clone()));
        }
        let awaiting = self
            .materializer
            .update(sprite_id, &update, &mut self.cache)?;
        self.fetch_missing(awaiting);
        self.channel.send_message(ClientMessage::SpriteUpdate {
            sprite_id: sprite_id.clone(),
            operation: update.operation(),
            changed_fields: update,
        })
    }

    /// Remove a sprite locally and on the server. False if it was already gone.
    pub fn remove_sprite(&mut self, sprite_id: &SpriteId) -> Result<bool, SyncError> {
        if self.tracker.is_pending(sprite_id) {
            return Err(SyncError::ReentrantUpdate(sprite_id.clone()));
        }
        if !self.materializer.remove(sprite_id) {
            return Ok(false);
        }
        self.channel.send_message(ClientMessage::SpriteRemove {
            sprite_id: sprite_id.clone(),
        })?;
        Ok(true)
    }

    pub fn set_grid(&mut self, grid: &GridSpec) {
        self.materializer.set_grid(grid);
    }

    pub fn add_light(&mut self, light: &LightSpec) {
        self.materializer.add_light(light);
    }

    /// Age out stale cache entries.
    pub fn cleanup_cache(&mut self) -> Vec<ContentHash> {
        self.cache.cleanup()
    }
}
