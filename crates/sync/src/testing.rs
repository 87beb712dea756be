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

//! Test doubles for exercising the engine without a renderer, a server or storage.

use crate::render::{GridSpec, IncrementalOp, LightSpec, RenderEngine};
use crate::storage::StorageClient;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tabula_channel::{LinkEvent, MessageChannel};
use tabula_common::{
    ClientEnvelope, ContentHash, Envelope, Scale, ServerMessage, SpriteDescriptor, SpriteId,
    SyncError, TextureRef, WorldPosition,
};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

#[derive(Clone, Debug, PartialEq)]
pub enum RenderCommand {
    AddSprite(SpriteDescriptor),
    UpdateSprite(SpriteDescriptor),
    RemoveSprite(SpriteId),
    UpdatePosition(SpriteId, WorldPosition),
    UpdateScale(SpriteId, Scale),
    UpdateRotation(SpriteId, f32),
    BindTexture(SpriteId, TextureRef),
    LoadTexture(ContentHash),
    AddLight(LightSpec),
    SetGrid(GridSpec),
}

/// Records every command it is given.
#[derive(Default)]
pub struct RecordingRenderer {
    commands: Vec<RenderCommand>,
    unsupported: HashSet<IncrementalOp>,
}

impl RecordingRenderer {
    /// A renderer lacking the given incremental operations.
    pub fn without(ops: &[IncrementalOp]) -> Self {
        Self {
            commands: vec![],
            unsupported: ops.iter().copied().collect(),
        }
    }

    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl RenderEngine for RecordingRenderer {
    fn add_sprite(&mut self, sprite: &SpriteDescriptor) {
        self.commands.push(RenderCommand::AddSprite(sprite.clone()));
    }

    fn update_sprite(&mut self, sprite: &SpriteDescriptor) {
        self.commands
            .push(RenderCommand::UpdateSprite(sprite.clone()));
    }

    fn remove_sprite(&mut self, id: &SpriteId) {
        self.commands.push(RenderCommand::RemoveSprite(id.clone()));
    }

    fn update_position(&mut self, id: &SpriteId, position: WorldPosition) {
        self.commands
            .push(RenderCommand::UpdatePosition(id.clone(), position));
    }

    fn update_scale(&mut self, id: &SpriteId, scale: Scale) {
        self.commands
            .push(RenderCommand::UpdateScale(id.clone(), scale));
    }

    fn update_rotation(&mut self, id: &SpriteId, rotation: f32) {
        self.commands
            .push(RenderCommand::UpdateRotation(id.clone(), rotation));
    }

    fn bind_texture(&mut self, id: &SpriteId, texture: &TextureRef) {
        self.commands
            .push(RenderCommand::BindTexture(id.clone(), texture.clone()));
    }

    fn load_texture(&mut self, hash: ContentHash, _bytes: &[u8]) {
        self.commands.push(RenderCommand::LoadTexture(hash));
    }

    fn add_light(&mut self, light: &LightSpec) {
        self.commands.push(RenderCommand::AddLight(light.clone()));
    }

    fn set_grid(&mut self, grid: &GridSpec) {
        self.commands.push(RenderCommand::SetGrid(grid.clone()));
    }

    fn supports(&self, op: IncrementalOp) -> bool {
        !self.unsupported.contains(&op)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredPut {
    pub target: String,
    pub hash: ContentHash,
    pub content_type: String,
    pub size: usize,
}

#[derive(Default)]
struct MemoryStorageInner {
    objects: HashMap<String, Bytes>,
    puts: Vec<StoredPut>,
    failing: HashMap<String, String>,
}

/// Storage kept in memory. Clones share contents.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `url` fetchable.
    pub fn insert(&self, url: &str, bytes: Bytes) {
        let mut inner = self.inner.lock().unwrap();
        inner.objects.insert(url.to_string(), bytes);
    }

    /// Make transfers to or from `url` fail with `reason`.
    pub fn fail(&self, url: &str, reason: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.failing.insert(url.to_string(), reason.to_string());
    }

    pub fn puts(&self) -> Vec<StoredPut> {
        self.inner.lock().unwrap().puts.clone()
    }

    pub fn object(&self, url: &str) -> Option<Bytes> {
        self.inner.lock().unwrap().objects.get(url).cloned()
    }
}

impl StorageClient for MemoryStorage {
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
        let mut inner = self.inner.lock().unwrap();
        inner.puts.push(StoredPut {
            target: target.clone(),
            hash,
            content_type,
            size: bytes.len(),
        });
        if let Some(reason) = inner.failing.get(&target) {
            return Err(SyncError::TransportFailure(reason.clone()));
        }
        progress(50);
        progress(100);
        inner.objects.insert(target, bytes);
        Ok(())
    }

    async fn get(&self, url: String) -> Result<Bytes, SyncError> {
        let inner = self.inner.lock().unwrap();
        if let Some(reason) = inner.failing.get(&url) {
            return Err(SyncError::TransportFailure(reason.clone()));
        }
        inner
            .objects
            .get(&url)
            .cloned()
            .ok_or_else(|| SyncError::TransportFailure(format!("404 for {url}")))
    }
}

/// The server end of a channel's link, in memory.
pub struct Loopback {
    events: UnboundedSender<LinkEvent>,
    outbound: UnboundedReceiver<String>,
}

impl Loopback {
    /// Bring `channel`'s link up right away.
    pub fn attach(channel: &mut MessageChannel) -> Self {
        let (link, outbound) = unbounded_channel();
        channel.handle_link_event(LinkEvent::Up(link));
        Self {
            events: channel.link_events(),
            outbound,
        }
    }

    /// Announce a link to `channel`; it comes up when whoever drives the channel processes it.
    pub fn connect(channel: &MessageChannel) -> Self {
        let (link, outbound) = unbounded_channel();
        let events = channel.link_events();
        let _ = events.send(LinkEvent::Up(link));
        Self { events, outbound }
    }

    /// Everything the client has written since the last call.
    pub fn sent(&mut self) -> Vec<ClientEnvelope> {
        let mut sent = vec![];
        while let Ok(frame) = self.outbound.try_recv() {
            sent.push(ClientEnvelope::from_frame(&frame).unwrap());
        }
        sent
    }

    /// Deliver a server message, optionally as the reply to `correlation_key`.
    pub fn reply(&self, message: ServerMessage, correlation_key: Option<&str>) {
        let envelope = match correlation_key {
            Some(key) => Envelope::correlated(message, key),
            None => Envelope::new(message),
        };
        let _ = self
            .events
            .send(LinkEvent::Frame(envelope.to_frame().unwrap()));
    }

    pub fn broadcast(&self, message: ServerMessage) {
        self.reply(message, None);
    }

    /// Deliver a raw text frame as-is.
    pub fn raw(&self, frame: &str) {
        let _ = self.events.send(LinkEvent::Frame(frame.to_string()));
    }

    /// Drop the link. Frames the client wrote that were never read are handed back as unsent.
    pub fn disconnect(mut self) {
        self.outbound.close();
        let mut unsent = vec![];
        while let Ok(frame) = self.outbound.try_recv() {
            unsent.push(frame);
        }
        let _ = self.events.send(LinkEvent::Down { unsent });
    }
}
