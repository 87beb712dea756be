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

//! Types shared by every part of the tabula synchronization client: content hashing, the sprite
//! model, wire messages, events, errors and configuration.

pub use config::{CacheConfig, ChannelConfig, OptimisticConfig, SpriteConfig, SyncConfig};
pub use errors::SyncError;
pub use events::{EventBus, SyncEvent};
pub use hash::{ContentHash, InvalidContentHash};
pub use messages::{
    ClientEnvelope, ClientMessage, ConfirmReply, CreateReply, DownloadReply, Envelope,
    MessageType, Priority, ServerEnvelope, ServerMessage, UploadReply,
};
pub use model::{
    Scale, Size, SpriteDescriptor, SpriteId, SpriteOperation, SpriteUpdate, TextureRef, Tint,
    WorldPosition,
};

pub mod config;
mod errors;
mod events;
mod hash;
pub mod messages;
mod model;
pub mod tracing;

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch; zero if the clock is set before it.
pub fn unix_timestamp_secs(now: SystemTime) -> u64 {
    now.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
