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

//! Fire-and-forget notifications for whoever is watching (UI, telemetry, tests).
//!
//! Nothing here is the sole carrier of correctness-critical state: every event reflects a change
//! that can also be observed through the components' query methods, so dropping or ignoring
//! events is always safe.

use crate::hash::ContentHash;
use crate::messages::MessageType;
use crate::model::SpriteId;
use tokio::sync::broadcast;

#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    Connected,
    Disconnected,
    UploadStarted {
        hash: ContentHash,
    },
    UploadProgress {
        hash: ContentHash,
        percent: u8,
    },
    /// The binary transfer to storage finished; confirmation is still outstanding.
    UploadCompleted {
        hash: ContentHash,
    },
    /// The server has confirmed the asset exists.
    AssetUploaded {
        hash: ContentHash,
        asset_id: String,
    },
    UploadFailed {
        hash: ContentHash,
        reason: String,
    },
    AssetDownloaded {
        hash: ContentHash,
    },
    /// The server could not resolve an asset we asked for; it may need uploading.
    AssetMissing {
        hash: ContentHash,
        reason: String,
    },
    SpriteCreated {
        sprite_id: SpriteId,
    },
    SpriteUpdated {
        sprite_id: SpriteId,
    },
    SpriteRemoved {
        sprite_id: SpriteId,
    },
    OptimisticReconciled {
        temp_id: SpriteId,
        sprite_id: SpriteId,
    },
    OptimisticRolledBack {
        temp_id: SpriteId,
        reason: String,
    },
    ProtocolSuccess {
        message_type: MessageType,
    },
    ProtocolError {
        message_type: Option<MessageType>,
        reason: String,
    },
}

const EVENT_BUS_CAPACITY: usize = 1024;

/// Broadcast fan-out of `SyncEvent`s. Cloning shares the same bus.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers. Having none is fine.
    pub fn publish(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::new();
        bus.publish(SyncEvent::Connected);
    }

    #[test]
    fn test_subscribers_see_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(SyncEvent::Connected);
        bus.publish(SyncEvent::Disconnected);
        assert_eq!(rx.try_recv().unwrap(), SyncEvent::Connected);
        assert_eq!(rx.try_recv().unwrap(), SyncEvent::Disconnected);
    }
}
