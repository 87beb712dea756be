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

use crate::hash::ContentHash;
use crate::model::SpriteId;

/// Failures surfaced by the synchronization engine.
///
/// Most of these are recovered where they occur (a handshake is failed and forgotten, an update is
/// dropped) and are reported through events rather than propagated; they appear as `Err` only
/// from the operation that detected them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("content hash mismatch: claimed {claimed}, bytes digest to {actual}")]
    HashMismatch {
        claimed: ContentHash,
        actual: ContentHash,
    },
    #[error("asset {hash} is {size} bytes, larger than the cache limit of {limit} bytes")]
    TooLarge {
        hash: ContentHash,
        size: u64,
        limit: u64,
    },
    #[error("transport failure: {0}")]
    TransportFailure(String),
    #[error("optimistic insert {0} timed out waiting for the server")]
    Timeout(SpriteId),
    #[error("server could not resolve asset {asset_id}: {reason}")]
    AssetNotFound { asset_id: String, reason: String },
    #[error("update for sprite {0} lacks enough information to apply safely")]
    IncompleteUpdateData(SpriteId),
    #[error("no pending operation for correlation key {0}")]
    CorrelationMiss(String),
    #[error("sprite {0} already has an update in flight")]
    ReentrantUpdate(SpriteId),
    #[error("message channel closed")]
    ChannelClosed,
    #[error("could not encode message: {0}")]
    Encode(String),
    #[error("could not decode message: {0}")]
    Decode(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Conditions that are expected under normal races and should be logged, not reported.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            SyncError::CorrelationMiss(_)
                | SyncError::IncompleteUpdateData(_)
                | SyncError::ReentrantUpdate(_)
        )
    }
}
