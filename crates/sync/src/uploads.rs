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

//! Upload handshakes (request a slot, transfer to storage, confirm) and download requests, one
//! per content hash.
//!
//! The coordinator never performs I/O itself beyond sending messages on the channel. Anything the
//! engine must do in response (start a transfer, release or discard deferred work) comes back as
//! an `UploadStep`.

use crate::deferred::DeferredQueue;
use bytes::Bytes;
use std::collections::HashMap;
use std::str::FromStr;
use tabula_channel::MessageChannel;
use tabula_common::{
    ClientMessage, ConfirmReply, ContentHash, DownloadReply, Envelope, EventBus, SpriteId,
    SyncError, SyncEvent, UploadReply, WorldPosition,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Where a handshake stands. A failed handshake is not kept: its waiters and deferred work are
/// told, and the hash is forgotten so the next request starts over.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UploadState {
    Requesting,
    UploadingToStorage,
    AlreadyExists,
    Confirming,
    Done,
}

impl UploadState {
    fn in_flight(self) -> bool {
        self != UploadState::Done
    }
}

/// Bytes the server has not yet confirmed it holds.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingUpload {
    pub content_hash: ContentHash,
    pub raw_bytes: Bytes,
    pub target_world_position: Option<WorldPosition>,
    pub display_name: String,
    pub mime_type: String,
}

impl PendingUpload {
    pub fn new(
        raw_bytes: Bytes,
        display_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            content_hash: ContentHash::of(&raw_bytes),
            raw_bytes,
            target_world_position: None,
            display_name: display_name.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn at(mut self, position: WorldPosition) -> Self {
        self.target_world_position = Some(position);
        self
    }
}

/// What every caller waiting on a handshake eventually learns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    Ready { asset_id: String },
    Failed { reason: String },
}

/// A direct transfer the engine must perform.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferRequest {
    pub hash: ContentHash,
    pub target: String,
    pub bytes: Bytes,
    pub content_type: String,
}

#[derive(Debug, PartialEq)]
pub enum UploadStep {
    /// Nothing for the engine to do.
    Waiting,
    Transfer(TransferRequest),
    /// The server holds the asset. `released` is the work deferred on it, in registration order.
    Resolved {
        hash: ContentHash,
        asset_id: String,
        released: Vec<SpriteId>,
    },
    Failed {
        hash: ContentHash,
        reason: String,
        discarded: Vec<SpriteId>,
    },
}

#[derive(Debug, PartialEq)]
pub enum DownloadStep {
    Fetch { hash: ContentHash, url: String },
    Missing { hash: ContentHash, error: SyncError },
}

struct Handshake {
    state: UploadState,
    pending: Option<PendingUpload>,
    asset_id: Option<String>,
    progress: u8,
    waiters: Vec<oneshot::Sender<UploadOutcome>>,
}

struct Download {
    asset_id: String,
    url: Option<String>,
}

pub struct UploadCoordinator {
    events: EventBus,
    session_context: Option<String>,
    handshakes: HashMap<ContentHash, Handshake>,
    deferred: DeferredQueue<ContentHash, SpriteId>,
    downloads: HashMap<ContentHash, Download>,
}

fn correlated_hash(correlation_key: Option<&str>) -> Result<ContentHash, SyncError> {
    let key = correlation_key.ok_or_else(|| SyncError::CorrelationMiss("<none>".to_string()))?;
    ContentHash::from_str(key).map_err(|_| SyncError::CorrelationMiss(key.to_string()))
}

impl UploadCoordinator {
    pub fn new(events: EventBus, session_context: Option<String>) -> Self {
        Self {
            events,
            session_context,
            handshakes: HashMap::new(),
            deferred: DeferredQueue::new(),
            downloads: HashMap::new(),
        }
    }

    /// Make sure the server ends up holding `pending`'s bytes.
    ///
    /// Joins an in-flight handshake for the same hash rather than starting another, and answers
    /// at once for a hash already confirmed. A failed hash starts over.
    pub fn request_upload(
        &mut self,
        pending: PendingUpload,
        channel: &mut MessageChannel,
    ) -> Result<oneshot::Receiver<UploadOutcome>, SyncError> {
        let hash = pending.content_hash;
        let (tx, rx) = oneshot::channel();
        if let Some(handshake) = self.handshakes.get_mut(&hash) {
            if handshake.state == UploadState::Done {
                let asset_id = handshake.asset_id.clone().unwrap_or_default();
                let _ = tx.send(UploadOutcome::Ready { asset_id });
            } else {
                debug!(%hash, state = ?handshake.state, "Joining in-flight upload");
                handshake.waiters.push(tx);
            }
            return Ok(rx);
        }

        let request = Envelope::correlated(
            ClientMessage::AssetUploadRequest {
                filename: pending.display_name.clone(),
                file_size: pending.raw_bytes.len() as u64,
                content_type: pending.mime_type.clone(),
                content_hash: hash,
                session_context: self.session_context.clone(),
            },
            hash.to_string(),
        );
        channel.send(request)?;
        info!(%hash, name = %pending.display_name, size = pending.raw_bytes.len(), "Requesting upload");
        self.handshakes.insert(
            hash,
            Handshake {
                state: UploadState::Requesting,
                pending: Some(pending),
                asset_id: None,
                progress: 0,
                waiters: vec![tx],
            },
        );
        Ok(rx)
    }

    /// Park `work` until the handshake for `hash` finishes. Hands it straight back when no
    /// handshake for `hash` is in flight.
    pub fn defer(&mut self, hash: ContentHash, work: SpriteId) -> Result<(), SpriteId> {
        match self.state(&hash) {
            Some(state) if state.in_flight() => {
                self.deferred.defer(hash, work);
                Ok(())
            }
            _ => Err(work),
        }
    }

    pub fn handle_upload_response(
        &mut self,
        correlation_key: Option<&str>,
        reply: UploadReply,
    ) -> Result<UploadStep, SyncError> {
        let hash = correlated_hash(correlation_key)?;
        let handshake = self.expect_state(&hash, UploadState::Requesting)?;
        match reply {
            UploadReply::Exists { asset_id } => {
                debug!(%hash, %asset_id, "Server already holds asset");
                handshake.state = UploadState::AlreadyExists;
                Ok(self.succeed(hash, asset_id))
            }
            UploadReply::UploadRequired {
                asset_id,
                upload_target,
            } => {
                let Some(pending) = handshake.pending.as_ref() else {
                    return Ok(self.fail(hash, "upload bytes were released early".to_string()));
                };
                let transfer = TransferRequest {
                    hash,
                    target: upload_target,
                    bytes: pending.raw_bytes.clone(),
                    content_type: pending.mime_type.clone(),
                };
                handshake.state = UploadState::UploadingToStorage;
                handshake.asset_id = Some(asset_id);
                handshake.progress = 0;
                self.events.publish(SyncEvent::UploadStarted { hash });
                Ok(UploadStep::Transfer(transfer))
            }
            UploadReply::Rejected { error } => Ok(self.fail(hash, error)),
        }
    }

    /// Record transfer progress. Progress only moves forward.
    pub fn transfer_progress(&mut self, hash: ContentHash, percent: u8) {
        let Some(handshake) = self.handshakes.get_mut(&hash) else {
            return;
        };
        let percent = percent.min(100);
        if handshake.state == UploadState::UploadingToStorage && percent > handshake.progress {
            handshake.progress = percent;
            self.events.publish(SyncEvent::UploadProgress { hash, percent });
        }
    }

    pub fn transfer_finished(
        &mut self,
        hash: ContentHash,
        result: Result<(), SyncError>,
        channel: &mut MessageChannel,
    ) -> Result<UploadStep, SyncError> {
        let handshake = self.expect_state(&hash, UploadState::UploadingToStorage)?;
        if let Err(e) = result {
            error!(%hash, error = %e, "Transfer to storage failed");
            return Ok(self.fail(hash, e.to_string()));
        }
        let (Some(pending), Some(asset_id)) = (&handshake.pending, &handshake.asset_id) else {
            return Ok(self.fail(hash, "upload state lost before confirmation".to_string()));
        };
        let confirm = Envelope::correlated(
            ClientMessage::AssetUploadConfirm {
                asset_id: asset_id.clone(),
                content_hash: hash,
                file_size: pending.raw_bytes.len() as u64,
                content_type: pending.mime_type.clone(),
            },
            hash.to_string(),
        );
        handshake.state = UploadState::Confirming;
        handshake.progress = 100;
        self.events.publish(SyncEvent::UploadCompleted { hash });
        if let Err(e) = channel.send(confirm) {
            return Ok(self.fail(hash, e.to_string()));
        }
        Ok(UploadStep::Waiting)
    }

    pub fn handle_confirm(
        &mut self,
        correlation_key: Option<&str>,
        reply: ConfirmReply,
    ) -> Result<UploadStep, SyncError> {
        let hash = correlated_hash(correlation_key)?;
        let handshake = self.expect_state(&hash, UploadState::Confirming)?;
        if !reply.success {
            let reason = reply
                .error
                .unwrap_or_else(|| "server refused the upload confirmation".to_string());
            return Ok(self.fail(hash, reason));
        }
        let asset_id = handshake.asset_id.clone().unwrap_or_else(|| hash.to_string());
        Ok(self.succeed(hash, asset_id))
    }

    fn expect_state(
        &mut self,
        hash: &ContentHash,
        expected: UploadState,
    ) -> Result<&mut Handshake, SyncError> {
        match self.handshakes.get_mut(hash) {
            Some(handshake) if handshake.state == expected => Ok(handshake),
            found => {
                let state = found.map(|h| h.state);
                warn!(%hash, ?expected, ?state, "Upload reply does not match any waiting handshake");
                Err(SyncError::CorrelationMiss(hash.to_string()))
            }
        }
    }

    fn succeed(&mut self, hash: ContentHash, asset_id: String) -> UploadStep {
        let waiters = match self.handshakes.get_mut(&hash) {
            Some(handshake) => {
                handshake.state = UploadState::Done;
                handshake.pending = None;
                handshake.asset_id = Some(asset_id.clone());
                std::mem::take(&mut handshake.waiters)
            }
            None => vec![],
        };
        for waiter in waiters {
            let _ = waiter.send(UploadOutcome::Ready {
                asset_id: asset_id.clone(),
            });
        }
        let released = self.deferred.drain(&hash);
        info!(%hash, %asset_id, released = released.len(), "Upload confirmed");
        self.events.publish(SyncEvent::AssetUploaded {
            hash,
            asset_id: asset_id.clone(),
        });
        UploadStep::Resolved {
            hash,
            asset_id,
            released,
        }
    }

    fn fail(&mut self, hash: ContentHash, reason: String) -> UploadStep {
        let waiters = self
            .handshakes
            .remove(&hash)
            .map(|handshake| handshake.waiters)
            .unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(UploadOutcome::Failed {
                reason: reason.clone(),
            });
        }
        let discarded = self.deferred.discard(&hash);
        if !discarded.is_empty() {
            warn!(%hash, discarded = discarded.len(), "Discarding work deferred on failed upload");
        }
        error!(%hash, %reason, "Upload failed");
        self.events.publish(SyncEvent::UploadFailed {
            hash,
            reason: reason.clone(),
        });
        UploadStep::Failed {
            hash,
            reason,
            discarded,
        }
    }

    /// The link carrying a request for `hash` went away before the server answered. A handshake
    /// still waiting on that answer fails, so retries start over instead of joining it.
    pub fn reply_lost(&mut self, hash: ContentHash, error: SyncError) -> UploadStep {
        match self.state(&hash) {
            Some(UploadState::Requesting | UploadState::Confirming) => {
                self.fail(hash, error.to_string())
            }
            state => {
                debug!(%hash, ?state, "No handshake waiting on the lost reply");
                UploadStep::Waiting
            }
        }
    }

    /// Ask the server where to fetch an asset from. Returns false if a request for `hash` is
    /// already outstanding.
    pub fn request_download(
        &mut self,
        asset_id: String,
        hash: ContentHash,
        channel: &mut MessageChannel,
    ) -> Result<bool, SyncError> {
        if self.downloads.contains_key(&hash) {
            debug!(%hash, "Download already requested");
            return Ok(false);
        }
        channel.send(Envelope::correlated(
            ClientMessage::AssetDownloadRequest {
                asset_id: asset_id.clone(),
            },
            hash.to_string(),
        ))?;
        debug!(%hash, %asset_id, "Requesting download");
        self.downloads.insert(hash, Download { asset_id, url: None });
        Ok(true)
    }

    pub fn handle_download_response(
        &mut self,
        correlation_key: Option<&str>,
        reply: DownloadReply,
    ) -> Result<DownloadStep, SyncError> {
        let hash = correlated_hash(correlation_key)?;
        let Some(download) = self.downloads.get_mut(&hash) else {
            warn!(%hash, "Download reply for an asset we did not ask for");
            return Err(SyncError::CorrelationMiss(hash.to_string()));
        };
        match reply {
            DownloadReply::Ready { download_url } => {
                download.url = Some(download_url.clone());
                Ok(DownloadStep::Fetch {
                    hash,
                    url: download_url,
                })
            }
            DownloadReply::NotFound { error } => {
                let asset_id = download.asset_id.clone();
                Ok(self.download_missing(
                    hash,
                    SyncError::AssetNotFound {
                        asset_id,
                        reason: error,
                    },
                ))
            }
        }
    }

    /// The link carrying the download request for `hash` went away before the server answered.
    /// Forgets the request so the asset can be asked for again.
    pub fn download_lost(&mut self, hash: ContentHash, error: SyncError) -> Option<DownloadStep> {
        let awaiting_reply = self
            .downloads
            .get(&hash)
            .is_some_and(|download| download.url.is_none());
        if !awaiting_reply {
            return None;
        }
        Some(self.download_missing(hash, error))
    }

    fn download_missing(&mut self, hash: ContentHash, error: SyncError) -> DownloadStep {
        self.downloads.remove(&hash);
        warn!(%hash, %error, "Could not resolve asset");
        self.events.publish(SyncEvent::AssetMissing {
            hash,
            reason: error.to_string(),
        });
        DownloadStep::Missing { hash, error }
    }

    /// Forget a download once its fetch has finished, returning the asset id and source URL.
    pub fn download_finished(&mut self, hash: &ContentHash) -> Option<(String, Option<String>)> {
        self.downloads
            .remove(hash)
            .map(|download| (download.asset_id, download.url))
    }

    pub fn state(&self, hash: &ContentHash) -> Option<UploadState> {
        self.handshakes.get(hash).map(|h| h.state)
    }

    pub fn pending_upload(&self, hash: &ContentHash) -> Option<&PendingUpload> {
        self.handshakes.get(hash).and_then(|h| h.pending.as_ref())
    }

    pub fn progress(&self, hash: &ContentHash) -> Option<u8> {
        self.handshakes.get(hash).map(|h| h.progress)
    }

    /// The server's id for an asset, once known.
    pub fn asset_id(&self, hash: &ContentHash) -> Option<&str> {
        self.handshakes.get(hash).and_then(|h| h.asset_id.as_deref())
    }

    pub fn in_flight(&self) -> usize {
        self.handshakes
            .values()
            .filter(|h| h.state.in_flight())
            .count()
    }

    pub fn is_downloading(&self, hash: &ContentHash) -> bool {
        self.downloads.contains_key(hash)
    }
}
