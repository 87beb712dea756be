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

//! Provisional sprites shown before the server has agreed they exist.

use crate::materializer::SpriteMaterializer;
use crate::render::RenderEngine;
use futures_util::future::poll_fn;
use std::collections::HashMap;
use std::time::Duration;
use tabula_assets::AssetCache;
use tabula_channel::MessageChannel;
use tabula_common::{
    ClientMessage, ContentHash, Envelope, EventBus, SpriteDescriptor, SpriteId, SyncError,
    SyncEvent,
};
use tokio::time::Instant;
use tokio_util::time::DelayQueue;
use tokio_util::time::delay_queue::Key;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One provisional sprite awaiting the server's verdict.
pub(crate) struct OptimisticInsert {
    provisional: SpriteDescriptor,
    created_at: Instant,
    /// Armed when the sprite is first shown; `None` once it has fired.
    rollback_timer: Option<Key>,
    /// Whether the server has been asked to create it yet.
    sent: bool,
}

pub struct OptimisticTracker {
    rollback_timeout: Duration,
    events: EventBus,
    inserts: HashMap<SpriteId, OptimisticInsert>,
    timers: DelayQueue<SpriteId>,
}

impl OptimisticTracker {
    pub fn new(rollback_timeout: Duration, events: EventBus) -> Self {
        Self {
            rollback_timeout,
            events,
            inserts: HashMap::new(),
            timers: DelayQueue::new(),
        }
    }

    /// A fresh, process-unique provisional id.
    pub fn mint_temp_id() -> SpriteId {
        SpriteId::new(format!("temp-{}", Uuid::new_v4()))
    }

    /// Show `descriptor` under a new temp id, start the rollback clock, and ask the server to
    /// create it.
    pub fn begin_optimistic<R: RenderEngine>(
        &mut self,
        descriptor: SpriteDescriptor,
        materializer: &mut SpriteMaterializer<R>,
        cache: &mut AssetCache,
        channel: &mut MessageChannel,
    ) -> Result<SpriteId, SyncError> {
        self.begin_optimistic_with(
            Self::mint_temp_id(),
            descriptor,
            materializer,
            cache,
            channel,
        )
    }

    pub fn begin_optimistic_with<R: RenderEngine>(
        &mut self,
        temp_id: SpriteId,
        descriptor: SpriteDescriptor,
        materializer: &mut SpriteMaterializer<R>,
        cache: &mut AssetCache,
        channel: &mut MessageChannel,
    ) -> Result<SpriteId, SyncError> {
        self.stage(temp_id.clone(), descriptor, materializer, cache)?;
        if let Err(e) = self.commit(&temp_id, channel) {
            self.rollback(&temp_id, &e.to_string(), materializer);
            return Err(e);
        }
        Ok(temp_id)
    }

    /// Show the provisional sprite and start its rollback clock without telling the server yet.
    /// Used when the creation has to wait on something else, such as its texture's upload; the
    /// clock bounds that wait too. Returns the hash the provisional sprite's texture is waiting
    /// on, if any.
    pub fn stage<R: RenderEngine>(
        &mut self,
        temp_id: SpriteId,
        descriptor: SpriteDescriptor,
        materializer: &mut SpriteMaterializer<R>,
        cache: &mut AssetCache,
    ) -> Result<Option<ContentHash>, SyncError> {
        if self.inserts.contains_key(&temp_id) {
            return Err(SyncError::ReentrantUpdate(temp_id));
        }
        let provisional = descriptor.with_id(temp_id.clone());
        let awaiting = materializer.materialize(provisional.clone(), cache)?;
        let rollback_timer = self.timers.insert(temp_id.clone(), self.rollback_timeout);
        debug!(%temp_id, timeout = ?self.rollback_timeout, "Provisional sprite shown");
        self.inserts.insert(
            temp_id,
            OptimisticInsert {
                provisional,
                created_at: Instant::now(),
                rollback_timer: Some(rollback_timer),
                sent: false,
            },
        );
        Ok(awaiting)
    }

    /// Send the creation for a staged insert. Committing twice is a no-op.
    pub fn commit(
        &mut self,
        temp_id: &SpriteId,
        channel: &mut MessageChannel,
    ) -> Result<(), SyncError> {
        let Some(insert) = self.inserts.get_mut(temp_id) else {
            return Err(SyncError::CorrelationMiss(temp_id.to_string()));
        };
        if insert.sent {
            return Ok(());
        }
        channel.send(Envelope::correlated(
            ClientMessage::SpriteCreate {
                sprite: insert.provisional.clone(),
            },
            temp_id.to_string(),
        ))?;
        insert.sent = true;
        debug!(%temp_id, "Sprite creation sent");
        Ok(())
    }

    /// Remove the tracking entry and disarm its timer. Whoever gets the entry owns the removal of
    /// the provisional sprite; everyone else gets `None`.
    fn take_unresolved(&mut self, temp_id: &SpriteId) -> Option<OptimisticInsert> {
        let insert = self.inserts.remove(temp_id)?;
        if let Some(key) = &insert.rollback_timer {
            self.timers.try_remove(key);
        }
        Some(insert)
    }

    /// Swap the provisional sprite for the server's. Returns the hash the authoritative sprite's
    /// texture is waiting on, if any.
    pub fn reconcile<R: RenderEngine>(
        &mut self,
        temp_id: &SpriteId,
        authoritative: SpriteDescriptor,
        materializer: &mut SpriteMaterializer<R>,
        cache: &mut AssetCache,
    ) -> Result<Option<ContentHash>, SyncError> {
        let Some(insert) = self.take_unresolved(temp_id) else {
            debug!(%temp_id, "Reconcile for an insert that is no longer pending");
            return Err(SyncError::CorrelationMiss(temp_id.to_string()));
        };
        materializer.remove(temp_id);
        let sprite_id = authoritative.id.clone();
        let awaiting = materializer.materialize(authoritative, cache)?;
        info!(%temp_id, %sprite_id, elapsed = ?insert.created_at.elapsed(), "Optimistic insert confirmed");
        self.events.publish(SyncEvent::OptimisticReconciled {
            temp_id: temp_id.clone(),
            sprite_id,
        });
        Ok(awaiting)
    }

    /// Withdraw a provisional sprite. False if it was already reconciled or rolled back.
    pub fn rollback<R: RenderEngine>(
        &mut self,
        temp_id: &SpriteId,
        reason: &str,
        materializer: &mut SpriteMaterializer<R>,
    ) -> bool {
        if self.take_unresolved(temp_id).is_none() {
            debug!(%temp_id, "Rollback for an insert that is no longer pending");
            return false;
        }
        materializer.remove(temp_id);
        warn!(%temp_id, %reason, "Optimistic insert rolled back");
        self.events.publish(SyncEvent::OptimisticRolledBack {
            temp_id: temp_id.clone(),
            reason: reason.to_string(),
        });
        true
    }

    /// Wait for the next rollback timer to fire. Resolves to `None` immediately when no timers
    /// are armed, so callers should check `has_timers` first.
    pub async fn next_expired(&mut self) -> Option<SpriteId> {
        let expired = poll_fn(|cx| self.timers.poll_expired(cx)).await?;
        let temp_id = expired.into_inner();
        // The key is spent; make sure nothing tries to cancel it later.
        if let Some(insert) = self.inserts.get_mut(&temp_id) {
            insert.rollback_timer = None;
        }
        Some(temp_id)
    }

    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    pub fn provisional(&self, temp_id: &SpriteId) -> Option<&SpriteDescriptor> {
        self.inserts.get(temp_id).map(|i| &i.provisional)
    }

    pub fn is_pending(&self, temp_id: &SpriteId) -> bool {
        self.inserts.contains_key(temp_id)
    }

    pub fn pending_len(&self) -> usize {
        self.inserts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Loopback, RecordingRenderer};
    use pretty_assertions::assert_eq;
    use tabula_common::{CacheConfig, ChannelConfig, Scale, Size, TextureRef, Tint, WorldPosition};

    struct Fixture {
        tracker: OptimisticTracker,
        materializer: SpriteMaterializer<RecordingRenderer>,
        cache: AssetCache,
        channel: MessageChannel,
        link: Loopback,
    }

    fn fixture() -> Fixture {
        let events = EventBus::new();
        let mut channel = MessageChannel::new(ChannelConfig::default(), events.clone());
        let link = Loopback::attach(&mut channel);
        Fixture {
            tracker: OptimisticTracker::new(Duration::from_secs(10), events.clone()),
            materializer: SpriteMaterializer::new(
                RecordingRenderer::default(),
                "placeholder",
                events,
            ),
            cache: AssetCache::new(CacheConfig::default()),
            channel,
            link,
        }
    }

    fn orc() -> SpriteDescriptor {
        SpriteDescriptor {
            id: "unset".into(),
            position: WorldPosition::new(3.0, 4.0),
            size: Size {
                width: 50.0,
                height: 50.0,
            },
            scale: Scale::default(),
            rotation: 0.0,
            layer: "tokens".to_string(),
            texture: TextureRef::Named("orc".to_string()),
            tint: Tint::WHITE,
        }
    }

    impl Fixture {
        fn begin(&mut self) -> SpriteId {
            self.tracker
                .begin_optimistic(
                    orc(),
                    &mut self.materializer,
                    &mut self.cache,
                    &mut self.channel,
                )
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_begin_shows_and_sends() {
        let mut f = fixture();
        let temp_id = f.begin();
        assert!(temp_id.as_str().starts_with("temp-"));
        assert!(f.tracker.is_pending(&temp_id));
        assert!(f.materializer.sprite(&temp_id).is_some());
        assert!(f.tracker.has_timers());

        let sent = f.link.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].correlation_key.as_deref(), Some(temp_id.as_str()));
        let ClientMessage::SpriteCreate { sprite } = &sent[0].message else {
            panic!("expected sprite_create");
        };
        assert_eq!(sprite.id, temp_id);
    }

    #[tokio::test]
    async fn test_temp_ids_are_unique() {
        let mut f = fixture();
        let a = f.begin();
        let b = f.begin();
        assert_ne!(a, b);
        assert_eq!(f.tracker.pending_len(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_swaps_in_authoritative_sprite() {
        let mut f = fixture();
        let temp_id = f.begin();
        let authoritative = orc().with_id("s-100".into());
        f.tracker
            .reconcile(
                &temp_id,
                authoritative.clone(),
                &mut f.materializer,
                &mut f.cache,
            )
            .unwrap();
        assert!(!f.tracker.is_pending(&temp_id));
        assert!(!f.tracker.has_timers());
        assert!(f.materializer.sprite(&temp_id).is_none());
        assert_eq!(
            f.materializer.sprite(&"s-100".into()),
            Some(&authoritative)
        );

        // A second reconcile, or a late rollback, changes nothing.
        assert!(matches!(
            f.tracker
                .reconcile(&temp_id, authoritative, &mut f.materializer, &mut f.cache),
            Err(SyncError::CorrelationMiss(_))
        ));
        assert!(!f.tracker.rollback(&temp_id, "late", &mut f.materializer));
        assert_eq!(f.materializer.sprite_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_timeout() {
        let mut f = fixture();
        let temp_id = f.begin();
        let started = Instant::now();
        let expired = f.tracker.next_expired().await;
        assert_eq!(expired, Some(temp_id.clone()));
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(f.tracker.rollback(&temp_id, "timed out", &mut f.materializer));
        assert!(f.materializer.sprite(&temp_id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_disarms_timer() {
        let mut f = fixture();
        let first = f.begin();
        let second = f.begin();
        f.tracker
            .reconcile(
                &first,
                orc().with_id("s-1".into()),
                &mut f.materializer,
                &mut f.cache,
            )
            .unwrap();
        // Only the unreconciled insert can expire.
        assert_eq!(f.tracker.next_expired().await, Some(second));
        assert!(!f.tracker.has_timers());
    }

    #[tokio::test]
    async fn test_rollback_tolerates_prior_removal() {
        let mut f = fixture();
        let temp_id = f.begin();
        f.materializer.remove(&temp_id);
        assert!(f.tracker.rollback(&temp_id, "rejected", &mut f.materializer));
        assert_eq!(f.tracker.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_staged_insert_waits_for_commit() {
        let mut f = fixture();
        let temp_id = OptimisticTracker::mint_temp_id();
        f.tracker
            .stage(temp_id.clone(), orc(), &mut f.materializer, &mut f.cache)
            .unwrap();
        assert!(f.link.sent().is_empty());
        assert!(f.tracker.has_timers());

        f.tracker.commit(&temp_id, &mut f.channel).unwrap();
        f.tracker.commit(&temp_id, &mut f.channel).unwrap();
        assert_eq!(f.link.sent().len(), 1);
        assert!(f.tracker.has_timers());

        assert!(matches!(
            f.tracker.stage(temp_id, orc(), &mut f.materializer, &mut f.cache),
            Err(SyncError::ReentrantUpdate(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_staged_insert_expires_without_commit() {
        let mut f = fixture();
        let temp_id = OptimisticTracker::mint_temp_id();
        f.tracker
            .stage(temp_id.clone(), orc(), &mut f.materializer, &mut f.cache)
            .unwrap();
        let started = Instant::now();
        assert_eq!(f.tracker.next_expired().await, Some(temp_id.clone()));
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(f.tracker.rollback(&temp_id, "timed out", &mut f.materializer));
        assert!(f.materializer.sprite(&temp_id).is_none());

        // Whatever it was waiting on finishes too late to matter.
        assert!(matches!(
            f.tracker.commit(&temp_id, &mut f.channel),
            Err(SyncError::CorrelationMiss(_))
        ));
        assert!(f.link.sent().is_empty());
    }
}
