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

//! Turns sprite descriptors into render commands.
//!
//! A sprite whose texture asset is not yet available is drawn with the placeholder texture and
//! parked in a waiting queue keyed by the asset's hash; `asset_resolved` and `asset_failed` are the
//! only places that queue is drained.

use crate::deferred::DeferredQueue;
use crate::render::{GridSpec, IncrementalOp, LightSpec, RenderEngine};
use std::collections::{HashMap, HashSet};
use tabula_assets::AssetCache;
use tabula_common::{
    ContentHash, EventBus, SpriteDescriptor, SpriteId, SpriteUpdate, SyncError, SyncEvent,
    TextureRef,
};
use tracing::{debug, trace, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UpdateKind {
    /// Removing and re-adding the sprite.
    Recreate,
    /// Waiting for a new texture's asset before binding it.
    Retexture,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Updating(UpdateKind),
}

/// Layer changes and texture swaps cannot be expressed as in-place updates.
pub fn needs_full_recreation(current: &SpriteDescriptor, update: &SpriteUpdate) -> bool {
    let relayer = update
        .layer
        .as_ref()
        .is_some_and(|layer| *layer != current.layer);
    let retexture = update
        .texture
        .as_ref()
        .is_some_and(|texture| *texture != current.texture);
    relayer || retexture
}

struct Materialized {
    /// The state the sprite should have.
    descriptor: SpriteDescriptor,
    /// What the render engine is actually drawing it with.
    shown_texture: TextureRef,
    awaiting: Option<ContentHash>,
    state: UpdateState,
}

impl Materialized {
    fn rendered(&self) -> SpriteDescriptor {
        SpriteDescriptor {
            texture: self.shown_texture.clone(),
            ..self.descriptor.clone()
        }
    }
}

pub struct SpriteMaterializer<R: RenderEngine> {
    renderer: R,
    events: EventBus,
    placeholder: TextureRef,
    sprites: HashMap<SpriteId, Materialized>,
    loaded: HashSet<ContentHash>,
    waiting: DeferredQueue<ContentHash, SpriteId>,
}

impl<R: RenderEngine> SpriteMaterializer<R> {
    pub fn new(renderer: R, placeholder_texture: impl Into<String>, events: EventBus) -> Self {
        Self {
            renderer,
            events,
            placeholder: TextureRef::Named(placeholder_texture.into()),
            sprites: HashMap::new(),
            loaded: HashSet::new(),
            waiting: DeferredQueue::new(),
        }
    }

    /// Load `hash` into the render engine if we can. True if it is usable for binding.
    fn ensure_loaded(&mut self, hash: ContentHash, cache: &mut AssetCache) -> bool {
        if self.loaded.contains(&hash) {
            return true;
        }
        let Some(bytes) = cache.get(&hash) else {
            return false;
        };
        trace!(%hash, size = bytes.len(), "Loading texture");
        self.renderer.load_texture(hash, &bytes);
        self.loaded.insert(hash);
        true
    }

    /// The hash `texture` still needs before it can be bound, if any.
    fn unresolved(&mut self, texture: &TextureRef, cache: &mut AssetCache) -> Option<ContentHash> {
        let hash = texture.asset_hash()?;
        (!self.ensure_loaded(hash, cache)).then_some(hash)
    }

    /// Draw a complete sprite, replacing any existing sprite with the same id. Returns the asset
    /// hash the sprite is waiting on, when its texture is not available yet.
    pub fn materialize(
        &mut self,
        descriptor: SpriteDescriptor,
        cache: &mut AssetCache,
    ) -> Result<Option<ContentHash>, SyncError> {
        if !descriptor.is_well_formed() {
            warn!(sprite_id = %descriptor.id, "Refusing to materialize malformed sprite");
            return Err(SyncError::IncompleteUpdateData(descriptor.id));
        }
        let id = descriptor.id.clone();
        if self.detach(&id) {
            debug!(sprite_id = %id, "Replacing existing sprite");
            self.renderer.remove_sprite(&id);
        }

        let awaiting = self.unresolved(&descriptor.texture, cache);
        let shown_texture = match awaiting {
            Some(hash) => {
                debug!(sprite_id = %id, %hash, "Texture not yet available; using placeholder");
                self.waiting.defer(hash, id.clone());
                self.placeholder.clone()
            }
            None => descriptor.texture.clone(),
        };
        let sprite = Materialized {
            descriptor,
            shown_texture,
            awaiting,
            state: UpdateState::Idle,
        };
        self.renderer.add_sprite(&sprite.rendered());
        self.sprites.insert(id.clone(), sprite);
        self.events.publish(SyncEvent::SpriteCreated { sprite_id: id });
        Ok(awaiting)
    }

    /// Forget a sprite's bookkeeping without issuing commands. True if it existed.
    fn detach(&mut self, id: &SpriteId) -> bool {
        let Some(sprite) = self.sprites.remove(id) else {
            return false;
        };
        if let Some(hash) = sprite.awaiting {
            self.waiting.withdraw(&hash, |waiting| waiting == id);
        }
        true
    }

    /// Move from `Idle` into an update. The only way into `Updating`.
    fn begin_update(&mut self, id: &SpriteId, kind: UpdateKind) -> Result<(), SyncError> {
        let Some(sprite) = self.sprites.get_mut(id) else {
            return Err(SyncError::IncompleteUpdateData(id.clone()));
        };
        match sprite.state {
            UpdateState::Idle => {
                sprite.state = UpdateState::Updating(kind);
                Ok(())
            }
            UpdateState::Updating(current) => {
                warn!(sprite_id = %id, ?current, "Dropping update for sprite mid-update");
                Err(SyncError::ReentrantUpdate(id.clone()))
            }
        }
    }

    fn finish_update(&mut self, id: &SpriteId) {
        if let Some(sprite) = self.sprites.get_mut(id) {
            sprite.state = UpdateState::Idle;
        }
    }

    /// Apply a partial update. Returns the asset hash a texture swap is waiting on, if any.
    pub fn update(
        &mut self,
        id: &SpriteId,
        update: &SpriteUpdate,
        cache: &mut AssetCache,
    ) -> Result<Option<ContentHash>, SyncError> {
        let Some(sprite) = self.sprites.get(id) else {
            warn!(sprite_id = %id, "Dropping update for sprite with no known state");
            return Err(SyncError::IncompleteUpdateData(id.clone()));
        };
        if let UpdateState::Updating(kind) = sprite.state {
            warn!(sprite_id = %id, ?kind, "Dropping update for sprite mid-update");
            return Err(SyncError::ReentrantUpdate(id.clone()));
        }
        if update.is_empty() {
            return Ok(None);
        }
        let merged = update.merged_onto(&sprite.descriptor);
        if !merged.is_well_formed() {
            warn!(sprite_id = %id, ?update, "Dropping update that would leave sprite malformed");
            return Err(SyncError::IncompleteUpdateData(id.clone()));
        }

        let awaiting = if needs_full_recreation(&sprite.descriptor, update) {
            self.recreate(id, merged, cache)?
        } else {
            self.update_in_place(id, update, merged);
            None
        };
        self.events.publish(SyncEvent::SpriteUpdated {
            sprite_id: id.clone(),
        });
        Ok(awaiting)
    }

    fn recreate(
        &mut self,
        id: &SpriteId,
        merged: SpriteDescriptor,
        cache: &mut AssetCache,
    ) -> Result<Option<ContentHash>, SyncError> {
        self.begin_update(id, UpdateKind::Recreate)?;
        let awaiting = self.unresolved(&merged.texture, cache);
        let Some(sprite) = self.sprites.get_mut(id) else {
            return Err(SyncError::IncompleteUpdateData(id.clone()));
        };
        if let Some(previous) = sprite.awaiting.take() {
            self.waiting.withdraw(&previous, |waiting| waiting == id);
        }
        let swapped = merged.texture != sprite.descriptor.texture;
        // Until a swapped-in texture arrives the sprite keeps drawing with what it has.
        if awaiting.is_none() {
            sprite.shown_texture = merged.texture.clone();
        }
        sprite.descriptor = merged;
        sprite.awaiting = awaiting;
        let rendered = sprite.rendered();

        debug!(sprite_id = %id, ?awaiting, "Recreating sprite");
        self.renderer.remove_sprite(id);
        self.renderer.add_sprite(&rendered);
        match awaiting {
            Some(hash) if swapped => {
                self.waiting.defer(hash, id.clone());
                if let Some(sprite) = self.sprites.get_mut(id) {
                    sprite.state = UpdateState::Updating(UpdateKind::Retexture);
                }
            }
            // Still waiting on the texture it was created with; nothing to revert to.
            Some(hash) => {
                self.waiting.defer(hash, id.clone());
                self.finish_update(id);
            }
            None => self.finish_update(id),
        }
        Ok(awaiting)
    }

    fn update_in_place(&mut self, id: &SpriteId, update: &SpriteUpdate, merged: SpriteDescriptor) {
        let Some(sprite) = self.sprites.get_mut(id) else {
            return;
        };
        sprite.descriptor = merged;
        let single = update.changed_field_count() == 1;
        let renderer = &mut self.renderer;
        match (update.position, update.scale, update.rotation) {
            (Some(position), _, _) if single && renderer.supports(IncrementalOp::Position) => {
                renderer.update_position(id, position)
            }
            (_, Some(scale), _) if single && renderer.supports(IncrementalOp::Scale) => {
                renderer.update_scale(id, scale)
            }
            (_, _, Some(rotation)) if single && renderer.supports(IncrementalOp::Rotation) => {
                renderer.update_rotation(id, rotation)
            }
            _ => renderer.update_sprite(&sprite.rendered()),
        }
    }

    /// Bind `hash` to every sprite that was waiting for it, in the order they started waiting.
    /// Returns how many sprites were bound.
    pub fn asset_resolved(&mut self, hash: ContentHash, cache: &mut AssetCache) -> usize {
        if self.waiting.waiting_on(&hash) == 0 {
            return 0;
        }
        if !self.ensure_loaded(hash, cache) {
            warn!(%hash, "Asset reported resolved but is not in the cache");
            return 0;
        }
        let mut bound = 0;
        for id in self.waiting.drain(&hash) {
            let Some(sprite) = self.sprites.get_mut(&id) else {
                continue;
            };
            if sprite.awaiting != Some(hash) {
                continue;
            }
            sprite.awaiting = None;
            sprite.shown_texture = sprite.descriptor.texture.clone();
            sprite.state = UpdateState::Idle;
            self.renderer.bind_texture(&id, &sprite.shown_texture);
            self.events.publish(SyncEvent::SpriteUpdated { sprite_id: id });
            bound += 1;
        }
        debug!(%hash, bound, "Bound resolved texture");
        bound
    }

    /// Give up on `hash`. New sprites stay on the placeholder; texture swaps are abandoned and
    /// the sprite keeps its previous texture.
    pub fn asset_failed(&mut self, hash: ContentHash) -> usize {
        let abandoned = self.waiting.discard(&hash);
        if abandoned.is_empty() {
            return 0;
        }
        warn!(%hash, sprites = abandoned.len(), "Texture asset unavailable");
        for id in &abandoned {
            let Some(sprite) = self.sprites.get_mut(id) else {
                continue;
            };
            if sprite.awaiting != Some(hash) {
                continue;
            }
            sprite.awaiting = None;
            if sprite.state == UpdateState::Updating(UpdateKind::Retexture) {
                sprite.descriptor.texture = sprite.shown_texture.clone();
                sprite.state = UpdateState::Idle;
            }
        }
        abandoned.len()
    }

    /// Remove a sprite. Removing one that is already gone is fine; returns whether anything was
    /// removed.
    pub fn remove(&mut self, id: &SpriteId) -> bool {
        if !self.detach(id) {
            trace!(sprite_id = %id, "Sprite already removed");
            return false;
        }
        self.renderer.remove_sprite(id);
        self.events.publish(SyncEvent::SpriteRemoved {
            sprite_id: id.clone(),
        });
        true
    }

    pub fn set_grid(&mut self, grid: &GridSpec) {
        self.renderer.set_grid(grid);
    }

    pub fn add_light(&mut self, light: &LightSpec) {
        self.renderer.add_light(light);
    }

    pub fn sprite(&self, id: &SpriteId) -> Option<&SpriteDescriptor> {
        self.sprites.get(id).map(|s| &s.descriptor)
    }

    pub fn is_awaiting_texture(&self, id: &SpriteId) -> bool {
        self.sprites.get(id).is_some_and(|s| s.awaiting.is_some())
    }

    pub fn update_state(&self, id: &SpriteId) -> Option<UpdateState> {
        self.sprites.get(id).map(|s| s.state)
    }

    pub fn sprite_count(&self) -> usize {
        self.sprites.len()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingRenderer, RenderCommand};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use tabula_assets::AssetMetadata;
    use tabula_common::{CacheConfig, Scale, Size, Tint, WorldPosition};

    fn setup() -> (SpriteMaterializer<RecordingRenderer>, AssetCache) {
        (
            SpriteMaterializer::new(RecordingRenderer::default(), "placeholder", EventBus::new()),
            AssetCache::new(CacheConfig::default()),
        )
    }

    fn sprite(id: &str, texture: TextureRef) -> SpriteDescriptor {
        SpriteDescriptor {
            id: id.into(),
            position: WorldPosition::new(0.0, 0.0),
            size: Size {
                width: 32.0,
                height: 32.0,
            },
            scale: Scale::default(),
            rotation: 0.0,
            layer: "tokens".to_string(),
            texture,
            tint: Tint::WHITE,
        }
    }

    fn cached(cache: &mut AssetCache, bytes: &'static [u8]) -> ContentHash {
        let hash = ContentHash::of(bytes);
        cache
            .put(hash, Bytes::from_static(bytes), AssetMetadata::new("t", "image/png"))
            .unwrap();
        hash
    }

    fn placeholder() -> TextureRef {
        TextureRef::Named("placeholder".to_string())
    }

    #[test]
    fn test_available_texture_is_loaded_once_and_bound() {
        let (mut m, mut cache) = setup();
        let hash = cached(&mut cache, b"goblin");
        assert_eq!(m.materialize(sprite("a", TextureRef::Asset(hash)), &mut cache), Ok(None));
        assert_eq!(m.materialize(sprite("b", TextureRef::Asset(hash)), &mut cache), Ok(None));
        let commands = m.renderer().commands();
        assert_eq!(
            commands
                .iter()
                .filter(|c| matches!(c, RenderCommand::LoadTexture(_)))
                .count(),
            1
        );
        assert_eq!(
            commands[1],
            RenderCommand::AddSprite(sprite("a", TextureRef::Asset(hash)))
        );
    }

    #[test]
    fn test_missing_texture_defers_with_placeholder() {
        let (mut m, mut cache) = setup();
        let hash = ContentHash::of(b"dragon");
        assert_eq!(
            m.materialize(sprite("a", TextureRef::Asset(hash)), &mut cache),
            Ok(Some(hash))
        );
        m.materialize(sprite("b", TextureRef::Asset(hash)), &mut cache)
            .unwrap();
        assert!(m.is_awaiting_texture(&"a".into()));
        assert_eq!(
            m.renderer().commands()[0],
            RenderCommand::AddSprite(sprite("a", placeholder()))
        );

        cached(&mut cache, b"dragon");
        m.renderer.take_commands();
        assert_eq!(m.asset_resolved(hash, &mut cache), 2);
        assert_eq!(
            m.renderer().commands(),
            vec![
                RenderCommand::LoadTexture(hash),
                RenderCommand::BindTexture("a".into(), TextureRef::Asset(hash)),
                RenderCommand::BindTexture("b".into(), TextureRef::Asset(hash)),
            ]
        );
        assert!(!m.is_awaiting_texture(&"a".into()));
        // Draining is one-shot.
        assert_eq!(m.asset_resolved(hash, &mut cache), 0);
    }

    #[test]
    fn test_removed_sprite_is_not_bound_later() {
        let (mut m, mut cache) = setup();
        let hash = ContentHash::of(b"dragon");
        m.materialize(sprite("a", TextureRef::Asset(hash)), &mut cache)
            .unwrap();
        assert!(m.remove(&"a".into()));
        assert!(!m.remove(&"a".into()));
        cached(&mut cache, b"dragon");
        assert_eq!(m.asset_resolved(hash, &mut cache), 0);
    }

    #[test]
    fn test_single_field_updates_are_incremental() {
        let (mut m, mut cache) = setup();
        m.materialize(sprite("a", TextureRef::Named("pawn".into())), &mut cache)
            .unwrap();
        m.renderer.take_commands();
        let id = SpriteId::from("a");
        m.update(&id, &SpriteUpdate::position(WorldPosition::new(5.0, 6.0)), &mut cache)
            .unwrap();
        m.update(&id, &SpriteUpdate::rotation(1.5), &mut cache)
            .unwrap();
        assert_eq!(
            m.renderer().commands(),
            vec![
                RenderCommand::UpdatePosition(id.clone(), WorldPosition::new(5.0, 6.0)),
                RenderCommand::UpdateRotation(id.clone(), 1.5),
            ]
        );
        assert_eq!(m.sprite(&id).unwrap().position, WorldPosition::new(5.0, 6.0));
    }

    #[test]
    fn test_unsupported_incremental_falls_back_to_full_update() {
        let mut m = SpriteMaterializer::new(
            RecordingRenderer::without(&[IncrementalOp::Scale]),
            "placeholder",
            EventBus::new(),
        );
        let mut cache = AssetCache::new(CacheConfig::default());
        m.materialize(sprite("a", TextureRef::Named("pawn".into())), &mut cache)
            .unwrap();
        m.renderer.take_commands();
        let scale = Scale { x: 2.0, y: 2.0 };
        m.update(&"a".into(), &SpriteUpdate::scale(scale), &mut cache)
            .unwrap();
        let mut expected = sprite("a", TextureRef::Named("pawn".into()));
        expected.scale = scale;
        assert_eq!(
            m.renderer().commands(),
            vec![RenderCommand::UpdateSprite(expected)]
        );
    }

    #[test]
    fn test_multi_field_update_sends_merged_descriptor() {
        let (mut m, mut cache) = setup();
        m.materialize(sprite("a", TextureRef::Named("pawn".into())), &mut cache)
            .unwrap();
        m.renderer.take_commands();
        let update = SpriteUpdate {
            position: Some(WorldPosition::new(1.0, 1.0)),
            rotation: Some(0.5),
            ..Default::default()
        };
        m.update(&"a".into(), &update, &mut cache).unwrap();
        let [RenderCommand::UpdateSprite(full)] = m.renderer().commands() else {
            panic!("expected one full update");
        };
        assert_eq!(full.position, WorldPosition::new(1.0, 1.0));
        assert_eq!(full.rotation, 0.5);
        assert_eq!(full.size, sprite("a", placeholder()).size);
    }

    #[test]
    fn test_partial_updates_without_known_state_are_dropped() {
        let (mut m, mut cache) = setup();
        assert_eq!(
            m.update(&"ghost".into(), &SpriteUpdate::rotation(1.0), &mut cache),
            Err(SyncError::IncompleteUpdateData("ghost".into()))
        );
        m.materialize(sprite("a", TextureRef::Named("pawn".into())), &mut cache)
            .unwrap();
        assert_eq!(
            m.update(&"a".into(), &SpriteUpdate::rotation(f32::NAN), &mut cache),
            Err(SyncError::IncompleteUpdateData("a".into()))
        );
        assert_eq!(m.sprite(&"a".into()).unwrap().rotation, 0.0);
    }

    #[test]
    fn test_layer_change_recreates() {
        let (mut m, mut cache) = setup();
        m.materialize(sprite("a", TextureRef::Named("pawn".into())), &mut cache)
            .unwrap();
        m.renderer.take_commands();
        let update = SpriteUpdate {
            layer: Some("map".to_string()),
            ..Default::default()
        };
        assert!(needs_full_recreation(m.sprite(&"a".into()).unwrap(), &update));
        m.update(&"a".into(), &update, &mut cache).unwrap();
        let commands = m.renderer().commands();
        assert_eq!(commands[0], RenderCommand::RemoveSprite("a".into()));
        assert!(matches!(&commands[1], RenderCommand::AddSprite(s) if s.layer == "map"));
        assert_eq!(m.update_state(&"a".into()), Some(UpdateState::Idle));
    }

    #[test]
    fn test_texture_swap_waits_and_blocks_updates() {
        let (mut m, mut cache) = setup();
        m.materialize(sprite("a", TextureRef::Named("pawn".into())), &mut cache)
            .unwrap();
        let hash = ContentHash::of(b"new art");
        let swap = SpriteUpdate {
            texture: Some(TextureRef::Asset(hash)),
            ..Default::default()
        };
        let id = SpriteId::from("a");
        assert_eq!(m.update(&id, &swap, &mut cache), Ok(Some(hash)));
        assert_eq!(
            m.update_state(&id),
            Some(UpdateState::Updating(UpdateKind::Retexture))
        );
        assert!(matches!(
            m.renderer().commands().last(),
            Some(RenderCommand::AddSprite(s)) if s.texture == TextureRef::Named("pawn".into())
        ));

        assert_eq!(
            m.update(&id, &SpriteUpdate::rotation(1.0), &mut cache),
            Err(SyncError::ReentrantUpdate(id.clone()))
        );

        cached(&mut cache, b"new art");
        assert_eq!(m.asset_resolved(hash, &mut cache), 1);
        assert_eq!(m.update_state(&id), Some(UpdateState::Idle));
        assert!(m.update(&id, &SpriteUpdate::rotation(1.0), &mut cache).is_ok());
    }

    #[test]
    fn test_failed_texture_swap_reverts() {
        let (mut m, mut cache) = setup();
        m.materialize(sprite("a", TextureRef::Named("pawn".into())), &mut cache)
            .unwrap();
        let hash = ContentHash::of(b"never arrives");
        let swap = SpriteUpdate {
            texture: Some(TextureRef::Asset(hash)),
            ..Default::default()
        };
        m.update(&"a".into(), &swap, &mut cache).unwrap();
        assert_eq!(m.asset_failed(hash), 1);
        assert_eq!(m.update_state(&"a".into()), Some(UpdateState::Idle));
        assert_eq!(
            m.sprite(&"a".into()).unwrap().texture,
            TextureRef::Named("pawn".into())
        );
    }

    #[test]
    fn test_relayer_while_awaiting_first_texture_keeps_it() {
        let (mut m, mut cache) = setup();
        let hash = ContentHash::of(b"still downloading");
        let id = SpriteId::from("a");
        m.materialize(sprite("a", TextureRef::Asset(hash)), &mut cache)
            .unwrap();
        m.renderer.take_commands();

        let relayer = SpriteUpdate {
            layer: Some("map".to_string()),
            ..Default::default()
        };
        assert_eq!(m.update(&id, &relayer, &mut cache), Ok(Some(hash)));
        // Not a texture swap, so later updates are not held up.
        assert_eq!(m.update_state(&id), Some(UpdateState::Idle));
        assert!(m.is_awaiting_texture(&id));
        assert!(matches!(
            m.renderer().commands().last(),
            Some(RenderCommand::AddSprite(s)) if s.texture == placeholder() && s.layer == "map"
        ));

        // A failed download leaves the intended texture in place.
        assert_eq!(m.asset_failed(hash), 1);
        assert!(!m.is_awaiting_texture(&id));
        assert_eq!(m.sprite(&id).unwrap().texture, TextureRef::Asset(hash));
        assert_eq!(m.sprite(&id).unwrap().layer, "map");
    }

    #[test]
    fn test_relayer_while_awaiting_first_texture_binds_on_arrival() {
        let (mut m, mut cache) = setup();
        let hash = ContentHash::of(b"slow art");
        let id = SpriteId::from("a");
        m.materialize(sprite("a", TextureRef::Asset(hash)), &mut cache)
            .unwrap();
        let relayer = SpriteUpdate {
            layer: Some("map".to_string()),
            ..Default::default()
        };
        m.update(&id, &relayer, &mut cache).unwrap();

        cached(&mut cache, b"slow art");
        assert_eq!(m.asset_resolved(hash, &mut cache), 1);
        assert_eq!(
            m.renderer().commands().last(),
            Some(&RenderCommand::BindTexture(id.clone(), TextureRef::Asset(hash)))
        );
    }

    #[test]
    fn test_materialize_replaces_existing() {
        let (mut m, mut cache) = setup();
        m.materialize(sprite("a", TextureRef::Named("pawn".into())), &mut cache)
            .unwrap();
        m.materialize(sprite("a", TextureRef::Named("rook".into())), &mut cache)
            .unwrap();
        assert_eq!(m.sprite_count(), 1);
        assert_eq!(
            m.renderer().commands()[1],
            RenderCommand::RemoveSprite("a".into())
        );
    }

    #[test]
    fn test_malformed_descriptor_is_refused() {
        let (mut m, mut cache) = setup();
        let mut bad = sprite("a", placeholder());
        bad.size.width = f32::INFINITY;
        assert!(m.materialize(bad, &mut cache).is_err());
        assert_eq!(m.sprite_count(), 0);
        assert!(m.renderer().commands().is_empty());
    }
}
