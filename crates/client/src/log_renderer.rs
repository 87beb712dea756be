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

use std::collections::HashSet;
use tabula_common::{ContentHash, Scale, SpriteDescriptor, SpriteId, TextureRef, WorldPosition};
use tabula_sync::{GridSpec, LightSpec, RenderEngine};
use tracing::info;

/// A render engine with no screen: every command becomes a log line.
#[derive(Default)]
pub struct LogRenderer {
    textures: HashSet<ContentHash>,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderEngine for LogRenderer {
    fn add_sprite(&mut self, sprite: &SpriteDescriptor) {
        info!(
            sprite_id = %sprite.id,
            x = sprite.position.x,
            y = sprite.position.y,
            layer = %sprite.layer,
            texture = %sprite.texture,
            "add sprite"
        );
    }

    fn update_sprite(&mut self, sprite: &SpriteDescriptor) {
        info!(sprite_id = %sprite.id, texture = %sprite.texture, "rebuild sprite");
    }

    fn remove_sprite(&mut self, id: &SpriteId) {
        info!(sprite_id = %id, "remove sprite");
    }

    fn update_position(&mut self, id: &SpriteId, position: WorldPosition) {
        info!(sprite_id = %id, x = position.x, y = position.y, "move sprite");
    }

    fn update_scale(&mut self, id: &SpriteId, scale: Scale) {
        info!(sprite_id = %id, ?scale, "scale sprite");
    }

    fn update_rotation(&mut self, id: &SpriteId, rotation: f32) {
        info!(sprite_id = %id, rotation, "rotate sprite");
    }

    fn bind_texture(&mut self, id: &SpriteId, texture: &TextureRef) {
        info!(sprite_id = %id, %texture, "bind texture");
    }

    fn load_texture(&mut self, hash: ContentHash, bytes: &[u8]) {
        if self.textures.insert(hash) {
            info!(%hash, size = bytes.len(), "load texture");
        }
    }

    fn add_light(&mut self, light: &LightSpec) {
        info!(?light, "add light");
    }

    fn set_grid(&mut self, grid: &GridSpec) {
        info!(?grid, "set grid");
    }
}
