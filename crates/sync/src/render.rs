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

//! The seam between synchronization and whatever actually draws the table.

use tabula_common::{ContentHash, Scale, SpriteDescriptor, SpriteId, TextureRef, Tint, WorldPosition};

/// Single-field updates a render engine may be able to apply without rebuilding the sprite.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IncrementalOp {
    Position,
    Scale,
    Rotation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GridSpec {
    pub cell_size: f32,
    pub offset: WorldPosition,
    pub visible: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LightSpec {
    pub position: WorldPosition,
    pub radius: f32,
    pub color: Tint,
    pub intensity: f32,
}

/// Commands understood by the renderer. Only the materializer issues them.
///
/// Every sprite handed over is complete; partial state never crosses this boundary. Commands are
/// fire-and-forget.
pub trait RenderEngine {
    fn add_sprite(&mut self, sprite: &SpriteDescriptor);
    /// Replace every property of an existing sprite.
    fn update_sprite(&mut self, sprite: &SpriteDescriptor);
    fn remove_sprite(&mut self, id: &SpriteId);
    fn update_position(&mut self, id: &SpriteId, position: WorldPosition);
    fn update_scale(&mut self, id: &SpriteId, scale: Scale);
    fn update_rotation(&mut self, id: &SpriteId, rotation: f32);
    fn bind_texture(&mut self, id: &SpriteId, texture: &TextureRef);
    /// Make an asset's bytes available for binding as `TextureRef::Asset(hash)`.
    fn load_texture(&mut self, hash: ContentHash, bytes: &[u8]);
    fn add_light(&mut self, light: &LightSpec);
    fn set_grid(&mut self, grid: &GridSpec);

    fn supports(&self, _op: IncrementalOp) -> bool {
        true
    }
}
