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

//! The sprite model shared between the wire protocol and the materializer.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Identifies a sprite, whether provisional (a temp id minted locally) or authoritative (issued by
/// the server).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpriteId(String);

impl SpriteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SpriteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpriteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SpriteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldPosition {
    pub x: f32,
    pub y: f32,
}

impl WorldPosition {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub x: f32,
    pub y: f32,
}

impl Default for Scale {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tint {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Default for Tint {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Tint {
    pub const WHITE: Tint = Tint {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
}

/// What a sprite draws with: either an uploaded asset, named by its content hash, or a resource
/// the render engine already knows by name (compendium art, built-in markers).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TextureRef {
    Asset(ContentHash),
    Named(String),
}

impl TextureRef {
    pub fn asset_hash(&self) -> Option<ContentHash> {
        match self {
            TextureRef::Asset(hash) => Some(*hash),
            TextureRef::Named(_) => None,
        }
    }
}

impl Display for TextureRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TextureRef::Asset(hash) => write!(f, "asset:{hash}"),
            TextureRef::Named(name) => write!(f, "named:{name}"),
        }
    }
}

/// A complete sprite: every field the render engine needs is known.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpriteDescriptor {
    pub id: SpriteId,
    pub position: WorldPosition,
    pub size: Size,
    #[serde(default)]
    pub scale: Scale,
    #[serde(default)]
    pub rotation: f32,
    pub layer: String,
    pub texture: TextureRef,
    #[serde(default)]
    pub tint: Tint,
}

impl SpriteDescriptor {
    /// All numeric geometry is finite and dimensions are non-negative.
    pub fn is_well_formed(&self) -> bool {
        let finite = [
            self.position.x,
            self.position.y,
            self.size.width,
            self.size.height,
            self.scale.x,
            self.scale.y,
            self.rotation,
            self.tint.r,
            self.tint.g,
            self.tint.b,
            self.tint.a,
        ]
        .iter()
        .all(|v| v.is_finite());
        finite && self.size.width >= 0.0 && self.size.height >= 0.0 && !self.layer.is_empty()
    }

    /// The same sprite under a different identifier.
    pub fn with_id(mut self, id: SpriteId) -> Self {
        self.id = id;
        self
    }
}

/// A partial sprite: only the fields that changed. Never handed to the render engine as-is.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct SpriteUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<WorldPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Scale>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<TextureRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tint: Option<Tint>,
}

impl SpriteUpdate {
    pub fn position(position: WorldPosition) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn scale(scale: Scale) -> Self {
        Self {
            scale: Some(scale),
            ..Default::default()
        }
    }

    pub fn rotation(rotation: f32) -> Self {
        Self {
            rotation: Some(rotation),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed_field_count() == 0
    }

    pub fn changed_field_count(&self) -> usize {
        [
            self.position.is_some(),
            self.size.is_some(),
            self.scale.is_some(),
            self.rotation.is_some(),
            self.layer.is_some(),
            self.texture.is_some(),
            self.tint.is_some(),
        ]
        .iter()
        .filter(|changed| **changed)
        .count()
    }

    /// The label to broadcast this update under.
    pub fn operation(&self) -> SpriteOperation {
        if self.changed_field_count() != 1 {
            return SpriteOperation::Multiple;
        }
        if self.position.is_some() {
            SpriteOperation::Move
        } else if self.size.is_some() {
            SpriteOperation::Resize
        } else if self.scale.is_some() {
            SpriteOperation::Scale
        } else if self.rotation.is_some() {
            SpriteOperation::Rotate
        } else if self.layer.is_some() {
            SpriteOperation::Relayer
        } else if self.texture.is_some() {
            SpriteOperation::Retexture
        } else {
            SpriteOperation::Tint
        }
    }

    /// Overlay the changed fields onto the last-known-complete state.
    pub fn merged_onto(&self, base: &SpriteDescriptor) -> SpriteDescriptor {
        SpriteDescriptor {
            id: base.id.clone(),
            position: self.position.unwrap_or(base.position),
            size: self.size.unwrap_or(base.size),
            scale: self.scale.unwrap_or(base.scale),
            rotation: self.rotation.unwrap_or(base.rotation),
            layer: self.layer.clone().unwrap_or_else(|| base.layer.clone()),
            texture: self.texture.clone().unwrap_or_else(|| base.texture.clone()),
            tint: self.tint.unwrap_or(base.tint),
        }
    }
}

/// The label a `sprite_update` broadcast carries. Informational only: what actually changed is
/// read from the fields themselves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpriteOperation {
    Move,
    Resize,
    Scale,
    Rotate,
    Retexture,
    Relayer,
    Tint,
    Multiple,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn token() -> SpriteDescriptor {
        SpriteDescriptor {
            id: "s1".into(),
            position: WorldPosition::new(10.0, 20.0),
            size: Size {
                width: 64.0,
                height: 64.0,
            },
            scale: Scale::default(),
            rotation: 0.0,
            layer: "tokens".to_string(),
            texture: TextureRef::Named("marker".to_string()),
            tint: Tint::WHITE,
        }
    }

    #[test]
    fn test_merge_only_touches_changed_fields() {
        let base = token();
        let merged = SpriteUpdate::position(WorldPosition::new(1.0, 2.0)).merged_onto(&base);
        assert_eq!(merged.position, WorldPosition::new(1.0, 2.0));
        assert_eq!(merged.size, base.size);
        assert_eq!(merged.layer, base.layer);
        assert_eq!(merged.texture, base.texture);
    }

    #[test]
    fn test_changed_field_count() {
        assert!(SpriteUpdate::default().is_empty());
        let update = SpriteUpdate {
            rotation: Some(1.0),
            layer: Some("map".to_string()),
            ..Default::default()
        };
        assert_eq!(update.changed_field_count(), 2);
        assert_eq!(update.operation(), SpriteOperation::Multiple);
    }

    #[test]
    fn test_single_field_operations() {
        assert_eq!(
            SpriteUpdate::position(WorldPosition::new(0.0, 0.0)).operation(),
            SpriteOperation::Move
        );
        assert_eq!(SpriteUpdate::rotation(0.5).operation(), SpriteOperation::Rotate);
        let retint = SpriteUpdate {
            tint: Some(Tint::WHITE),
            ..Default::default()
        };
        assert_eq!(retint.operation(), SpriteOperation::Tint);
    }

    #[test]
    fn test_non_finite_geometry_is_malformed() {
        let mut sprite = token();
        assert!(sprite.is_well_formed());
        sprite.rotation = f32::NAN;
        assert!(!sprite.is_well_formed());
    }

    #[test]
    fn test_partial_update_decodes_with_missing_fields() {
        let update: SpriteUpdate = serde_json::from_str(r#"{"scale":{"x":2.0,"y":2.0}}"#).unwrap();
        assert_eq!(update, SpriteUpdate::scale(Scale { x: 2.0, y: 2.0 }));
    }
}
