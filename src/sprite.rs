use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec4};

use crate::texture::{Sampler, Texture};

/// Corner offsets in units of the rectangle size, indexed by vertex index.
///
/// The order draws the quad as a four-vertex triangle strip.
pub const CORNER_OFFSETS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];

/// Clip-space position that lies outside the view volume on every axis.
pub const DISCARD_POSITION: Vec4 = Vec4::new(10.0, 10.0, 10.0, 1.0);

/// One sprite drawn from an atlas.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SpriteInstance {
    /// Top-left corner in screen space.
    pub screen_pos: [f32; 2],
    pub screen_size: [f32; 2],
    /// Top-left corner in atlas texture coordinates.
    pub atlas_pos: [f32; 2],
    pub atlas_size: [f32; 2],
}

/// Output of the sprite vertex stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteVertex {
    pub position: Vec4,
    pub atlas_coord: Vec2,
}

/// Generates corner `index` of the sprite quad.
///
/// Indices past the fourth corner are pushed outside the clip volume so the
/// rasterizer discards them.
pub fn sprite_vertex(sprite: &SpriteInstance, index: u32) -> SpriteVertex {
    let Some(offset) = CORNER_OFFSETS.get(index as usize) else {
        return SpriteVertex {
            position: DISCARD_POSITION,
            atlas_coord: Vec2::ZERO,
        };
    };
    let offset = Vec2::from(*offset);
    let screen = Vec2::from(sprite.screen_pos) + offset * Vec2::from(sprite.screen_size);
    let atlas = Vec2::from(sprite.atlas_pos) + offset * Vec2::from(sprite.atlas_size);
    SpriteVertex {
        position: Vec4::new(screen.x, screen.y, 0.0, 1.0),
        atlas_coord: atlas,
    }
}

/// Fragment stage of the sprite program: the atlas sample, unmodified.
pub fn sprite_fragment(atlas: &Texture, sampler: &Sampler, atlas_coord: Vec2) -> Vec4 {
    atlas.sample(sampler, atlas_coord)
}
