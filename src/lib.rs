//! Blinn-Phong lit surface shading.
//!
//! The crate carries the shading stage twice: a CPU reference in
//! [`lighting`] and [`surface`], and the matching WGSL programs plus wgpu
//! pipeline setup under [`render`]. The CPU path drives the preview renderer
//! and the `lit-surface` binary, and keeps the math testable without a GPU.
//! [`render::Renderer`] draws [`render::FramePacket`]s offscreen with the
//! same surfaces on the GPU.

pub mod camera;
pub mod lighting;
pub mod mesh;
pub mod preview;
pub mod render;
pub mod scene;
pub mod sprite;
pub mod surface;
pub mod texture;
pub mod texture_cache;
pub mod transform;

pub use camera::Camera;
pub use lighting::{shade, AmbientTerm, LightDescriptor, SurfaceParams};
pub use mesh::{load_obj_from_str, uv_sphere, Mesh};
pub use preview::{render_sphere, PreviewSettings};
pub use render::{FramePacket, ModelMaterial, Renderer};
pub use scene::{LightOverrides, Probe, Scene, SurfaceConfig};
pub use sprite::{sprite_fragment, sprite_vertex, SpriteInstance, SpriteVertex};
pub use surface::{
    BaseColorSource, FragmentInput, ShadeError, SurfaceShader, SurfaceVariant, TexturedSurface,
    VertexColorSurface,
};
pub use texture::{AddressMode, FilterMode, Sampler, Texture, TextureError};
pub use texture_cache::TextureCache;
pub use transform::{
    passthrough_fragment, transform_vertex, FrameUniforms, InstanceData, Vertex, VertexOutput,
};
