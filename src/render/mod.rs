pub mod pipeline;
pub mod renderer;
pub mod shaders;

pub use pipeline::{
    instance_buffer, instance_layout, sprite_instance_layout, vertex_layout, GpuMesh, GpuTexture,
    LightUniform, LitPipeline, PassthroughPipeline, SpritePipeline,
};
pub use renderer::{
    sphere_transform, AtlasId, FramePacket, FramePacketModel, FramePacketSprites, ModelId,
    ModelMaterial, Renderer,
};
