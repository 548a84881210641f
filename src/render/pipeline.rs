use std::mem::size_of;
use std::num::NonZeroU64;

use bytemuck::{bytes_of, Pod, Zeroable};
use log::debug;
use wgpu::util::DeviceExt;

use crate::lighting::{AmbientTerm, SurfaceParams};
use crate::sprite::SpriteInstance;
use crate::surface::SurfaceVariant;
use crate::texture::{self, Texture};
use crate::transform::{FrameUniforms, InstanceData, Vertex};

use super::shaders::{LIT_SHADER, PASSTHROUGH_SHADER, SPRITE_SHADER};

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x4,
    3 => Float32x2
];

const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 8] = wgpu::vertex_attr_array![
    4 => Float32x4,
    5 => Float32x4,
    6 => Float32x4,
    7 => Float32x4,
    8 => Float32x4,
    9 => Float32x4,
    10 => Float32x4,
    11 => Float32x4
];

const SPRITE_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Float32x2,
    2 => Float32x2,
    3 => Float32x2
];

/// Per-vertex buffer layout for [`Vertex`].
pub fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: size_of::<Vertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRIBUTES,
    }
}

/// Per-instance buffer layout for [`InstanceData`]: model matrix columns at
/// locations 4-7, normal matrix columns at 8-11.
pub fn instance_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: size_of::<InstanceData>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &INSTANCE_ATTRIBUTES,
    }
}

pub fn sprite_instance_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: size_of::<SpriteInstance>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &SPRITE_ATTRIBUTES,
    }
}

/// Light block bound next to the frame uniforms.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightUniform {
    pub position: [f32; 4],
    pub color: [f32; 4],
    pub ambient: [f32; 4],
    /// power, shininess, ambient mode (1 = scaled by base color), unused
    pub params: [f32; 4],
}

impl From<&SurfaceParams> for LightUniform {
    fn from(params: &SurfaceParams) -> Self {
        let light = &params.light;
        let (ambient, mode) = match params.ambient {
            AmbientTerm::ScaledBase(weight) => ([weight; 3], 1.0),
            AmbientTerm::Flat(color) => (color.to_array(), 0.0),
        };
        Self {
            position: light.position.extend(1.0).to_array(),
            color: light.color.extend(1.0).to_array(),
            ambient: [ambient[0], ambient[1], ambient[2], 0.0],
            params: [light.power, light.shininess, mode, 0.0],
        }
    }
}

fn uniform_entry<T>(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(size_of::<T>() as u64),
        },
        count: None,
    }
}

fn texture_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

fn texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    texture: &GpuTexture,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&texture.sampler),
            },
        ],
    })
}

fn depth_state(format: Option<wgpu::TextureFormat>) -> Option<wgpu::DepthStencilState> {
    format.map(|format| wgpu::DepthStencilState {
        format,
        depth_write_enabled: true,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: Default::default(),
        bias: Default::default(),
    })
}

/// Base-color texture and its sampler resident on the GPU.
pub struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

impl GpuTexture {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texture: &Texture,
        sampler: &texture::Sampler,
        label: &str,
    ) -> Self {
        let gpu_texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: texture.width(),
                    height: texture.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Self::FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            texture.as_bytes(),
        );
        let view = gpu_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&sampler_descriptor(sampler));
        Self {
            _texture: gpu_texture,
            view,
            sampler,
        }
    }
}

fn sampler_descriptor(sampler: &texture::Sampler) -> wgpu::SamplerDescriptor<'static> {
    wgpu::SamplerDescriptor {
        label: Some("base-color-sampler"),
        address_mode_u: address_mode(sampler.address_u),
        address_mode_v: address_mode(sampler.address_v),
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter_mode(sampler.mag_filter),
        min_filter: filter_mode(sampler.min_filter),
        ..Default::default()
    }
}

fn filter_mode(mode: texture::FilterMode) -> wgpu::FilterMode {
    match mode {
        texture::FilterMode::Nearest => wgpu::FilterMode::Nearest,
        texture::FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn address_mode(mode: texture::AddressMode) -> wgpu::AddressMode {
    match mode {
        texture::AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        texture::AddressMode::Repeat => wgpu::AddressMode::Repeat,
        texture::AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

/// Vertex and index buffers of one mesh.
pub struct GpuMesh {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    pub fn new(device: &wgpu::Device, vertices: &[Vertex], indices: &[u32], label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: indices.len() as u32,
        }
    }
}

/// Instance buffer built fresh for a draw.
pub fn instance_buffer<T: Pod>(device: &wgpu::Device, instances: &[T], label: &str) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(instances),
        usage: wgpu::BufferUsages::VERTEX,
    })
}

/// Render pipeline for one lit surface variant plus its per-frame uniforms.
pub struct LitPipeline {
    variant: SurfaceVariant,
    pipeline: wgpu::RenderPipeline,
    locals_buffer: wgpu::Buffer,
    light_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    texture_layout: Option<wgpu::BindGroupLayout>,
}

impl LitPipeline {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
        variant: SurfaceVariant,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lit-shader"),
            source: wgpu::ShaderSource::Wgsl(LIT_SHADER.into()),
        });

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lit-frame-layout"),
            entries: &[
                uniform_entry::<FrameUniforms>(0),
                uniform_entry::<LightUniform>(1),
            ],
        });

        let locals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("locals-uniform"),
            size: size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let light_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("light-uniform"),
            contents: bytes_of(&LightUniform::from(&variant.default_params())),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lit-frame-bind-group"),
            layout: &frame_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: locals_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: light_buffer.as_entire_binding(),
                },
            ],
        });

        let texture_layout = match variant {
            SurfaceVariant::Textured => Some(texture_layout(device, "lit-texture-layout")),
            SurfaceVariant::VertexColor => None,
        };
        let mut bind_group_layouts = vec![&frame_layout];
        bind_group_layouts.extend(texture_layout.as_ref());

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lit-pipeline-layout"),
            bind_group_layouts: &bind_group_layouts,
            push_constant_ranges: &[],
        });

        let fragment_entry = match variant {
            SurfaceVariant::Textured => "fs_textured",
            SurfaceVariant::VertexColor => "fs_vertex_color",
        };
        debug!("creating lit pipeline for {variant} surfaces ({fragment_entry})");

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("lit-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[vertex_layout(), instance_layout()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: depth_state(depth_format),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(fragment_entry),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        Self {
            variant,
            pipeline,
            locals_buffer,
            light_buffer,
            frame_bind_group,
            texture_layout,
        }
    }

    pub fn variant(&self) -> SurfaceVariant {
        self.variant
    }

    /// Uploads the view/projection block and the light parameters.
    pub fn write_frame(&self, queue: &wgpu::Queue, locals: &FrameUniforms, params: &SurfaceParams) {
        queue.write_buffer(&self.locals_buffer, 0, bytes_of(locals));
        queue.write_buffer(&self.light_buffer, 0, bytes_of(&LightUniform::from(params)));
    }

    /// Bind group for the base-color texture; `None` for vertex-colored
    /// pipelines, which bind no texture.
    pub fn texture_bind_group(
        &self,
        device: &wgpu::Device,
        texture: &GpuTexture,
    ) -> Option<wgpu::BindGroup> {
        let layout = self.texture_layout.as_ref()?;
        Some(texture_bind_group(device, layout, texture, "lit-texture-bind-group"))
    }

    /// Records an instanced draw of `mesh`.
    pub fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        mesh: &GpuMesh,
        instances: &wgpu::Buffer,
        instance_count: u32,
        texture: Option<&wgpu::BindGroup>,
    ) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.frame_bind_group, &[]);
        if let Some(texture) = texture {
            pass.set_bind_group(1, texture, &[]);
        }
        pass.set_vertex_buffer(0, mesh.vertex.slice(..));
        pass.set_vertex_buffer(1, instances.slice(..));
        pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..mesh.index_count, 0, 0..instance_count);
    }
}

/// Unlit transform + vertex color program.
pub struct PassthroughPipeline {
    pipeline: wgpu::RenderPipeline,
    locals_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl PassthroughPipeline {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("passthrough-shader"),
            source: wgpu::ShaderSource::Wgsl(PASSTHROUGH_SHADER.into()),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("passthrough-layout"),
            entries: &[uniform_entry::<FrameUniforms>(0)],
        });
        let locals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("passthrough-locals"),
            size: size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("passthrough-bind-group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: locals_buffer.as_entire_binding(),
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("passthrough-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("passthrough-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[vertex_layout(), instance_layout()],
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: depth_state(depth_format),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });
        Self {
            pipeline,
            locals_buffer,
            bind_group,
        }
    }

    pub fn write_frame(&self, queue: &wgpu::Queue, locals: &FrameUniforms) {
        queue.write_buffer(&self.locals_buffer, 0, bytes_of(locals));
    }

    pub fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        mesh: &GpuMesh,
        instances: &wgpu::Buffer,
        instance_count: u32,
    ) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, mesh.vertex.slice(..));
        pass.set_vertex_buffer(1, instances.slice(..));
        pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..mesh.index_count, 0, 0..instance_count);
    }
}

/// Alpha-blended atlas sprite overlay.
pub struct SpritePipeline {
    pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
}

impl SpritePipeline {
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sprite-shader"),
            source: wgpu::ShaderSource::Wgsl(SPRITE_SHADER.into()),
        });
        let texture_layout = texture_layout(device, "sprite-atlas-layout");
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sprite-pipeline-layout"),
            bind_group_layouts: &[&texture_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sprite-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_sprite"),
                compilation_options: Default::default(),
                buffers: &[sprite_instance_layout()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_sprite"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });
        Self {
            pipeline,
            texture_layout,
        }
    }

    pub fn atlas_bind_group(&self, device: &wgpu::Device, atlas: &GpuTexture) -> wgpu::BindGroup {
        texture_bind_group(device, &self.texture_layout, atlas, "sprite-atlas-bind-group")
    }

    /// Draws `sprite_count` quads, four strip vertices each.
    pub fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        atlas: &wgpu::BindGroup,
        sprites: &wgpu::Buffer,
        sprite_count: u32,
    ) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, atlas, &[]);
        pass.set_vertex_buffer(0, sprites.slice(..));
        pass.draw(0..4, 0..sprite_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::LightDescriptor;
    use glam::Vec3;

    #[test]
    fn vertex_layout_matches_struct() {
        let layout = vertex_layout();
        assert_eq!(layout.array_stride, 48);
        let offsets: Vec<u64> = layout.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 40]);
    }

    #[test]
    fn instance_layout_follows_vertex_locations() {
        let layout = instance_layout();
        assert_eq!(layout.array_stride, 128);
        assert_eq!(layout.step_mode, wgpu::VertexStepMode::Instance);
        let locations: Vec<u32> = layout.attributes.iter().map(|a| a.shader_location).collect();
        assert_eq!(locations, (4..12).collect::<Vec<_>>());
        assert_eq!(layout.attributes[7].offset, 112);
    }

    #[test]
    fn sprite_layout_packs_four_pairs() {
        let layout = sprite_instance_layout();
        assert_eq!(layout.array_stride, 32);
        assert_eq!(layout.attributes[3].offset, 24);
    }

    #[test]
    fn light_uniform_encodes_ambient_mode() {
        let textured = LightUniform::from(&SurfaceVariant::Textured.default_params());
        assert_eq!(textured.position, [1.0, 4.0, 3.0, 1.0]);
        assert_eq!(textured.params, [5.0, 15.0, 1.0, 0.0]);
        assert_eq!(textured.ambient, [0.02, 0.02, 0.02, 0.0]);

        let flat = LightUniform::from(&SurfaceParams {
            light: LightDescriptor::new(3.0),
            ambient: AmbientTerm::Flat(Vec3::new(0.1, 0.2, 0.3)),
        });
        assert_eq!(flat.params[2], 0.0);
        assert_eq!(flat.ambient, [0.1, 0.2, 0.3, 0.0]);
    }

    #[test]
    fn default_sampler_matches_gpu_descriptor() {
        let descriptor = sampler_descriptor(&texture::Sampler::default());
        assert_eq!(descriptor.mag_filter, wgpu::FilterMode::Linear);
        assert_eq!(descriptor.min_filter, wgpu::FilterMode::Nearest);
        assert_eq!(descriptor.address_mode_u, wgpu::AddressMode::ClampToEdge);
    }
}
