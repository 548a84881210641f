use std::collections::HashMap;
use std::sync::{mpsc, Arc};

use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Vec3};
use image::RgbaImage;
use log::{debug, info};

use super::pipeline::{
    instance_buffer, GpuMesh, GpuTexture, LitPipeline, PassthroughPipeline, SpritePipeline,
};
use crate::camera::Camera;
use crate::lighting::SurfaceParams;
use crate::mesh::Mesh;
use crate::preview::CLEAR_COLOR;
use crate::sprite::SpriteInstance;
use crate::surface::SurfaceVariant;
use crate::texture::{Sampler, Texture};
use crate::transform::{FrameUniforms, InstanceData};

/// Handle to a mesh uploaded with [`Renderer::upload_model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(usize);

/// Handle to a sprite atlas uploaded with [`Renderer::upload_atlas`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtlasId(usize);

/// How an uploaded model is shaded.
#[derive(Debug, Clone)]
pub enum ModelMaterial {
    Textured { texture: Arc<Texture>, sampler: Sampler },
    VertexColor,
    /// Vertex color without lighting.
    Unlit,
}

impl ModelMaterial {
    pub fn variant(&self) -> Option<SurfaceVariant> {
        match self {
            Self::Textured { .. } => Some(SurfaceVariant::Textured),
            Self::VertexColor => Some(SurfaceVariant::VertexColor),
            Self::Unlit => None,
        }
    }
}

/// Instances of one uploaded model drawn this frame.
#[derive(Debug, Clone)]
pub struct FramePacketModel {
    pub model_id: ModelId,
    pub instances: Vec<InstanceData>,
}

/// Sprites drawn from one atlas, on top of the models.
#[derive(Debug, Clone)]
pub struct FramePacketSprites {
    pub atlas_id: AtlasId,
    pub instances: Vec<SpriteInstance>,
}

/// Everything the renderer needs to draw one frame.
#[derive(Debug, Clone)]
pub struct FramePacket {
    pub view: Mat4,
    pub projection: Mat4,
    pub models: Vec<FramePacketModel>,
    pub sprites: Vec<FramePacketSprites>,
}

impl FramePacket {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self {
            view,
            projection,
            models: Vec::new(),
            sprites: Vec::new(),
        }
    }

    pub fn from_camera(camera: &Camera, aspect_ratio: f32) -> Self {
        Self::new(camera.view(), camera.projection(aspect_ratio))
    }

    /// Queues one instance of `model_id` placed by `model`.
    ///
    /// Fails when `view * model` cannot be inverted for the normal matrix.
    pub fn push_model(&mut self, model_id: ModelId, model: Mat4) -> Result<()> {
        let instance = InstanceData::new(model, self.view)
            .ok_or_else(|| anyhow!("model matrix is singular"))?;
        match self.models.iter_mut().find(|entry| entry.model_id == model_id) {
            Some(entry) => entry.instances.push(instance),
            None => self.models.push(FramePacketModel {
                model_id,
                instances: vec![instance],
            }),
        }
        Ok(())
    }

    pub fn push_sprite(&mut self, atlas_id: AtlasId, sprite: SpriteInstance) {
        match self.sprites.iter_mut().find(|entry| entry.atlas_id == atlas_id) {
            Some(entry) => entry.instances.push(sprite),
            None => self.sprites.push(FramePacketSprites {
                atlas_id,
                instances: vec![sprite],
            }),
        }
    }

    fn uniforms(&self) -> FrameUniforms {
        FrameUniforms::new(self.view, self.projection)
    }
}

struct GpuModel {
    mesh: GpuMesh,
    material: Option<SurfaceVariant>,
    texture_bind_group: Option<wgpu::BindGroup>,
    _texture: Option<GpuTexture>,
}

struct GpuAtlas {
    bind_group: wgpu::BindGroup,
    _texture: GpuTexture,
}

struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl RenderTarget {
    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen-color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Renderer::COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen-depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Renderer::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        Self {
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            texture,
            width,
            height,
        }
    }
}

/// Offscreen renderer that draws [`FramePacket`]s with the lit, unlit and
/// sprite pipelines and reads the result back.
pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: RenderTarget,
    textured: LitPipeline,
    vertex_color: LitPipeline,
    unlit: PassthroughPipeline,
    sprites: SpritePipeline,
    params: HashMap<SurfaceVariant, SurfaceParams>,
    models: HashMap<ModelId, GpuModel>,
    next_model_id: ModelId,
    atlases: HashMap<AtlasId, GpuAtlas>,
    next_atlas_id: AtlasId,
}

impl Renderer {
    /// Linear target: the lit programs already gamma-encode their output.
    pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    /// Creates a renderer without a window, drawing into a `width` x `height`
    /// texture.
    pub async fn new_headless(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("render target has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        info!("using adapter {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("renderer-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await
            .context("failed to create GPU device")?;

        let target = RenderTarget::create(&device, width, height);
        let depth = Some(Self::DEPTH_FORMAT);
        let textured = LitPipeline::new(&device, Self::COLOR_FORMAT, depth, SurfaceVariant::Textured);
        let vertex_color =
            LitPipeline::new(&device, Self::COLOR_FORMAT, depth, SurfaceVariant::VertexColor);
        let unlit = PassthroughPipeline::new(&device, Self::COLOR_FORMAT, depth);
        let sprites = SpritePipeline::new(&device, Self::COLOR_FORMAT);

        Ok(Self {
            device,
            queue,
            target,
            textured,
            vertex_color,
            unlit,
            sprites,
            params: HashMap::new(),
            models: HashMap::new(),
            next_model_id: ModelId(0),
            atlases: HashMap::new(),
            next_atlas_id: AtlasId(0),
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.target.width, self.target.height)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.target.width as f32 / self.target.height as f32
    }

    /// Overrides the lighting parameters used for `variant`; the variant's
    /// defaults apply until this is called.
    pub fn set_surface_params(&mut self, variant: SurfaceVariant, params: SurfaceParams) {
        self.params.insert(variant, params);
    }

    fn surface_params(&self, variant: SurfaceVariant) -> SurfaceParams {
        self.params
            .get(&variant)
            .copied()
            .unwrap_or_else(|| variant.default_params())
    }

    pub fn upload_model(&mut self, mesh: &Mesh, material: &ModelMaterial) -> Result<ModelId> {
        if mesh.indices.is_empty() {
            return Err(anyhow!("mesh has no triangles"));
        }
        let id = self.next_model_id;
        let label = format!("model-{}", id.0);
        let gpu_mesh = GpuMesh::new(&self.device, &mesh.vertices, &mesh.indices, &label);

        let (texture, texture_bind_group) = match material {
            ModelMaterial::Textured { texture, sampler } => {
                let gpu_texture =
                    GpuTexture::upload(&self.device, &self.queue, texture, sampler, &label);
                let bind_group = self.textured.texture_bind_group(&self.device, &gpu_texture);
                (Some(gpu_texture), bind_group)
            }
            ModelMaterial::VertexColor | ModelMaterial::Unlit => (None, None),
        };

        debug!(
            "uploaded model {} ({} triangles, {:?})",
            id.0,
            mesh.triangle_count(),
            material.variant()
        );
        self.models.insert(
            id,
            GpuModel {
                mesh: gpu_mesh,
                material: material.variant(),
                texture_bind_group,
                _texture: texture,
            },
        );
        self.next_model_id = ModelId(id.0 + 1);
        Ok(id)
    }

    pub fn upload_atlas(&mut self, atlas: &Texture, sampler: &Sampler) -> AtlasId {
        let id = self.next_atlas_id;
        let texture = GpuTexture::upload(
            &self.device,
            &self.queue,
            atlas,
            sampler,
            &format!("atlas-{}", id.0),
        );
        let bind_group = self.sprites.atlas_bind_group(&self.device, &texture);
        self.atlases.insert(
            id,
            GpuAtlas {
                bind_group,
                _texture: texture,
            },
        );
        self.next_atlas_id = AtlasId(id.0 + 1);
        id
    }

    /// Draws the models of `packet` with depth testing, then its sprites on
    /// top, and submits the work.
    pub fn draw_frame(&mut self, packet: &FramePacket) -> Result<()> {
        for entry in &packet.models {
            if !self.models.contains_key(&entry.model_id) {
                return Err(anyhow!("frame packet references unknown model {:?}", entry.model_id));
            }
        }
        for entry in &packet.sprites {
            if !self.atlases.contains_key(&entry.atlas_id) {
                return Err(anyhow!("frame packet references unknown atlas {:?}", entry.atlas_id));
            }
        }

        let locals = packet.uniforms();
        self.textured
            .write_frame(&self.queue, &locals, &self.surface_params(SurfaceVariant::Textured));
        self.vertex_color.write_frame(
            &self.queue,
            &locals,
            &self.surface_params(SurfaceVariant::VertexColor),
        );
        self.unlit.write_frame(&self.queue, &locals);

        let model_instances: Vec<_> = packet
            .models
            .iter()
            .map(|entry| instance_buffer(&self.device, &entry.instances, "model-instances"))
            .collect();
        let sprite_instances: Vec<_> = packet
            .sprites
            .iter()
            .map(|entry| instance_buffer(&self.device, &entry.instances, "sprite-instances"))
            .collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("model-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color()),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for (entry, instances) in packet.models.iter().zip(&model_instances) {
                let Some(model) = self.models.get(&entry.model_id) else {
                    continue;
                };
                let count = entry.instances.len() as u32;
                match model.material {
                    Some(SurfaceVariant::Textured) => self.textured.draw(
                        &mut pass,
                        &model.mesh,
                        instances,
                        count,
                        model.texture_bind_group.as_ref(),
                    ),
                    Some(SurfaceVariant::VertexColor) => {
                        self.vertex_color
                            .draw(&mut pass, &model.mesh, instances, count, None)
                    }
                    None => self.unlit.draw(&mut pass, &model.mesh, instances, count),
                }
            }
        }

        if !packet.sprites.is_empty() {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sprite-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            for (entry, instances) in packet.sprites.iter().zip(&sprite_instances) {
                if let Some(atlas) = self.atlases.get(&entry.atlas_id) {
                    self.sprites.draw(
                        &mut pass,
                        &atlas.bind_group,
                        instances,
                        entry.instances.len() as u32,
                    );
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Copies the render target back to the CPU.
    pub fn read_pixels(&self) -> Result<RgbaImage> {
        let (width, height) = self.size();
        let unpadded = width * 4;
        let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| anyhow!("failed to wait for readback: {err}"))?;
        receiver
            .recv()
            .context("readback callback was dropped")?
            .context("failed to map readback buffer")?;

        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("readback size does not match the render target"))
    }
}

fn clear_color() -> wgpu::Color {
    let [r, g, b] = CLEAR_COLOR.map(f64::from);
    wgpu::Color { r, g, b, a: 1.0 }
}

/// Model matrix that places a unit mesh as a sphere of `radius` at `center`.
pub fn sphere_transform(center: Vec3, radius: f32) -> Mat4 {
    Mat4::from_translation(center) * Mat4::from_scale(Vec3::splat(radius))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::shade;
    use crate::mesh::uv_sphere;
    use crate::transform::Vertex;
    use glam::Vec4;

    fn headless(width: u32, height: u32) -> Option<Renderer> {
        match pollster::block_on(Renderer::new_headless(width, height)) {
            Ok(renderer) => Some(renderer),
            Err(err) => {
                eprintln!("skipping GPU test: {err:#}");
                None
            }
        }
    }

    /// Quad spanning the viewport at view depth -1, facing the camera.
    fn facing_quad(color: [f32; 4]) -> Mesh {
        let corners = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
        let vertices = corners
            .iter()
            .map(|[x, y]| Vertex {
                color,
                ..Vertex::new([*x, *y, -1.0], [0.0, 0.0, 1.0])
            })
            .collect();
        Mesh {
            vertices,
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    /// Keeps x and y and moves view depth -1 to clip depth 0.5.
    fn depth_shift() -> Mat4 {
        Mat4::from_translation(Vec3::new(0.0, 0.0, 1.5))
    }

    #[test]
    fn frame_packet_groups_instances_by_model() {
        let mut packet = FramePacket::new(Mat4::IDENTITY, Mat4::IDENTITY);
        packet.push_model(ModelId(0), Mat4::IDENTITY).unwrap();
        packet.push_model(ModelId(1), Mat4::IDENTITY).unwrap();
        packet.push_model(ModelId(0), Mat4::from_translation(Vec3::X)).unwrap();
        assert_eq!(packet.models.len(), 2);
        assert_eq!(packet.models[0].instances.len(), 2);
        assert!(packet.push_model(ModelId(0), Mat4::ZERO).is_err());

        let sprite = SpriteInstance {
            screen_pos: [0.0; 2],
            screen_size: [1.0; 2],
            atlas_pos: [0.0; 2],
            atlas_size: [1.0; 2],
        };
        packet.push_sprite(AtlasId(3), sprite);
        packet.push_sprite(AtlasId(3), sprite);
        assert_eq!(packet.sprites.len(), 1);
        assert_eq!(packet.sprites[0].instances.len(), 2);
    }

    #[test]
    fn clear_color_matches_preview_background() {
        let color = clear_color();
        assert_eq!(color.r, f64::from(CLEAR_COLOR[0]));
        assert_eq!(color.a, 1.0);
    }

    #[test]
    fn gpu_vertex_color_fragment_matches_cpu_shading() {
        let Some(mut renderer) = headless(1, 1) else {
            return;
        };
        let model = renderer
            .upload_model(&facing_quad([1.0; 4]), &ModelMaterial::VertexColor)
            .unwrap();
        let mut packet = FramePacket::new(Mat4::IDENTITY, depth_shift());
        packet.push_model(model, Mat4::IDENTITY).unwrap();
        renderer.draw_frame(&packet).unwrap();
        let pixel = renderer.read_pixels().unwrap().get_pixel(0, 0).0;

        let expected = shade(
            Mat4::IDENTITY,
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::Z,
            Vec3::ONE,
            &SurfaceVariant::VertexColor.default_params(),
        );
        for channel in 0..3 {
            let cpu = (expected[channel] * 255.0).round() as i32;
            assert!((i32::from(pixel[channel]) - cpu).abs() <= 1, "{pixel:?} vs {expected}");
        }
        assert_eq!(pixel[3], 255);
    }

    #[test]
    fn gpu_unlit_and_sprite_passes_compose() {
        let Some(mut renderer) = headless(4, 4) else {
            return;
        };
        let model = renderer
            .upload_model(&facing_quad([0.0, 1.0, 0.0, 1.0]), &ModelMaterial::Unlit)
            .unwrap();
        let atlas = Texture::from_rgba8(1, 1, vec![255, 0, 0, 255]).unwrap();
        let atlas = renderer.upload_atlas(&atlas, &Sampler::nearest());

        let mut packet = FramePacket::new(Mat4::IDENTITY, depth_shift());
        packet.push_model(model, Mat4::IDENTITY).unwrap();
        renderer.draw_frame(&packet).unwrap();
        assert_eq!(renderer.read_pixels().unwrap().get_pixel(1, 1).0, [0, 255, 0, 255]);

        packet.push_sprite(
            atlas,
            SpriteInstance {
                screen_pos: [-1.0, -1.0],
                screen_size: [1.0, 2.0],
                atlas_pos: [0.0, 0.0],
                atlas_size: [1.0, 1.0],
            },
        );
        renderer.draw_frame(&packet).unwrap();
        let image = renderer.read_pixels().unwrap();
        assert_eq!(image.get_pixel(0, 2).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(3, 2).0, [0, 255, 0, 255]);
    }

    #[test]
    fn gpu_textured_sphere_draws_over_background() {
        let Some(mut renderer) = headless(16, 16) else {
            return;
        };
        let texture = Texture::checkerboard(8, 2, [255, 255, 255, 255], [0, 0, 255, 255]).unwrap();
        let material = ModelMaterial::Textured {
            texture: Arc::new(texture),
            sampler: Sampler::default(),
        };
        let model = renderer.upload_model(&uv_sphere(24, 12), &material).unwrap();
        let camera = Camera {
            location: Vec3::new(-4.0, 0.0, 0.0),
            direction: Vec3::X,
            ..Camera::default()
        };
        let mut packet = FramePacket::from_camera(&camera, renderer.aspect_ratio());
        packet.push_model(model, sphere_transform(Vec3::ZERO, 1.0)).unwrap();
        renderer.draw_frame(&packet).unwrap();

        let image = renderer.read_pixels().unwrap();
        let background = clear_color();
        let corner = Vec4::from(image.get_pixel(0, 0).0.map(f32::from)) / 255.0;
        assert!((corner.x - background.r as f32).abs() < 0.01);
        assert_ne!(image.get_pixel(8, 8).0, image.get_pixel(0, 0).0);
    }

    #[test]
    fn unknown_model_is_rejected() {
        let Some(mut renderer) = headless(1, 1) else {
            return;
        };
        let mut packet = FramePacket::new(Mat4::IDENTITY, Mat4::IDENTITY);
        packet.push_model(ModelId(42), Mat4::IDENTITY).unwrap();
        let err = renderer.draw_frame(&packet).unwrap_err();
        assert!(err.to_string().contains("unknown model"));
        assert!(renderer.upload_model(&Mesh::default(), &ModelMaterial::Unlit).is_err());
    }
}
