use std::f32::consts::{FRAC_1_PI, PI};
use std::num::NonZeroUsize;
use std::thread;

use glam::{Mat4, Vec2, Vec3, Vec4};
use image::RgbaImage;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::surface::{BaseColorSource, FragmentInput, ShadeError, SurfaceShader, SurfaceVariant};

/// Background written where the sphere is not hit.
pub const CLEAR_COLOR: [f32; 3] = [0.03, 0.03, 0.05];

/// Parameters of the preview image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreviewSettings {
    pub width: u32,
    pub height: u32,
    /// Sphere center in world space.
    pub center: Vec3,
    pub radius: f32,
    /// Color fed to vertex-colored surfaces.
    pub vertex_color: Vec4,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            center: Vec3::ZERO,
            radius: 1.0,
            vertex_color: Vec4::new(0.5, 0.5, 0.5, 1.0),
        }
    }
}

/// Renders a lit sphere through the CPU shading stage.
///
/// Each pixel casts a view-space ray; rows are split across worker threads.
pub fn render_sphere(
    camera: &Camera,
    surface: &dyn SurfaceShader,
    settings: &PreviewSettings,
) -> Result<RgbaImage, ShadeError> {
    let width = settings.width.max(1);
    let height = settings.height.max(1);
    let view = camera.view();
    let scene = SphereView {
        view,
        inverse_view: view.inverse(),
        center: view.transform_point3(settings.center),
        radius: settings.radius,
        near: camera.near_clip,
        tan_half_fov: (camera.vertical_fov * 0.5).tan(),
        aspect: width as f32 / height as f32,
        width,
        height,
        variant: surface.variant(),
        vertex_color: settings.vertex_color,
    };

    let row_bytes = width as usize * 4;
    let mut image = RgbaImage::new(width, height);
    let workers = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    let rows_per_worker = (height as usize).div_ceil(workers).max(1);
    debug!("rendering {width}x{height} preview on {workers} worker(s)");

    thread::scope(|scope| {
        let handles: Vec<_> = image
            .chunks_mut(rows_per_worker * row_bytes)
            .enumerate()
            .map(|(chunk, band)| {
                let scene = &scene;
                scope.spawn(move || {
                    let first_row = chunk * rows_per_worker;
                    for (offset, row) in band.chunks_mut(row_bytes).enumerate() {
                        let y = (first_row + offset) as u32;
                        for x in 0..width {
                            let color = scene.shade_pixel(surface, x, y)?;
                            let start = x as usize * 4;
                            row[start..start + 4].copy_from_slice(&to_rgba8(color));
                        }
                    }
                    Ok::<(), ShadeError>(())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect::<Result<(), ShadeError>>()
    })?;

    Ok(image)
}

struct SphereView {
    view: Mat4,
    inverse_view: Mat4,
    /// Sphere center in view space.
    center: Vec3,
    radius: f32,
    near: f32,
    tan_half_fov: f32,
    aspect: f32,
    width: u32,
    height: u32,
    variant: SurfaceVariant,
    vertex_color: Vec4,
}

impl SphereView {
    fn shade_pixel(&self, surface: &dyn SurfaceShader, x: u32, y: u32) -> Result<Vec4, ShadeError> {
        let ndc = Vec2::new(
            (x as f32 + 0.5) / self.width as f32 * 2.0 - 1.0,
            1.0 - (y as f32 + 0.5) / self.height as f32 * 2.0,
        );
        let ray = Vec3::new(
            ndc.x * self.tan_half_fov * self.aspect,
            ndc.y * self.tan_half_fov,
            -1.0,
        )
        .normalize();

        let Some(distance) = self.intersect(ray) else {
            return Ok(Vec3::from(CLEAR_COLOR).extend(1.0));
        };
        let position = ray * distance;
        let normal = position - self.center;

        let base = match self.variant {
            SurfaceVariant::Textured => {
                let world_normal = self.inverse_view.transform_vector3(normal).normalize();
                BaseColorSource::TexCoord(sphere_uv(world_normal))
            }
            SurfaceVariant::VertexColor => BaseColorSource::Color(self.vertex_color),
        };

        surface.shade(
            self.view,
            &FragmentInput {
                position,
                normal,
                base,
            },
        )
    }

    /// Distance along `ray` to the nearest hit beyond the near plane.
    fn intersect(&self, ray: Vec3) -> Option<f32> {
        let b = ray.dot(self.center);
        let c = self.center.length_squared() - self.radius * self.radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        [b - root, b + root]
            .into_iter()
            .find(|t| *t * -ray.z >= self.near)
    }
}

/// Equirectangular mapping of a unit direction in the Z-up world.
///
/// Both poles map to the middle of their texture row.
pub fn sphere_uv(direction: Vec3) -> Vec2 {
    let u = if direction.x.abs() <= f32::EPSILON && direction.y.abs() <= f32::EPSILON {
        0.5
    } else {
        0.5 + direction.y.atan2(direction.x) / (2.0 * PI)
    };
    Vec2::new(u, 0.5 - direction.z.clamp(-1.0, 1.0).asin() * FRAC_1_PI)
}

fn to_rgba8(color: Vec4) -> [u8; 4] {
    let quantize = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    [
        quantize(color.x),
        quantize(color.y),
        quantize(color.z),
        quantize(color.w),
    ]
}
