use std::path::Path;

use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or loading a texture.
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("texture has zero area ({width}x{height})")]
    ZeroSize { width: u32, height: u32 },

    #[error("expected {expected} bytes of RGBA8 data, found {actual}")]
    DataLength { expected: usize, actual: usize },

    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
}

/// RGBA8 image stored sRGB-encoded, matching an `Rgba8UnormSrgb` GPU texture.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    width: u32,
    height: u32,
    texels: Vec<u8>,
}

impl Texture {
    pub fn from_rgba8(width: u32, height: u32, texels: Vec<u8>) -> Result<Self, TextureError> {
        if width == 0 || height == 0 {
            return Err(TextureError::ZeroSize { width, height });
        }
        let expected = width as usize * height as usize * 4;
        if texels.len() != expected {
            return Err(TextureError::DataLength {
                expected,
                actual: texels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            texels,
        })
    }

    pub fn from_image(image: image::RgbaImage) -> Result<Self, TextureError> {
        let (width, height) = image.dimensions();
        Self::from_rgba8(width, height, image.into_raw())
    }

    /// Decodes an image file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TextureError> {
        let image = image::open(path.as_ref())?.to_rgba8();
        Self::from_image(image)
    }

    /// Square checkerboard with `cells` squares per side.
    pub fn checkerboard(size: u32, cells: u32, a: [u8; 4], b: [u8; 4]) -> Result<Self, TextureError> {
        let cell = (size / cells.max(1)).max(1);
        let mut texels = Vec::with_capacity(size as usize * size as usize * 4);
        for y in 0..size {
            for x in 0..size {
                let texel = if ((x / cell) + (y / cell)) % 2 == 0 { a } else { b };
                texels.extend_from_slice(&texel);
            }
        }
        Self::from_rgba8(size, size, texels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw sRGB-encoded bytes, row-major, ready for upload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.texels
    }

    /// Fetches one texel and decodes it to linear RGBA.
    pub fn texel(&self, x: u32, y: u32) -> Vec4 {
        let x = x.min(self.width - 1) as usize;
        let y = y.min(self.height - 1) as usize;
        let offset = (y * self.width as usize + x) * 4;
        let raw = &self.texels[offset..offset + 4];
        Vec4::new(
            srgb_to_linear(raw[0]),
            srgb_to_linear(raw[1]),
            srgb_to_linear(raw[2]),
            raw[3] as f32 / 255.0,
        )
    }

    /// Samples the texture at a normalized coordinate.
    pub fn sample(&self, sampler: &Sampler, coord: Vec2) -> Vec4 {
        match sampler.mag_filter {
            FilterMode::Nearest => self.sample_nearest(sampler, coord),
            FilterMode::Linear => self.sample_linear(sampler, coord),
        }
    }

    fn sample_nearest(&self, sampler: &Sampler, coord: Vec2) -> Vec4 {
        let x = (coord.x * self.width as f32).floor() as i64;
        let y = (coord.y * self.height as f32).floor() as i64;
        let x = sampler.address_u.resolve(x, self.width);
        let y = sampler.address_v.resolve(y, self.height);
        self.texel(x, y)
    }

    fn sample_linear(&self, sampler: &Sampler, coord: Vec2) -> Vec4 {
        // Texel centers sit at half-integer coordinates.
        let fx = coord.x * self.width as f32 - 0.5;
        let fy = coord.y * self.height as f32 - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;

        let fetch = |dx: i64, dy: i64| {
            let x = sampler.address_u.resolve(x0 as i64 + dx, self.width);
            let y = sampler.address_v.resolve(y0 as i64 + dy, self.height);
            self.texel(x, y)
        };

        let top = fetch(0, 0).lerp(fetch(1, 0), tx);
        let bottom = fetch(0, 1).lerp(fetch(1, 1), tx);
        top.lerp(bottom, ty)
    }
}

/// Texel filter applied when sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

/// How coordinates outside `[0, 1]` are folded back onto the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

impl AddressMode {
    fn resolve(self, index: i64, size: u32) -> u32 {
        let size = size as i64;
        let resolved = match self {
            AddressMode::ClampToEdge => index.clamp(0, size - 1),
            AddressMode::Repeat => index.rem_euclid(size),
            AddressMode::MirrorRepeat => {
                let period = index.rem_euclid(size * 2);
                if period < size {
                    period
                } else {
                    size * 2 - 1 - period
                }
            }
        };
        resolved as u32
    }
}

/// Sampler state, mirroring the GPU sampler bound next to the texture.
///
/// The CPU path samples a single mip level, so only `mag_filter` selects the
/// filter; `min_filter` is carried through to the GPU sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sampler {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
}

impl Default for Sampler {
    fn default() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Nearest,
            address_u: AddressMode::ClampToEdge,
            address_v: AddressMode::ClampToEdge,
        }
    }
}

impl Sampler {
    pub fn nearest() -> Self {
        Self {
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            ..Self::default()
        }
    }

    pub fn with_address_mode(mut self, mode: AddressMode) -> Self {
        self.address_u = mode;
        self.address_v = mode;
        self
    }
}

/// sRGB electro-optical transfer function for one 8-bit channel.
pub fn srgb_to_linear(value: u8) -> f32 {
    let c = value as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: [u8; 4] = [0, 0, 0, 255];
    const WHITE: [u8; 4] = [255, 255, 255, 255];

    fn two_by_one() -> Texture {
        Texture::from_rgba8(2, 1, [BLACK, WHITE].concat()).unwrap()
    }

    #[test]
    fn rejects_bad_dimensions() {
        assert!(matches!(
            Texture::from_rgba8(0, 4, Vec::new()),
            Err(TextureError::ZeroSize { .. })
        ));
        assert!(matches!(
            Texture::from_rgba8(2, 2, vec![0; 15]),
            Err(TextureError::DataLength {
                expected: 16,
                actual: 15
            })
        ));
    }

    #[test]
    fn srgb_decode_endpoints() {
        assert_eq!(srgb_to_linear(0), 0.0);
        assert!((srgb_to_linear(255) - 1.0).abs() < 1e-6);
        assert!((srgb_to_linear(188) - 0.5029).abs() < 1e-3);
    }

    #[test]
    fn nearest_picks_containing_texel() {
        let texture = two_by_one();
        let sampler = Sampler::nearest();
        assert_eq!(texture.sample(&sampler, Vec2::new(0.2, 0.5)).x, 0.0);
        assert!((texture.sample(&sampler, Vec2::new(0.8, 0.5)).x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn linear_blends_between_texel_centers() {
        let texture = two_by_one();
        let mid = texture.sample(&Sampler::default(), Vec2::new(0.5, 0.5));
        assert!((mid.x - 0.5).abs() < 1e-6);
        let edge = texture.sample(&Sampler::default(), Vec2::new(0.0, 0.5));
        assert_eq!(edge.x, 0.0);
    }

    #[test]
    fn repeat_wraps_coordinates() {
        let texture = two_by_one();
        let sampler = Sampler::nearest().with_address_mode(AddressMode::Repeat);
        let wrapped = texture.sample(&sampler, Vec2::new(1.2, 0.5));
        assert_eq!(wrapped.x, 0.0);
        let clamped = texture.sample(&Sampler::nearest(), Vec2::new(1.2, 0.5));
        assert!((clamped.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mirror_repeat_reflects() {
        assert_eq!(AddressMode::MirrorRepeat.resolve(2, 2), 1);
        assert_eq!(AddressMode::MirrorRepeat.resolve(3, 2), 0);
        assert_eq!(AddressMode::MirrorRepeat.resolve(-1, 2), 0);
    }

    #[test]
    fn checkerboard_alternates() {
        let texture = Texture::checkerboard(4, 2, BLACK, WHITE).unwrap();
        assert_eq!(texture.texel(0, 0).x, 0.0);
        assert!((texture.texel(2, 0).x - 1.0).abs() < 1e-6);
        assert_eq!(texture.texel(2, 2).x, 0.0);
    }
}
