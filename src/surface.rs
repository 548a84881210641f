use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lighting::{self, AmbientTerm, LightDescriptor, SurfaceParams, AMBIENT_WEIGHT};
use crate::texture::{Sampler, Texture};

/// Light power of the textured pipeline.
pub const TEXTURED_LIGHT_POWER: f32 = 5.0;

/// Light power of the vertex-colored pipeline.
pub const VERTEX_COLOR_LIGHT_POWER: f32 = 3.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShadeError {
    #[error("{variant} surface expects a {expected} base color input")]
    MismatchedBaseColor {
        variant: SurfaceVariant,
        expected: &'static str,
    },
}

/// Where a fragment's base color comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaseColorSource {
    /// Interpolated per-vertex RGBA color.
    Color(Vec4),
    /// Interpolated texture coordinate into the bound texture.
    TexCoord(Vec2),
}

/// Interpolated attributes handed to the shading stage for one fragment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentInput {
    /// View-space position.
    pub position: Vec3,
    /// View-space normal, renormalized during shading.
    pub normal: Vec3,
    pub base: BaseColorSource,
}

/// The two lit pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceVariant {
    Textured,
    VertexColor,
}

impl SurfaceVariant {
    /// Lighting constants the variant uses unless overridden.
    pub fn default_params(self) -> SurfaceParams {
        match self {
            SurfaceVariant::Textured => SurfaceParams {
                light: LightDescriptor::new(TEXTURED_LIGHT_POWER),
                ambient: AmbientTerm::ScaledBase(AMBIENT_WEIGHT),
            },
            SurfaceVariant::VertexColor => SurfaceParams {
                light: LightDescriptor::new(VERTEX_COLOR_LIGHT_POWER),
                ambient: AmbientTerm::Flat(Vec3::splat(AMBIENT_WEIGHT)),
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SurfaceVariant::Textured => "textured",
            SurfaceVariant::VertexColor => "vertex_color",
        }
    }
}

impl fmt::Display for SurfaceVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SurfaceVariant {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "textured" => Ok(SurfaceVariant::Textured),
            "vertex_color" | "vertex-color" => Ok(SurfaceVariant::VertexColor),
            other => Err(anyhow::anyhow!(
                "unknown surface variant: {other}. Expected textured or vertex_color"
            )),
        }
    }
}

/// A lit surface: picks a base color for the fragment, then runs the shared
/// Blinn-Phong evaluation with its own parameters.
pub trait SurfaceShader: Send + Sync {
    fn variant(&self) -> SurfaceVariant;

    fn params(&self) -> &SurfaceParams;

    /// Linear RGB base color for the fragment.
    fn base_color(&self, input: &FragmentInput) -> Result<Vec3, ShadeError>;

    /// Final display-encoded color; alpha is always 1.
    fn shade(&self, view: Mat4, input: &FragmentInput) -> Result<Vec4, ShadeError> {
        let base_color = self.base_color(input)?;
        Ok(lighting::shade(
            view,
            input.position,
            input.normal,
            base_color,
            self.params(),
        ))
    }
}

/// Surface whose base color is sampled from a bound texture.
#[derive(Debug, Clone)]
pub struct TexturedSurface {
    texture: Arc<Texture>,
    sampler: Sampler,
    params: SurfaceParams,
}

impl TexturedSurface {
    pub fn new(texture: Arc<Texture>, sampler: Sampler) -> Self {
        Self {
            texture,
            sampler,
            params: SurfaceVariant::Textured.default_params(),
        }
    }

    pub fn with_params(mut self, params: SurfaceParams) -> Self {
        self.params = params;
        self
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }
}

impl SurfaceShader for TexturedSurface {
    fn variant(&self) -> SurfaceVariant {
        SurfaceVariant::Textured
    }

    fn params(&self) -> &SurfaceParams {
        &self.params
    }

    fn base_color(&self, input: &FragmentInput) -> Result<Vec3, ShadeError> {
        match input.base {
            BaseColorSource::TexCoord(coord) => {
                Ok(self.texture.sample(&self.sampler, coord).truncate())
            }
            BaseColorSource::Color(_) => Err(ShadeError::MismatchedBaseColor {
                variant: SurfaceVariant::Textured,
                expected: "texture coordinate",
            }),
        }
    }
}

/// Surface whose base color is the interpolated vertex color.
#[derive(Debug, Clone)]
pub struct VertexColorSurface {
    params: SurfaceParams,
}

impl Default for VertexColorSurface {
    fn default() -> Self {
        Self {
            params: SurfaceVariant::VertexColor.default_params(),
        }
    }
}

impl VertexColorSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(mut self, params: SurfaceParams) -> Self {
        self.params = params;
        self
    }
}

impl SurfaceShader for VertexColorSurface {
    fn variant(&self) -> SurfaceVariant {
        SurfaceVariant::VertexColor
    }

    fn params(&self) -> &SurfaceParams {
        &self.params
    }

    fn base_color(&self, input: &FragmentInput) -> Result<Vec3, ShadeError> {
        match input.base {
            BaseColorSource::Color(color) => Ok(color.truncate()),
            BaseColorSource::TexCoord(_) => Err(ShadeError::MismatchedBaseColor {
                variant: SurfaceVariant::VertexColor,
                expected: "vertex color",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facing_fragment(base: BaseColorSource) -> FragmentInput {
        FragmentInput {
            position: Vec3::new(0.0, 0.0, -1.0),
            normal: Vec3::new(0.0, 0.0, 2.0),
            base,
        }
    }

    fn white_texture() -> Arc<Texture> {
        Arc::new(Texture::from_rgba8(1, 1, vec![255, 255, 255, 255]).unwrap())
    }

    #[test]
    fn textured_surface_matches_reference() {
        let surface = TexturedSurface::new(white_texture(), Sampler::default());
        let color = surface
            .shade(
                Mat4::IDENTITY,
                &facing_fragment(BaseColorSource::TexCoord(Vec2::new(0.5, 0.5))),
            )
            .unwrap();
        assert!((color.x - 0.943_136_8).abs() < 1e-5, "{}", color.x);
        assert_eq!(color.w, 1.0);
    }

    #[test]
    fn vertex_color_alpha_is_ignored() {
        let surface = VertexColorSurface::new();
        let translucent = surface
            .shade(
                Mat4::IDENTITY,
                &facing_fragment(BaseColorSource::Color(Vec4::new(0.5, 0.5, 0.5, 0.1))),
            )
            .unwrap();
        let opaque = surface
            .shade(
                Mat4::IDENTITY,
                &facing_fragment(BaseColorSource::Color(Vec4::new(0.5, 0.5, 0.5, 1.0))),
            )
            .unwrap();
        assert_eq!(translucent, opaque);
        assert_eq!(translucent.w, 1.0);
        assert!((translucent.x - 0.558_614_9).abs() < 1e-5);
    }

    #[test]
    fn wrong_base_color_source_is_rejected() {
        let surface = VertexColorSurface::new();
        let err = surface
            .shade(
                Mat4::IDENTITY,
                &facing_fragment(BaseColorSource::TexCoord(Vec2::ZERO)),
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "vertex_color surface expects a vertex color base color input"
        );
    }

    #[test]
    fn variant_defaults_keep_ambient_asymmetry() {
        let textured = SurfaceVariant::Textured.default_params();
        let vertex = SurfaceVariant::VertexColor.default_params();
        assert_eq!(textured.light.power, 5.0);
        assert_eq!(vertex.light.power, 3.0);
        assert_eq!(textured.ambient, AmbientTerm::ScaledBase(0.02));
        assert_eq!(vertex.ambient, AmbientTerm::Flat(Vec3::splat(0.02)));
        assert_eq!(textured.light.position, Vec3::new(1.0, 4.0, 3.0));
        assert_eq!(textured.light.shininess, 15.0);
    }

    #[test]
    fn parses_variant_names() {
        assert_eq!(
            "vertex-color".parse::<SurfaceVariant>().unwrap(),
            SurfaceVariant::VertexColor
        );
        assert!("pbr".parse::<SurfaceVariant>().is_err());
    }
}
