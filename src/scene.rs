use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Vec2, Vec3, Vec4};
use log::warn;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::camera::{Camera, WORLD_UP};
use crate::lighting::SurfaceParams;
use crate::mesh::{uv_sphere, Mesh};
use crate::preview::PreviewSettings;
use crate::render::ModelMaterial;
use crate::surface::{
    BaseColorSource, FragmentInput, SurfaceShader, SurfaceVariant, TexturedSurface,
    VertexColorSurface,
};
use crate::texture::{AddressMode, FilterMode, Sampler, Texture};
use crate::texture_cache::TextureCache;

/// Cache key of the checkerboard used by textured surfaces without a texture.
pub const BUILTIN_CHECKER: &str = "builtin:checker";

/// Shading run described by a scene file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Scene {
    /// Camera providing the view matrix; probes use the identity view when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<Camera>,
    #[serde(default)]
    pub light: LightOverrides,
    pub surfaces: Vec<SurfaceConfig>,
    #[serde(default)]
    pub probes: Vec<Probe>,
    #[serde(default)]
    pub preview: PreviewSettings,
}

impl Scene {
    /// Parses a scene description.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();

        let camera = child(&root, "camera")
            .map(|node| parse_camera(&node))
            .transpose()
            .context("invalid <camera>")?;
        let light = child(&root, "light")
            .map(|node| parse_light(&node))
            .transpose()
            .context("invalid <light>")?
            .unwrap_or_default();

        let mut surfaces = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("surface")) {
            let surface = parse_surface(&node)?;
            if surfaces.iter().any(|s: &SurfaceConfig| s.name == surface.name) {
                return Err(anyhow!("duplicate surface name {}", surface.name));
            }
            surfaces.push(surface);
        }

        let mut probes = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("probe")) {
            let probe = parse_probe(&node)?;
            if !surfaces.iter().any(|s| s.name == probe.surface) {
                return Err(anyhow!("probe references unknown surface {}", probe.surface));
            }
            probes.push(probe);
        }

        let mut preview = PreviewSettings::default();
        if let Some(node) = child(&root, "preview") {
            preview.width = parse_u32(optional_text(&node, "width"), preview.width)?;
            preview.height = parse_u32(optional_text(&node, "height"), preview.height)?;
            preview.center = parse_vec3(optional_text(&node, "center"), preview.center)?;
            preview.radius = parse_f32(optional_text(&node, "radius"), preview.radius)?;
        }

        Ok(Self {
            camera,
            light,
            surfaces,
            probes,
            preview,
        })
    }

    /// View matrix shared by every probe.
    pub fn view(&self) -> Mat4 {
        self.camera.map(|camera| camera.view()).unwrap_or(Mat4::IDENTITY)
    }

    /// Camera used for previews; falls back to one looking at the lit side
    /// of the preview sphere.
    pub fn preview_camera(&self) -> Camera {
        self.camera.unwrap_or_else(|| {
            let location = self.preview.center + Vec3::new(2.0, 4.0, 2.0);
            Camera {
                location,
                direction: (self.preview.center - location).normalize(),
                ..Camera::default()
            }
        })
    }

    pub fn surface(&self, name: &str) -> Option<&SurfaceConfig> {
        self.surfaces.iter().find(|surface| surface.name == name)
    }

    /// Lighting parameters of `surface`: variant defaults with the scene's
    /// light overrides applied.
    pub fn surface_params(&self, surface: &SurfaceConfig) -> SurfaceParams {
        self.light.apply(surface.variant.default_params())
    }

    /// Builds the shader for `surface`, resolving texture paths against
    /// `base_dir`.
    pub fn instantiate(
        &self,
        surface: &SurfaceConfig,
        cache: &TextureCache,
        base_dir: &Path,
    ) -> Result<Box<dyn SurfaceShader>> {
        let params = self.surface_params(surface);
        match surface.variant {
            SurfaceVariant::VertexColor => {
                if surface.texture.is_some() {
                    warn!("surface {} is vertex colored; ignoring its texture", surface.name);
                }
                Ok(Box::new(VertexColorSurface::new().with_params(params)))
            }
            SurfaceVariant::Textured => {
                let texture = self.resolve_texture(surface, cache, base_dir)?;
                Ok(Box::new(
                    TexturedSurface::new(texture, surface.sampler).with_params(params),
                ))
            }
        }
    }

    /// Base-color texture of a textured surface; the built-in checkerboard
    /// when it names none.
    pub fn resolve_texture(
        &self,
        surface: &SurfaceConfig,
        cache: &TextureCache,
        base_dir: &Path,
    ) -> Result<Arc<Texture>> {
        match surface.texture.as_deref() {
            Some(path) => {
                let path = base_dir.join(path);
                cache
                    .get_or_load(&path)
                    .with_context(|| format!("failed to load texture {}", path.display()))
            }
            None => builtin_checker(cache),
        }
    }

    /// GPU material for `surface`.
    pub fn model_material(
        &self,
        surface: &SurfaceConfig,
        cache: &TextureCache,
        base_dir: &Path,
    ) -> Result<ModelMaterial> {
        Ok(match surface.variant {
            SurfaceVariant::Textured => ModelMaterial::Textured {
                texture: self.resolve_texture(surface, cache, base_dir)?,
                sampler: surface.sampler,
            },
            SurfaceVariant::VertexColor => ModelMaterial::VertexColor,
        })
    }

    /// Geometry drawn for `surface` on the GPU: its OBJ mesh, or a unit
    /// sphere, painted with the surface color.
    pub fn surface_mesh(&self, surface: &SurfaceConfig, base_dir: &Path) -> Result<Mesh> {
        let mesh = match surface.mesh.as_deref() {
            Some(path) => Mesh::load_obj(base_dir.join(path))?,
            None => uv_sphere(SPHERE_SEGMENTS, SPHERE_RINGS),
        };
        Ok(mesh.with_color(surface.color))
    }
}

const SPHERE_SEGMENTS: u32 = 48;
const SPHERE_RINGS: u32 = 24;

fn builtin_checker(cache: &TextureCache) -> Result<Arc<Texture>> {
    if let Some(texture) = cache.get(Path::new(BUILTIN_CHECKER)) {
        return Ok(texture);
    }
    let texture = Texture::checkerboard(64, 8, [230, 230, 230, 255], [40, 40, 40, 255])?;
    Ok(cache.insert(BUILTIN_CHECKER, texture))
}

/// Scene-wide light fields that replace the variant defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct LightOverrides {
    pub position: Option<Vec3>,
    pub power: Option<f32>,
    pub shininess: Option<f32>,
    pub color: Option<Vec3>,
}

impl LightOverrides {
    pub fn apply(&self, mut params: SurfaceParams) -> SurfaceParams {
        let light = &mut params.light;
        if let Some(position) = self.position {
            light.position = position;
        }
        if let Some(power) = self.power {
            light.power = power;
        }
        if let Some(shininess) = self.shininess {
            light.shininess = shininess;
        }
        if let Some(color) = self.color {
            light.color = color;
        }
        params
    }
}

/// One named surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    pub name: String,
    pub variant: SurfaceVariant,
    /// Texture path relative to the scene file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
    /// OBJ mesh path relative to the scene file, drawn by the GPU renderer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<String>,
    #[serde(default)]
    pub sampler: Sampler,
    /// Vertex color used for probes and previews of vertex-colored surfaces.
    pub color: Vec4,
}

/// A single fragment to evaluate and report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    pub surface: String,
    /// View-space position.
    pub position: Vec3,
    /// View-space normal.
    pub normal: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texcoord: Option<Vec2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Vec4>,
}

impl Probe {
    /// Fragment input matching what `surface`'s variant expects.
    pub fn fragment(&self, surface: &SurfaceConfig) -> FragmentInput {
        let base = match surface.variant {
            SurfaceVariant::Textured => {
                if self.color.is_some() {
                    warn!("probe on textured surface {} ignores its color", surface.name);
                }
                BaseColorSource::TexCoord(self.texcoord.unwrap_or(Vec2::splat(0.5)))
            }
            SurfaceVariant::VertexColor => {
                if self.texcoord.is_some() {
                    warn!(
                        "probe on vertex colored surface {} ignores its texcoord",
                        surface.name
                    );
                }
                BaseColorSource::Color(self.color.unwrap_or(surface.color))
            }
        };
        FragmentInput {
            position: self.position,
            normal: self.normal,
            base,
        }
    }
}

fn parse_camera(node: &Node<'_, '_>) -> Result<Camera> {
    let mut camera = Camera::default();
    camera.location = parse_vec3(optional_text(node, "position"), camera.location)?;
    let direction = parse_vec3(optional_text(node, "direction"), camera.direction)?;
    if direction.length_squared() <= f32::EPSILON {
        return Err(anyhow!("camera direction must be non-zero"));
    }
    let direction = direction.normalize();
    if direction.cross(WORLD_UP).length_squared() <= f32::EPSILON {
        return Err(anyhow!("camera direction must not be parallel to the up axis"));
    }
    camera.direction = direction;
    camera.vertical_fov = parse_f32(optional_text(node, "fov"), camera.vertical_fov.to_degrees())?
        .to_radians();
    camera.near_clip = parse_f32(optional_text(node, "near"), camera.near_clip)?;
    camera.far_clip = parse_f32(optional_text(node, "far"), camera.far_clip)?;
    Ok(camera)
}

fn parse_light(node: &Node<'_, '_>) -> Result<LightOverrides> {
    Ok(LightOverrides {
        position: optional_text(node, "position")
            .map(|value| parse_vec3(Some(value), Vec3::ZERO))
            .transpose()?,
        power: optional_text(node, "power")
            .map(|value| parse_f32(Some(value), 0.0))
            .transpose()?,
        shininess: optional_text(node, "shininess")
            .map(|value| parse_f32(Some(value), 0.0))
            .transpose()?,
        color: optional_text(node, "color")
            .map(|value| parse_color(Some(value), Vec4::ONE).map(|c| c.truncate()))
            .transpose()?,
    })
}

fn parse_surface(node: &Node<'_, '_>) -> Result<SurfaceConfig> {
    let name = required_text(node, "name")?;
    let variant = optional_text(node, "variant")
        .as_deref()
        .unwrap_or("vertex_color")
        .parse::<SurfaceVariant>()
        .with_context(|| format!("surface {name}"))?;

    let mut sampler = Sampler::default();
    if let Some(filter) = optional_text(node, "filter") {
        let filter = parse_filter(&filter)?;
        sampler.mag_filter = filter;
        sampler.min_filter = filter;
    }
    if let Some(address) = optional_text(node, "address") {
        sampler = sampler.with_address_mode(parse_address(&address)?);
    }

    Ok(SurfaceConfig {
        texture: optional_text(node, "texture"),
        mesh: optional_text(node, "mesh"),
        color: parse_color(optional_text(node, "color"), Vec4::new(0.5, 0.5, 0.5, 1.0))
            .with_context(|| format!("surface {name}"))?,
        name,
        variant,
        sampler,
    })
}

fn parse_probe(node: &Node<'_, '_>) -> Result<Probe> {
    let surface = required_text(node, "surface")?;
    Ok(Probe {
        position: parse_vec3(optional_text(node, "position"), Vec3::new(0.0, 0.0, -1.0))?,
        normal: parse_vec3(optional_text(node, "normal"), Vec3::Z)?,
        texcoord: optional_text(node, "texcoord")
            .map(|value| parse_vec2(&value))
            .transpose()?,
        color: optional_text(node, "color")
            .map(|value| parse_color(Some(value), Vec4::ONE))
            .transpose()?,
        surface,
    })
}

fn parse_filter(value: &str) -> Result<FilterMode> {
    match value {
        "nearest" => Ok(FilterMode::Nearest),
        "linear" => Ok(FilterMode::Linear),
        other => Err(anyhow!("unknown filter mode: {other}")),
    }
}

fn parse_address(value: &str) -> Result<AddressMode> {
    match value {
        "clamp" | "clamp_to_edge" => Ok(AddressMode::ClampToEdge),
        "repeat" => Ok(AddressMode::Repeat),
        "mirror" | "mirror_repeat" => Ok(AddressMode::MirrorRepeat),
        other => Err(anyhow!("unknown address mode: {other}")),
    }
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.has_tag_name(tag))
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_numbers(value: &str) -> Result<Vec<f32>> {
    value
        .split_whitespace()
        .map(|component| {
            component
                .parse::<f32>()
                .map_err(|err| anyhow!("invalid number {component:?}: {err}"))
        })
        .collect()
}

fn parse_vec2(value: &str) -> Result<Vec2> {
    match parse_numbers(value)?[..] {
        [x, y] => Ok(Vec2::new(x, y)),
        _ => Err(anyhow!("expected 2 components, found {value:?}")),
    }
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    match parse_numbers(&value)?[..] {
        [x, y, z] => Ok(Vec3::new(x, y, z)),
        _ => Err(anyhow!("expected 3 components, found {value:?}")),
    }
}

/// Colors are written as 0-255 components; alpha is optional.
fn parse_color(value: Option<String>, default: Vec4) -> Result<Vec4> {
    let Some(value) = value else {
        return Ok(default);
    };
    let color = match parse_numbers(&value)?[..] {
        [r, g, b] => Vec4::new(r, g, b, 255.0),
        [r, g, b, a] => Vec4::new(r, g, b, a),
        _ => return Err(anyhow!("color is missing components")),
    };
    Ok(color / 255.0)
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

fn parse_u32(value: Option<String>, default: u32) -> Result<u32> {
    match value {
        Some(value) => value
            .parse::<u32>()
            .map_err(|err| anyhow!("failed to parse integer: {err}")),
        None => Ok(default),
    }
}
