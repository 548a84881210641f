use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Display gamma assumed by the final encode step.
pub const GAMMA: f32 = 2.2;

/// World-space anchor of the default point light.
pub const DEFAULT_LIGHT_POSITION: Vec3 = Vec3::new(1.0, 4.0, 3.0);

/// Shininess exponent of the default Blinn-Phong highlight.
pub const DEFAULT_SHININESS: f32 = 15.0;

/// Ambient weight shared by both lit surface variants.
pub const AMBIENT_WEIGHT: f32 = 0.02;

/// Single point light fixed in world space.
///
/// The position is moved into view space with the current view matrix on
/// every evaluation, so the light stays put while the camera moves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightDescriptor {
    pub position: Vec3,
    pub power: f32,
    #[serde(default = "default_shininess")]
    pub shininess: f32,
    #[serde(default = "default_light_color")]
    pub color: Vec3,
}

impl LightDescriptor {
    pub const fn new(power: f32) -> Self {
        Self {
            position: DEFAULT_LIGHT_POSITION,
            power,
            shininess: DEFAULT_SHININESS,
            color: Vec3::ONE,
        }
    }
}

impl Default for LightDescriptor {
    fn default() -> Self {
        Self::new(1.0)
    }
}

fn default_shininess() -> f32 {
    DEFAULT_SHININESS
}

fn default_light_color() -> Vec3 {
    Vec3::ONE
}

/// How the ambient contribution is derived from the base color.
///
/// The textured and vertex-colored pipelines disagree here: one scales the
/// base color, the other adds a constant. Both behaviours are kept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbientTerm {
    /// `base_color * weight`
    ScaledBase(f32),
    /// Constant color added regardless of the base color.
    Flat(Vec3),
}

impl AmbientTerm {
    pub fn evaluate(&self, base_color: Vec3) -> Vec3 {
        match *self {
            AmbientTerm::ScaledBase(weight) => base_color * weight,
            AmbientTerm::Flat(color) => color,
        }
    }
}

/// Everything the shared lighting function needs besides per-fragment data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceParams {
    pub light: LightDescriptor,
    pub ambient: AmbientTerm,
}

/// Intermediate values of one lighting evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightTerms {
    pub light_pos_view: Vec3,
    pub light_dir: Vec3,
    pub light_distance: f32,
    pub view_dir: Vec3,
    pub half_dir: Vec3,
    pub lambertian: f32,
    pub specular: f32,
}

/// Computes the Blinn-Phong terms for a view-space fragment.
///
/// `normal` does not need to be unit length. A zero normal, or a fragment
/// sitting exactly on the light, yields NaN/inf terms.
pub fn light_terms(view: Mat4, position: Vec3, normal: Vec3, light: &LightDescriptor) -> LightTerms {
    let light_pos_view = (view * light.position.extend(1.0)).truncate();
    let to_light = light_pos_view - position;
    let light_dir = to_light.normalize();
    let light_distance = to_light.length();
    let view_dir = (-position).normalize();
    let half_dir = (light_dir + view_dir).normalize();

    let normal = normal.normalize();
    let lambertian = light_dir.dot(normal).max(0.0);
    let spec_angle = half_dir.dot(normal).max(0.0);
    let specular = spec_angle.powf(light.shininess);

    LightTerms {
        light_pos_view,
        light_dir,
        light_distance,
        view_dir,
        half_dir,
        lambertian,
        specular,
    }
}

/// Linear-space color before gamma encoding.
pub fn shade_linear(
    view: Mat4,
    position: Vec3,
    normal: Vec3,
    base_color: Vec3,
    params: &SurfaceParams,
) -> Vec3 {
    let terms = light_terms(view, position, normal, &params.light);
    let light = &params.light;
    let falloff = light.power / terms.light_distance;

    params.ambient.evaluate(base_color)
        + base_color * light.color * terms.lambertian * falloff
        + base_color * light.color * terms.specular * falloff
}

/// Shades a fragment and returns the display-encoded, fully opaque color.
pub fn shade(
    view: Mat4,
    position: Vec3,
    normal: Vec3,
    base_color: Vec3,
    params: &SurfaceParams,
) -> Vec4 {
    encode_gamma(shade_linear(view, position, normal, base_color, params)).extend(1.0)
}

pub fn encode_gamma(linear: Vec3) -> Vec3 {
    linear.powf(1.0 / GAMMA)
}

pub fn decode_gamma(encoded: Vec3) -> Vec3 {
    encoded.powf(GAMMA)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textured_params() -> SurfaceParams {
        SurfaceParams {
            light: LightDescriptor::new(5.0),
            ambient: AmbientTerm::ScaledBase(AMBIENT_WEIGHT),
        }
    }

    fn vertex_color_params() -> SurfaceParams {
        SurfaceParams {
            light: LightDescriptor::new(3.0),
            ambient: AmbientTerm::Flat(Vec3::splat(AMBIENT_WEIGHT)),
        }
    }

    #[test]
    fn lambertian_is_one_when_facing_light() {
        let position = Vec3::new(0.0, 0.0, -1.0);
        let normal = DEFAULT_LIGHT_POSITION - position;
        let terms = light_terms(Mat4::IDENTITY, position, normal, &LightDescriptor::new(5.0));
        assert!((terms.lambertian - 1.0).abs() < 1e-6);
    }

    #[test]
    fn back_facing_normal_gets_no_diffuse() {
        let position = Vec3::new(0.0, 0.0, -1.0);
        let normal = position - DEFAULT_LIGHT_POSITION;
        let terms = light_terms(Mat4::IDENTITY, position, normal, &LightDescriptor::new(5.0));
        assert_eq!(terms.lambertian, 0.0);
    }

    #[test]
    fn gamma_round_trips() {
        for step in 0..=20 {
            let c = step as f32 / 20.0;
            let back = decode_gamma(encode_gamma(Vec3::splat(c)));
            assert!((back.x - c).abs() < 1e-5, "{c} -> {}", back.x);
        }
    }

    #[test]
    fn textured_reference_fragment() {
        let position = Vec3::new(0.0, 0.0, -1.0);
        let normal = Vec3::new(0.0, 0.0, 1.0);
        let params = textured_params();
        let terms = light_terms(Mat4::IDENTITY, position, normal, &params.light);

        assert_eq!(terms.light_pos_view, Vec3::new(1.0, 4.0, 3.0));
        let expected_dir = Vec3::new(1.0, 4.0, 4.0).normalize();
        assert!(terms.light_dir.abs_diff_eq(expected_dir, 1e-6));
        assert!((terms.light_distance - 33.0f32.sqrt()).abs() < 1e-5);
        assert!((terms.lambertian - 0.696_310_6).abs() < 1e-5);
        assert!((terms.specular - 0.290_780_6).abs() < 1e-5);

        let color = shade(Mat4::IDENTITY, position, normal, Vec3::ONE, &params);
        for channel in [color.x, color.y, color.z] {
            assert!((channel - 0.943_136_8).abs() < 1e-5, "channel {channel}");
        }
        assert_eq!(color.w, 1.0);
    }

    #[test]
    fn vertex_color_reference_fragment() {
        let position = Vec3::new(0.0, 0.0, -1.0);
        let normal = Vec3::new(0.0, 0.0, 1.0);
        let color = shade(
            Mat4::IDENTITY,
            position,
            normal,
            Vec3::splat(0.5),
            &vertex_color_params(),
        );
        assert!((color.x - 0.558_614_9).abs() < 1e-5, "{}", color.x);
    }

    #[test]
    fn ambient_variants_differ_on_dark_base() {
        // Fragment faces away from the light, only ambient remains.
        let position = Vec3::new(0.0, 0.0, -1.0);
        let normal = Vec3::new(-1.0, -4.0, -4.0);
        let base = Vec3::new(0.5, 0.25, 0.0);

        let textured = shade_linear(Mat4::IDENTITY, position, normal, base, &textured_params());
        let flat = shade_linear(Mat4::IDENTITY, position, normal, base, &vertex_color_params());

        assert!(textured.abs_diff_eq(base * AMBIENT_WEIGHT, 1e-6));
        assert!(flat.abs_diff_eq(Vec3::splat(AMBIENT_WEIGHT), 1e-6));
    }

    #[test]
    fn light_follows_view_matrix() {
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let terms = light_terms(
            view,
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::Z,
            &LightDescriptor::new(5.0),
        );
        assert_eq!(terms.light_pos_view, Vec3::new(1.0, 4.0, -2.0));
    }

    #[test]
    fn alpha_is_always_opaque() {
        let color = shade(
            Mat4::IDENTITY,
            Vec3::new(0.3, -0.2, -2.0),
            Vec3::new(0.0, 1.0, 1.0),
            Vec3::new(0.1, 0.9, 0.4),
            &vertex_color_params(),
        );
        assert_eq!(color.w, 1.0);
    }

    #[test]
    fn fragment_on_light_is_unguarded() {
        let params = textured_params();
        let color = shade(
            Mat4::IDENTITY,
            DEFAULT_LIGHT_POSITION,
            Vec3::Z,
            Vec3::ONE,
            &params,
        );
        assert!(!color.x.is_finite());
    }
}
