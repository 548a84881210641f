use std::f32::consts::FRAC_PI_2;

use glam::{Mat3, Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::transform::FrameUniforms;

/// World up axis.
pub const WORLD_UP: Vec3 = Vec3::Z;

/// Keeps vertical panning just short of the poles so `direction x up` stays
/// well defined.
const POLE_MARGIN: f32 = 0.01;

/// First-person perspective camera in a Z-up world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Position of this camera in world coordinates
    pub location: Vec3,

    /// A unit vector in the direction this camera is facing
    pub direction: Vec3,

    /// Near clipping plane for the perspective projection
    pub near_clip: f32,

    /// Far clipping plane for the perspective projection
    pub far_clip: f32,

    /// Vertical field of view in radians
    pub vertical_fov: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            location: Vec3::ZERO,
            direction: Vec3::X,
            near_clip: 0.1,
            far_clip: 1000.0,
            vertical_fov: 90f32.to_radians(),
        }
    }
}

impl Camera {
    /// Matrix that transforms world space into this camera's view space.
    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.location, self.direction, WORLD_UP)
    }

    pub fn projection(&self, aspect_ratio: f32) -> Mat4 {
        Mat4::perspective_rh_gl(
            self.vertical_fov,
            aspect_ratio.max(0.01),
            self.near_clip,
            self.far_clip,
        )
    }

    pub fn frame_uniforms(&self, aspect_ratio: f32) -> FrameUniforms {
        FrameUniforms::new(self.view(), self.projection(aspect_ratio))
    }

    /// Pan this camera left/right. A positive angle turns right.
    pub fn pan_horizontal(&mut self, angle: f32) {
        let rotation = Mat3::from_axis_angle(WORLD_UP, -angle);
        self.direction = rotation * self.direction;
    }

    /// Pan this camera up/down
    ///
    /// Clamps the vertical pan to straight up/straight down.
    /// A positive angle pans upwards.
    pub fn pan_vertical(&mut self, angle: f32) {
        // Vector pointing out the right hand side of the camera
        let axis = self.direction.cross(WORLD_UP).normalize();

        // pi/2 => straight up, 0 => horizontal, -pi/2 => straight down
        let current = FRAC_PI_2 - self.direction.dot(WORLD_UP).clamp(-1.0, 1.0).acos();
        let max_pan = FRAC_PI_2 - current - POLE_MARGIN;
        let min_pan = -FRAC_PI_2 - current + POLE_MARGIN;

        let rotation = Mat3::from_axis_angle(axis, angle.clamp(min_pan, max_pan));
        self.direction = rotation * self.direction;
    }
}
