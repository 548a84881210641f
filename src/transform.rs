use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Per-draw uniform block ("Locals"): view and projection matrices.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

impl FrameUniforms {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self {
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.projection)
    }
}

/// Mesh vertex as laid out in the vertex buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// RGBA color
    pub color: [f32; 4],
    pub texcoord: [f32; 2],
}

impl Vertex {
    pub fn new(position: [f32; 3], normal: [f32; 3]) -> Self {
        Vertex {
            position,
            normal,
            color: [0.4, 0.4, 0.4, 1.0],
            texcoord: [0.0, 0.0],
        }
    }
}

/// Per-instance transforms.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    /// Transforms positions from model space to world space
    pub model_matrix: [[f32; 4]; 4],

    /// Transforms normals from model space to view space
    pub normal_matrix: [[f32; 4]; 4],
}

impl InstanceData {
    /// Builds instance data with the normal matrix derived from `view * model`.
    ///
    /// Returns `None` if the model-view matrix cannot be inverted.
    pub fn new(model: Mat4, view: Mat4) -> Option<Self> {
        Some(Self {
            model_matrix: model.to_cols_array_2d(),
            normal_matrix: normal_matrix(view, model)?.to_cols_array_2d(),
        })
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model_matrix)
    }

    pub fn normal_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.normal_matrix)
    }
}

/// Inverse-transpose of the model-view matrix.
pub fn normal_matrix(view: Mat4, model: Mat4) -> Option<Mat4> {
    let model_view = view * model;
    if model_view.determinant().abs() <= f32::EPSILON {
        return None;
    }
    Some(model_view.inverse().transpose())
}

/// Interpolants produced for one vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexOutput {
    pub clip_position: Vec4,
    pub view_position: Vec3,
    pub view_normal: Vec3,
    pub color: Vec4,
    pub texcoord: Vec2,
}

/// Moves a vertex into view and clip space.
///
/// The instance's normal matrix is applied as given; hosts that scale
/// non-uniformly must supply a proper inverse-transpose.
pub fn transform_vertex(
    locals: &FrameUniforms,
    instance: &InstanceData,
    vertex: &Vertex,
) -> VertexOutput {
    let position = Vec3::from(vertex.position).extend(1.0);
    let view_position = locals.view() * instance.model_matrix() * position;
    let clip_position = locals.projection() * view_position;
    let view_normal = (instance.normal_matrix() * Vec3::from(vertex.normal).extend(0.0))
        .truncate()
        .normalize();

    VertexOutput {
        clip_position,
        view_position: view_position.truncate(),
        view_normal,
        color: Vec4::from(vertex.color),
        texcoord: Vec2::from(vertex.texcoord),
    }
}

/// Fragment stage of the unlit passthrough program.
pub fn passthrough_fragment(input: &VertexOutput) -> Vec4 {
    input.color
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_transforms_are_identity() {
        let locals = FrameUniforms::new(Mat4::IDENTITY, Mat4::IDENTITY);
        let instance = InstanceData::new(Mat4::IDENTITY, Mat4::IDENTITY).unwrap();
        let vertex = Vertex::new([1.0, 2.0, 3.0], [0.0, 0.0, 1.0]);
        let out = transform_vertex(&locals, &instance, &vertex);
        assert_eq!(out.clip_position, Vec4::new(1.0, 2.0, 3.0, 1.0));
        assert_eq!(out.view_position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(out.view_normal, Vec3::Z);
        assert_eq!(passthrough_fragment(&out), Vec4::new(0.4, 0.4, 0.4, 1.0));
    }

    #[test]
    fn view_and_projection_are_applied_in_order() {
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let projection = Mat4::from_scale(Vec3::new(2.0, 2.0, 1.0));
        let locals = FrameUniforms::new(view, projection);
        let instance = InstanceData::new(Mat4::from_translation(Vec3::X), view).unwrap();
        let vertex = Vertex::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        let out = transform_vertex(&locals, &instance, &vertex);
        assert_eq!(out.view_position, Vec3::new(1.0, 0.0, -5.0));
        assert_eq!(out.clip_position, Vec4::new(2.0, 0.0, -5.0, 1.0));
        assert!(out.view_normal.abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn normal_matrix_inverts_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let normal = normal_matrix(Mat4::IDENTITY, model).unwrap();
        let expected = Mat4::from_scale(Vec3::new(0.5, 1.0, 1.0));
        assert!(normal.abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn normal_is_renormalized() {
        let locals = FrameUniforms::new(Mat4::IDENTITY, Mat4::IDENTITY);
        let instance = InstanceData {
            model_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            normal_matrix: Mat4::from_scale(Vec3::splat(3.0)).to_cols_array_2d(),
        };
        let vertex = Vertex::new([0.0; 3], [1.0, 1.0, 0.0]);
        let out = transform_vertex(&locals, &instance, &vertex);
        assert!((out.view_normal.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn singular_model_view_has_no_normal_matrix() {
        assert!(normal_matrix(Mat4::IDENTITY, Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0))).is_none());
    }

    #[test]
    fn uniform_block_is_two_matrices() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 128);
        assert_eq!(std::mem::size_of::<Vertex>(), 48);
        assert_eq!(std::mem::size_of::<InstanceData>(), 128);
    }
}
