use std::collections::HashMap;
use std::f32::consts::PI;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3, Vec4};

use crate::transform::Vertex;

/// Indexed triangle mesh in the vertex layout the lit pipelines consume.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read mesh {}", path.display()))?;
        load_obj_from_str(&contents).with_context(|| format!("failed to parse OBJ mesh {}", path.display()))
    }

    /// Replaces every vertex color.
    pub fn with_color(mut self, color: Vec4) -> Self {
        for vertex in &mut self.vertices {
            vertex.color = color.to_array();
        }
        self
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Unit sphere around the origin with texture coordinates that agree with
/// [`crate::preview::sphere_uv`].
///
/// Triangles wind counter-clockwise seen from outside.
pub fn uv_sphere(segments: u32, rings: u32) -> Mesh {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
    for ring in 0..=rings {
        let v = ring as f32 / rings as f32;
        let theta = v * PI;
        for segment in 0..=segments {
            let u = segment as f32 / segments as f32;
            let phi = u * 2.0 * PI - PI;
            let normal = Vec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
            let mut vertex = Vertex::new(normal.to_array(), normal.to_array());
            vertex.texcoord = [u, v];
            vertices.push(vertex);
        }
    }

    let stride = segments + 1;
    let mut indices = Vec::with_capacity((segments * rings * 6) as usize);
    for ring in 0..rings {
        for segment in 0..segments {
            let a = ring * stride + segment;
            let b = a + stride;
            indices.extend_from_slice(&[a, b, b + 1, a, b + 1, a + 1]);
        }
    }
    Mesh { vertices, indices }
}

/// Parses an OBJ file from memory.
///
/// Positions, normals and texture coordinates are read; polygons are fanned
/// into triangles. Missing normals are rebuilt from face orientation.
pub fn load_obj_from_str(data: &str) -> Result<Mesh> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut texcoords = Vec::new();
    let mut faces: Vec<[FaceIndex; 3]> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(
                parse_vec3(parts).with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts).with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "vt" => texcoords.push(
                parse_vec2(parts)
                    .with_context(|| format!("invalid texture coordinate on line {}", line_no + 1))?,
            ),
            "f" => {
                let polygon =
                    parse_face(parts).with_context(|| format!("invalid face on line {}", line_no + 1))?;
                for i in 1..polygon.len() - 1 {
                    faces.push([polygon[0], polygon[i], polygon[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }

    let sources = Sources {
        positions: &positions,
        normals: &normals,
        texcoords: &texcoords,
    };
    let (mut mesh, missing_normals) = build_mesh(&sources, &faces)?;
    if missing_normals {
        compute_normals(&mut mesh);
    }
    Ok(mesh)
}

fn next_component<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<f32> {
    Ok(parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?)
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let x = next_component(&mut parts)?;
    let y = next_component(&mut parts)?;
    let z = next_component(&mut parts)?;
    Ok(Vec3::new(x, y, z))
}

fn parse_vec2<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    let u = next_component(&mut parts)?;
    let v = next_component(&mut parts)?;
    Ok(Vec2::new(u, v))
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let vt = parse_optional_index(segments.next())?;
        let vn = parse_optional_index(segments.next())?;
        indices.push(FaceIndex { v, vt, vn });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

fn parse_optional_index(segment: Option<&str>) -> Result<i32> {
    match segment {
        None | Some("") => Ok(0),
        Some(value) => Ok(value.parse::<i32>()?),
    }
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vt: i32,
    vn: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    texcoord: Option<usize>,
    normal: Option<usize>,
}

struct Sources<'a> {
    positions: &'a [Vec3],
    normals: &'a [Vec3],
    texcoords: &'a [Vec2],
}

fn build_mesh(sources: &Sources<'_>, faces: &[[FaceIndex; 3]]) -> Result<(Mesh, bool)> {
    let mut lookup: HashMap<Key, u32> = HashMap::new();
    let mut mesh = Mesh::default();
    let mut missing_normals = false;

    for face in faces {
        for idx in face {
            let position = fix_index(idx.v, sources.positions.len())
                .ok_or_else(|| anyhow!("invalid vertex index {}", idx.v))?;
            let key = Key {
                position,
                texcoord: fix_index(idx.vt, sources.texcoords.len()),
                normal: fix_index(idx.vn, sources.normals.len()),
            };
            missing_normals |= key.normal.is_none();
            let next_index = mesh.vertices.len() as u32;
            let entry = *lookup.entry(key).or_insert_with(|| {
                let normal = key.normal.map(|i| sources.normals[i]).unwrap_or(Vec3::ZERO);
                let mut vertex = Vertex::new(sources.positions[position].to_array(), normal.to_array());
                if let Some(texcoord) = key.texcoord.map(|i| sources.texcoords[i]) {
                    // OBJ puts v = 0 at the bottom of the image.
                    vertex.texcoord = [texcoord.x, 1.0 - texcoord.y];
                }
                mesh.vertices.push(vertex);
                next_index
            });
            mesh.indices.push(entry);
        }
    }

    Ok((mesh, missing_normals))
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = index.unsigned_abs() as usize;
        (abs <= len).then_some(len - abs)
    } else {
        None
    }
}

fn compute_normals(mesh: &mut Mesh) {
    let mut accum = vec![Vec3::ZERO; mesh.vertices.len()];

    for triangle in mesh.indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
        let p0 = Vec3::from(mesh.vertices[i0].position);
        let p1 = Vec3::from(mesh.vertices[i1].position);
        let p2 = Vec3::from(mesh.vertices[i2].position);
        let normal = (p1 - p0).cross(p2 - p0);
        if normal.length_squared() > f32::EPSILON {
            let normal = normal.normalize();
            accum[i0] += normal;
            accum[i1] += normal;
            accum[i2] += normal;
        }
    }

    for (vertex, normal) in mesh.vertices.iter_mut().zip(accum) {
        if Vec3::from(vertex.normal) == Vec3::ZERO {
            vertex.normal = normal.normalize_or_zero().to_array();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::sphere_uv;

    #[test]
    fn parses_simple_triangle() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn computes_missing_normals() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = load_obj_from_str(obj).unwrap();
        for vertex in &mesh.vertices {
            assert!(Vec3::from(vertex.normal).abs_diff_eq(Vec3::Z, 1e-5));
        }
    }

    #[test]
    fn reads_texcoords_and_fans_quads() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
                   vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\nvn 0 0 1\n\
                   f 1/1/1 2/2/1 3/3/1 4/4/1\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.vertices[0].texcoord, [0.0, 1.0]);
        assert_eq!(mesh.vertices[2].texcoord, [1.0, 0.0]);
        assert_eq!(mesh.vertices[1].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn negative_indices_count_from_end() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.vertices[2].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 7\n";
        assert!(load_obj_from_str(obj).is_err());
        assert!(load_obj_from_str("# empty\n").is_err());
    }

    #[test]
    fn sphere_is_closed_and_outward_facing() {
        let mesh = uv_sphere(16, 8);
        assert_eq!(mesh.vertices.len(), 17 * 9);
        assert_eq!(mesh.triangle_count(), 16 * 8 * 2);
        for vertex in &mesh.vertices {
            let position = Vec3::from(vertex.position);
            assert!((position.length() - 1.0).abs() < 1e-5);
            assert_eq!(vertex.position, vertex.normal);
        }

        let tri = &mesh.indices[(4 * 16 + 3) * 6..(4 * 16 + 3) * 6 + 3];
        let [p0, p1, p2] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(mesh.vertices[i as usize].position));
        let face_normal = (p1 - p0).cross(p2 - p0);
        assert!(face_normal.dot(p0) > 0.0);
    }

    #[test]
    fn sphere_texcoords_match_preview_mapping() {
        let mesh = uv_sphere(8, 4);
        let vertex = mesh.vertices[2 * 9 + 3];
        let uv = sphere_uv(Vec3::from(vertex.position));
        assert!(uv.abs_diff_eq(Vec2::from(vertex.texcoord), 1e-5));
    }

    #[test]
    fn with_color_paints_every_vertex() {
        let mesh = uv_sphere(4, 2).with_color(Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert!(mesh.vertices.iter().all(|v| v.color == [1.0, 0.0, 0.0, 1.0]));
    }
}
