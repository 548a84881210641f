//! WGSL programs evaluated by the GPU pipelines.
//!
//! The lit programs mirror `crate::lighting` term for term so the CPU
//! reference can be used to check GPU output.

pub const LIT_SHADER: &str = r#"
struct Locals {
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
}

struct Light {
    position: vec4<f32>,
    color: vec4<f32>,
    ambient: vec4<f32>,
    // x = power, y = shininess, z = 1 when ambient scales the base color
    params: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> locals: Locals;

@group(0) @binding(1)
var<uniform> light: Light;

@group(1) @binding(0)
var base_color_texture: texture_2d<f32>;

@group(1) @binding(1)
var base_color_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) color: vec4<f32>,
    @location(3) texcoord: vec2<f32>,
}

struct InstanceInput {
    @location(4) model_0: vec4<f32>,
    @location(5) model_1: vec4<f32>,
    @location(6) model_2: vec4<f32>,
    @location(7) model_3: vec4<f32>,
    @location(8) normal_0: vec4<f32>,
    @location(9) normal_1: vec4<f32>,
    @location(10) normal_2: vec4<f32>,
    @location(11) normal_3: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) color: vec4<f32>,
    @location(3) texcoord: vec2<f32>,
}

@vertex
fn vs_main(vertex: VertexInput, instance: InstanceInput) -> VertexOutput {
    let model = mat4x4<f32>(instance.model_0, instance.model_1, instance.model_2, instance.model_3);
    let normal_matrix = mat4x4<f32>(
        instance.normal_0,
        instance.normal_1,
        instance.normal_2,
        instance.normal_3,
    );

    var out: VertexOutput;
    let view_position = locals.view * model * vec4<f32>(vertex.position, 1.0);
    out.clip_position = locals.projection * view_position;
    out.position = view_position.xyz;
    out.normal = normalize((normal_matrix * vec4<f32>(vertex.normal, 0.0)).xyz);
    out.color = vertex.color;
    out.texcoord = vertex.texcoord;
    return out;
}

fn blinn_phong(position: vec3<f32>, normal: vec3<f32>, base_color: vec3<f32>) -> vec4<f32> {
    let light_pos_view = (locals.view * vec4<f32>(light.position.xyz, 1.0)).xyz;
    let to_light = light_pos_view - position;
    let light_dir = normalize(to_light);
    let light_distance = length(to_light);
    let view_dir = normalize(-position);
    let half_dir = normalize(light_dir + view_dir);

    let n = normalize(normal);
    let lambertian = max(dot(light_dir, n), 0.0);
    let spec_angle = max(dot(half_dir, n), 0.0);
    let specular = pow(spec_angle, light.params.y);

    let power = light.params.x;
    let light_color = light.color.rgb;
    let ambient = select(light.ambient.rgb, base_color * light.ambient.rgb, light.params.z > 0.5);

    let linear_color = ambient
        + base_color * light_color * lambertian * power / light_distance
        + base_color * light_color * specular * power / light_distance;

    return vec4<f32>(pow(linear_color, vec3<f32>(1.0 / 2.2)), 1.0);
}

@fragment
fn fs_textured(input: VertexOutput) -> @location(0) vec4<f32> {
    let base_color = textureSample(base_color_texture, base_color_sampler, input.texcoord).rgb;
    return blinn_phong(input.position, input.normal, base_color);
}

@fragment
fn fs_vertex_color(input: VertexOutput) -> @location(0) vec4<f32> {
    return blinn_phong(input.position, input.normal, input.color.rgb);
}
"#;

pub const SPRITE_SHADER: &str = r#"
@group(0) @binding(0)
var atlas_texture: texture_2d<f32>;

@group(0) @binding(1)
var atlas_sampler: sampler;

struct SpriteInput {
    @location(0) screen_pos: vec2<f32>,
    @location(1) screen_size: vec2<f32>,
    @location(2) atlas_pos: vec2<f32>,
    @location(3) atlas_size: vec2<f32>,
}

struct SpriteOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) atlas_coord: vec2<f32>,
}

@vertex
fn vs_sprite(@builtin(vertex_index) index: u32, sprite: SpriteInput) -> SpriteOutput {
    var out: SpriteOutput;
    if index >= 4u {
        out.position = vec4<f32>(10.0, 10.0, 10.0, 1.0);
        out.atlas_coord = vec2<f32>(0.0, 0.0);
        return out;
    }

    var offsets = array<vec2<f32>, 4>(
        vec2<f32>(0.0, 0.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 1.0),
    );
    let offset = offsets[index];
    let screen = sprite.screen_pos + offset * sprite.screen_size;
    out.position = vec4<f32>(screen, 0.0, 1.0);
    out.atlas_coord = sprite.atlas_pos + offset * sprite.atlas_size;
    return out;
}

@fragment
fn fs_sprite(input: SpriteOutput) -> @location(0) vec4<f32> {
    return textureSample(atlas_texture, atlas_sampler, input.atlas_coord);
}
"#;

pub const PASSTHROUGH_SHADER: &str = r#"
struct Locals {
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
}

@group(0) @binding(0)
var<uniform> locals: Locals;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) color: vec4<f32>,
    @location(3) texcoord: vec2<f32>,
}

struct InstanceInput {
    @location(4) model_0: vec4<f32>,
    @location(5) model_1: vec4<f32>,
    @location(6) model_2: vec4<f32>,
    @location(7) model_3: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
}

@vertex
fn vs_main(vertex: VertexInput, instance: InstanceInput) -> VertexOutput {
    let model = mat4x4<f32>(instance.model_0, instance.model_1, instance.model_2, instance.model_3);
    var out: VertexOutput;
    out.clip_position = locals.projection * locals.view * model * vec4<f32>(vertex.position, 1.0);
    out.color = vertex.color;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return input.color;
}
"#;
