use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::info;

use lit_surface::render::sphere_transform;
use lit_surface::{render_sphere, AmbientTerm, FramePacket, Renderer, Scene, TextureCache};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let xml = fs::read_to_string(&options.path)
        .with_context(|| format!("failed to read scene {}", options.path.display()))?;
    let mut scene = Scene::from_xml(&xml).context("failed to parse scene XML")?;
    if let Some(width) = options.width {
        scene.preview.width = width;
    }
    if let Some(height) = options.height {
        scene.preview.height = height;
    }

    println!(
        "Loaded scene with {} surface(s) and {} probe(s)",
        scene.surfaces.len(),
        scene.probes.len()
    );
    for surface in &scene.surfaces {
        let params = scene.surface_params(surface);
        let ambient = match params.ambient {
            AmbientTerm::ScaledBase(weight) => format!("scaled {weight:.2}"),
            AmbientTerm::Flat(color) => {
                format!("flat ({:.2}, {:.2}, {:.2})", color.x, color.y, color.z)
            }
        };
        println!(
            " - {} ({}) power={:.2} shininess={:.1} ambient={ambient}",
            surface.name, surface.variant, params.light.power, params.light.shininess
        );
    }

    let base_dir = options
        .path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let cache = TextureCache::new();
    let mut shaders = Vec::with_capacity(scene.surfaces.len());
    for surface in &scene.surfaces {
        let shader = scene
            .instantiate(surface, &cache, &base_dir)
            .with_context(|| format!("failed to build surface {}", surface.name))?;
        shaders.push(shader);
    }
    info!("{} texture(s) loaded", cache.len());

    if !scene.probes.is_empty() {
        println!("Probe results:");
    }
    let view = scene.view();
    for probe in &scene.probes {
        let index = scene
            .surfaces
            .iter()
            .position(|surface| surface.name == probe.surface)
            .ok_or_else(|| anyhow!("probe references unknown surface {}", probe.surface))?;
        let color = shaders[index].shade(view, &probe.fragment(&scene.surfaces[index]))?;
        println!(
            " - {} @ ({:.2}, {:.2}, {:.2}) rgba=({:.4}, {:.4}, {:.4}, {:.4})",
            probe.surface,
            probe.position.x,
            probe.position.y,
            probe.position.z,
            color.x,
            color.y,
            color.z,
            color.w
        );
    }

    if options.summary_only {
        return Ok(());
    }

    let output = options.output.unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let camera = scene.preview_camera();
    let mut renderer = if options.gpu {
        Some(
            pollster::block_on(Renderer::new_headless(scene.preview.width, scene.preview.height))
                .context("failed to start GPU renderer")?,
        )
    } else {
        None
    };
    for (surface, shader) in scene.surfaces.iter().zip(&shaders) {
        let image = match renderer.as_mut() {
            Some(renderer) => {
                let mesh = scene.surface_mesh(surface, &base_dir)?;
                let material = scene.model_material(surface, &cache, &base_dir)?;
                let model = renderer.upload_model(&mesh, &material)?;
                renderer.set_surface_params(surface.variant, scene.surface_params(surface));
                let mut packet = FramePacket::from_camera(&camera, renderer.aspect_ratio());
                packet.push_model(
                    model,
                    sphere_transform(scene.preview.center, scene.preview.radius),
                )?;
                renderer.draw_frame(&packet)?;
                renderer.read_pixels()?
            }
            None => {
                let mut settings = scene.preview;
                settings.vertex_color = surface.color;
                render_sphere(&camera, shader.as_ref(), &settings)?
            }
        };
        let path = output.join(format!("{}.png", surface.name));
        image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote preview {} -> {}", surface.name, path.display());
    }

    Ok(())
}

struct CliOptions {
    path: PathBuf,
    output: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    summary_only: bool,
    gpu: bool,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(path) = args.next() else {
            return Err(anyhow!(
                "Usage: lit-surface <scene.xml> [--output <dir>] [--width N] [--height N] [--summary-only] [--gpu]"
            ));
        };
        let mut options = Self {
            path: PathBuf::from(path),
            output: None,
            width: None,
            height: None,
            summary_only: false,
            gpu: false,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--output" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--output expects a directory"))?;
                    options.output = Some(PathBuf::from(value));
                }
                "--width" => options.width = Some(parse_dimension(&arg, args.next())?),
                "--height" => options.height = Some(parse_dimension(&arg, args.next())?),
                "--summary-only" => options.summary_only = true,
                "--gpu" => options.gpu = true,
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --output, --width, --height, --summary-only or --gpu"
                    ));
                }
            }
        }
        Ok(options)
    }
}

fn parse_dimension(flag: &str, value: Option<String>) -> Result<u32> {
    let value = value.ok_or_else(|| anyhow!("{flag} expects a value"))?;
    match value.parse::<u32>() {
        Ok(0) | Err(_) => Err(anyhow!("{flag} expects a positive integer, got {value}")),
        Ok(size) => Ok(size),
    }
}
