use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use renderer::{FileImageSource, HeadlessBackend, LoadStatus, Renderer};

use crate::cli::RunArgs;
use crate::paths::AppPaths;
use crate::run;

const TEXTURE_TIMEOUT: Duration = Duration::from_secs(10);
const FRAME_STEP: Duration = Duration::from_micros(16_667);

/// Compiles, links and renders `frames` frames on the headless backend.
///
/// Shader errors fail the command. Textures that cannot be decoded only
/// produce warnings since the placeholder keeps the frame drawable.
pub fn run_check(args: &RunArgs, frames: u32) -> Result<()> {
    let paths = AppPaths::discover()?;
    let settings = run::resolve(args, &paths)?;
    let config = settings.renderer;
    let (width, height) = config.surface_size;

    let images = Arc::new(FileImageSource::new(config.texture_root.clone()));
    let mut renderer = Renderer::initialize(
        HeadlessBackend::new(width, height),
        &config.shaders,
        images,
        &config.textures,
    )
    .context("shaders failed to build")?;
    let settled = renderer.wait_for_texture_loads(TEXTURE_TIMEOUT);

    let start = Instant::now();
    for frame in 0..frames {
        renderer
            .render_frame_at(start + FRAME_STEP * frame)
            .with_context(|| format!("frame {frame} failed"))?;
    }

    let draws: usize = renderer
        .backend()
        .frames()
        .map(|frame| frame.draws.len())
        .sum();
    println!("vertex shader:   {}", settings.vertex_origin);
    println!("fragment shader: {}", settings.fragment_origin);
    println!("frames rendered: {}", renderer.frames_rendered());
    println!("draw calls:      {draws}");
    println!("surface:         {width}x{height}");

    let mut failed = 0;
    for texture in renderer.textures().iter() {
        let status = match texture.status() {
            LoadStatus::Ready => "ready",
            LoadStatus::Failed => {
                failed += 1;
                "failed"
            }
            LoadStatus::Loading => "loading",
            LoadStatus::Placeholder => "placeholder",
        };
        println!("  {:<8} {:<12} {}", texture.body(), status, texture.source());
    }
    if !settled {
        tracing::warn!(
            pending = renderer.textures().pending(),
            "texture decodes still running after timeout"
        );
    }
    if failed > 0 {
        tracing::warn!(failed, "some textures fell back to the placeholder");
    }
    println!("check passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer::{CelestialBody, ShaderSources, TextureManifest};

    #[test]
    fn builtin_shaders_keep_every_body_texture_active() {
        let dir = tempfile::tempdir().unwrap();
        let shaders = ShaderSources::new(run::BUILTIN_VERTEX, run::BUILTIN_FRAGMENT);
        let renderer = Renderer::initialize(
            HeadlessBackend::new(64, 64),
            &shaders,
            Arc::new(FileImageSource::new(dir.path())),
            &TextureManifest::conventional(),
        )
        .expect("built-in shaders compile and link");

        let locations = renderer.program().locations();
        for body in CelestialBody::ALL {
            assert!(locations.sampler(body).is_some(), "{body} sampler unused");
        }
    }
}
