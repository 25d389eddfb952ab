use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use orrery_config::OrreryConfig;
use renderer::{CelestialBody, RendererConfig, ShaderSources, TextureManifest};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::paths::AppPaths;

pub(crate) const BUILTIN_VERTEX: &str = include_str!("../shaders/quad.vert");
pub(crate) const BUILTIN_FRAGMENT: &str = include_str!("../shaders/solar.frag");

/// Everything a run needs after merging flags over the config file.
#[derive(Debug)]
pub struct Settings {
    pub config_file: PathBuf,
    pub config_found: bool,
    pub renderer: RendererConfig,
    pub vertex_origin: String,
    pub fragment_origin: String,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let settings = resolve(args, &paths)?;
    tracing::info!(
        config = %settings.config_file.display(),
        vertex = %settings.vertex_origin,
        fragment = %settings.fragment_origin,
        "starting orrery"
    );
    renderer::run_window(settings.renderer)
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn resolve(args: &RunArgs, paths: &AppPaths) -> Result<Settings> {
    let (config_file, config_found, config) = load_config(args, paths)?;

    let vertex_path = args.vertex.clone().or(config.shaders.vertex.clone());
    let fragment_path = args.fragment.clone().or(config.shaders.fragment.clone());
    let (vertex, vertex_origin) = shader_text(vertex_path.as_deref(), BUILTIN_VERTEX)?;
    let (fragment, fragment_origin) = shader_text(fragment_path.as_deref(), BUILTIN_FRAGMENT)?;

    let mut textures = TextureManifest::conventional();
    for (name, source) in &config.textures.overrides {
        let Some(body) = CelestialBody::from_name(name) else {
            bail!("textures.overrides names unknown body '{name}'");
        };
        textures.set(body, source.as_str());
    }

    let mut renderer = RendererConfig::new(ShaderSources::new(vertex, fragment));
    renderer.surface_size = match args.size {
        Some(size) => (size.width, size.height),
        None => (config.window.width, config.window.height),
    };
    renderer.title = config.window.title.clone();
    renderer.texture_root = args
        .textures
        .clone()
        .or(config.textures.root.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    renderer.textures = textures;
    renderer.zoom_sensitivity = args
        .zoom_sensitivity
        .unwrap_or(config.input.zoom_sensitivity);
    if !renderer.zoom_sensitivity.is_finite() || renderer.zoom_sensitivity <= 0.0 {
        bail!("zoom sensitivity must be > 0");
    }
    renderer.fps_in_title = config.diagnostics.fps_in_title && !args.no_fps_title;

    tracing::debug!(
        config = %config_file.display(),
        found = config_found,
        textures = %renderer.texture_root.display(),
        "resolved orrery settings"
    );

    Ok(Settings {
        config_file,
        config_found,
        renderer,
        vertex_origin,
        fragment_origin,
    })
}

fn load_config(args: &RunArgs, paths: &AppPaths) -> Result<(PathBuf, bool, OrreryConfig)> {
    match &args.config {
        Some(path) => {
            if !path.is_file() {
                bail!("config file {} does not exist", path.display());
            }
            let config = OrreryConfig::load_or_default(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            Ok((path.clone(), true, config))
        }
        None => {
            let path = paths.config_file();
            let found = path.is_file();
            let config = OrreryConfig::load_or_default(&path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            Ok((path, found, config))
        }
    }
}

fn shader_text(path: Option<&Path>, builtin: &str) -> Result<(String, String)> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read shader {}", path.display()))?;
            Ok((text, path.display().to_string()))
        }
        None => Ok((builtin.to_string(), "built-in".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::SurfaceSize;
    use tempfile::TempDir;

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("orrery.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    fn resolve_with(config: Option<PathBuf>, args: RunArgs) -> Result<Settings> {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::from_config_dir(dir.path().to_path_buf());
        resolve(&RunArgs { config, ..args }, &paths)
    }

    #[test]
    fn defaults_use_builtin_shaders() {
        let settings = resolve_with(None, RunArgs::default()).unwrap();
        assert!(!settings.config_found);
        assert_eq!(settings.vertex_origin, "built-in");
        assert!(settings.renderer.shaders.fragment.contains("u_texture_earth"));
        assert_eq!(settings.renderer.surface_size, (1280, 720));
        assert!(settings.renderer.fps_in_title);
    }

    #[test]
    fn flags_override_the_file() {
        let dir = TempDir::new().unwrap();
        let fragment = dir.path().join("flat.frag");
        fs::write(&fragment, "void main() {}").unwrap();
        let config = write_config(
            dir.path(),
            "[window]\nwidth = 800\nheight = 600\n[input]\nzoom_sensitivity = 0.01\n\
             [textures.overrides]\nearth = \"night.png\"\n",
        );

        let args = RunArgs {
            fragment: Some(fragment.clone()),
            size: Some(SurfaceSize {
                width: 320,
                height: 240,
            }),
            no_fps_title: true,
            ..RunArgs::default()
        };
        let settings = resolve_with(Some(config), args).unwrap();

        assert!(settings.config_found);
        assert_eq!(settings.renderer.surface_size, (320, 240));
        assert_eq!(settings.renderer.zoom_sensitivity, 0.01);
        assert_eq!(settings.renderer.shaders.fragment, "void main() {}");
        assert_eq!(settings.fragment_origin, fragment.display().to_string());
        assert_eq!(
            settings.renderer.textures.source(CelestialBody::Earth),
            "night.png"
        );
        assert_eq!(
            settings.renderer.textures.source(CelestialBody::Mars),
            "textures/mars_texture.jpg"
        );
        assert!(!settings.renderer.fps_in_title);
    }

    #[test]
    fn unknown_override_body_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "[textures.overrides]\npluto = \"pluto.png\"\n");
        let err = resolve_with(Some(config), RunArgs::default()).unwrap_err();
        assert!(err.to_string().contains("pluto"));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(resolve_with(Some(missing), RunArgs::default()).is_err());
    }
}
