use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "orrery",
    author,
    version,
    about = "Shader-driven solar system",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Flags shared by the window and every subcommand. Each one overrides the
/// matching `orrery.toml` value.
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Configuration file to use instead of the discovered `orrery.toml`.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// GLSL vertex stage replacing the built-in quad shader.
    #[arg(long, global = true, value_name = "FILE")]
    pub vertex: Option<PathBuf>,

    /// GLSL fragment stage replacing the built-in solar system shader.
    #[arg(long, global = true, value_name = "FILE")]
    pub fragment: Option<PathBuf>,

    /// Directory body texture paths are resolved against.
    #[arg(long, global = true, value_name = "DIR")]
    pub textures: Option<PathBuf>,

    /// Window size (e.g. `1280x720`).
    #[arg(long, global = true, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<SurfaceSize>,

    /// Zoom change per scrolled pixel.
    #[arg(long, global = true, value_name = "FACTOR")]
    pub zoom_sensitivity: Option<f32>,

    /// Keep the frame rate out of the window title.
    #[arg(long, global = true)]
    pub no_fps_title: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile, link and render frames without opening a window.
    Check(CheckArgs),
    /// Print the resolved configuration, shader and texture paths.
    Where,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Number of frames to render.
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub frames: u32,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_surface_size(spec: &str) -> Result<SurfaceSize, String> {
    let (width, height) = spec
        .trim()
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1920x1080".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| "invalid width in size specification".to_string())?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| "invalid height in size specification".to_string())?;

    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".to_string());
    }

    Ok(SurfaceSize { width, height })
}
