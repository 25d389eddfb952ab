//! Renderer crate for Orrery, a shader-driven solar system.
//!
//! One program, one quad and ten body textures are drawn once per display
//! refresh. The overall flow is:
//!
//! ```text
//!   orrery CLI
//!        │ RendererConfig
//!        ▼
//!   run_window ──▶ winit event loop ──▶ Renderer::render_frame()
//!                        │                    │
//!                        │ input              ├─▶ uniforms from FrameClock / RenderState
//!                        ▼                    ├─▶ texture units 0..9
//!                   RenderState               └─▶ GraphicsBackend (wgpu or headless)
//! ```
//!
//! Shader stages are GLSL. Each stage is wrapped with a prelude declaring the
//! uniform block and body textures, then compiled and validated with naga so
//! compile and link failures carry real diagnostics. Textures start on a white
//! placeholder pixel and are replaced once their decode thread reports back.

pub mod clock;
mod compile;
pub mod error;
pub mod gpu;
pub mod input;
pub mod mesh;
pub mod scene;
pub mod shader;
pub mod texture;
pub mod types;
mod window;

pub use clock::{FrameClock, Tick};
pub use error::{FrameError, RenderError};
pub use gpu::{GraphicsBackend, HeadlessBackend, WgpuBackend};
pub use input::{BackgroundMode, InputCommand, RenderState};
pub use mesh::StaticMesh;
pub use scene::Renderer;
pub use texture::{DecodedImage, FileImageSource, ImageSource, LoadStatus, PLACEHOLDER_PIXEL};
pub use types::{
    CelestialBody, RendererConfig, ShaderSources, StageKind, TextureManifest, BODY_COUNT,
};
pub use window::run_window;
