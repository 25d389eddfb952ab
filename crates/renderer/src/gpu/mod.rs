//! Graphics backends behind a GL-shaped command surface.
//!
//! The orchestrator speaks in terms of stages, programs, texture units and a
//! single indexed draw per frame. Backends translate that vocabulary:
//! - `context` owns wgpu instance/device/surface wiring and knows how to
//!   reconfigure the swapchain when the drawable size changes.
//! - `pipeline` turns a linked program plus a mesh vertex layout into a cached
//!   wgpu render pipeline with the uniform and texture bind group layouts.
//! - `uniforms` keeps the CPU staging copy of the std140 uniform block.
//! - `textures` owns GPU texture objects and their current contents.
//! - `wgpu_backend` glues the above into [`WgpuBackend`].
//! - `headless` records commands without a GPU for tests and `orrery check`.
//! - `mipmaps` builds mip chains on the CPU, on the texture decode threads.

mod context;
pub mod headless;
pub mod mipmaps;
mod pipeline;
mod textures;
mod uniforms;
mod wgpu_backend;

pub use headless::HeadlessBackend;
pub use wgpu_backend::WgpuBackend;

use crate::error::FrameError;
use crate::types::StageKind;
use mipmaps::MipLevel;

/// Opaque id of a shader stage object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub(crate) u32);

/// Opaque id of a program object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub(crate) u32);

/// Opaque id of a texture object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

/// Opaque id of an uploaded mesh (vertex array plus its buffers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub(crate) u32);

/// Where a uniform lives inside a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformLocation {
    /// Byte offset inside the std140 uniform block.
    Block { offset: u32 },
    /// Texture slot a sampler uniform reads from.
    Sampler { slot: u32 },
}

/// Value written through a [`UniformLocation`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
}

/// One vertex attribute inside an interleaved vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Shader input location the attribute feeds.
    pub location: u32,
    /// Number of `f32` components.
    pub components: u32,
    /// Byte offset from the start of a vertex.
    pub offset: u32,
}

/// Layout of an interleaved `f32` vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

/// GL-style command surface the orchestrator drives.
///
/// Object creation happens once during start-up; the per-frame methods are
/// called in the fixed order documented on [`crate::scene::Renderer`]. Frame
/// commands never fail individually: a backend that cannot honour one logs
/// it and carries on so the rest of the frame still executes.
pub trait GraphicsBackend {
    /// Allocates an empty stage object.
    fn create_shader(&mut self, kind: StageKind) -> ShaderId;
    /// Compiles `source` into the stage; `Err` carries the diagnostic log.
    fn compile_shader(&mut self, shader: ShaderId, source: &str) -> Result<(), String>;
    fn delete_shader(&mut self, shader: ShaderId);

    /// Allocates an empty program object.
    fn create_program(&mut self) -> ProgramId;
    /// Links two compiled stages; `Err` carries the diagnostic log.
    fn link_program(
        &mut self,
        program: ProgramId,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<(), String>;
    fn delete_program(&mut self, program: ProgramId);
    /// Location of an active vertex input of a linked program.
    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32>;
    /// Location of an active uniform of a linked program.
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    /// Allocates a texture object with no contents.
    fn create_texture(&mut self) -> TextureId;
    /// Replaces the texture's contents with one level of tightly packed RGBA8.
    fn upload_texture(&mut self, texture: TextureId, width: u32, height: u32, rgba: &[u8]);
    /// Replaces the texture's contents with a prebuilt mip chain, base first.
    fn upload_mip_chain(&mut self, texture: TextureId, levels: &[MipLevel]);

    /// Uploads immutable vertex and index data.
    fn create_mesh(&mut self, vertices: &[u8], indices: &[u16], layout: &VertexLayout) -> MeshId;

    /// Current size of the drawable surface, read fresh on every call.
    fn drawable_size(&self) -> (u32, u32);
    fn set_viewport(&mut self, width: u32, height: u32);
    fn begin_frame(&mut self) -> Result<(), FrameError>;
    fn clear(&mut self, color: [f32; 4]);
    /// Binds a mesh for drawing; `None` unbinds.
    fn bind_mesh(&mut self, mesh: Option<MeshId>);
    fn use_program(&mut self, program: ProgramId);
    /// Writes a uniform of the program in use.
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);
    fn bind_texture(&mut self, unit: u32, texture: TextureId);
    /// Draws `index_count` indices of the bound mesh as triangles.
    fn draw_indexed(&mut self, index_count: u32);
    fn end_frame(&mut self) -> Result<(), FrameError>;
}
