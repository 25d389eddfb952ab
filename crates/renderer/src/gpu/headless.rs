//! Recording backend without a GPU.
//!
//! Shader stages go through the same naga compile/link/reflection path as the
//! wgpu backend, so diagnostics and location tables are identical. Texture
//! contents live on the CPU as mip levels and every frame's commands are
//! recorded for inspection.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::{trace, warn};

use super::mipmaps::MipLevel;
use super::{
    GraphicsBackend, MeshId, ProgramId, ShaderId, TextureId, UniformLocation, UniformValue,
    VertexLayout,
};
use crate::compile::{self, CompiledStage, ProgramInterface};
use crate::error::FrameError;
use crate::types::StageKind;

/// Completed frames kept for inspection; older ones are dropped.
const RECORDED_FRAMES: usize = 64;

#[derive(Debug)]
struct StageSlot {
    kind: StageKind,
    compiled: Option<CompiledStage>,
}

#[derive(Debug, Clone)]
pub struct HeadlessMesh {
    pub vertex_bytes: usize,
    pub indices: Vec<u16>,
    pub layout: VertexLayout,
}

/// One indexed draw and the state it observed.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: Option<ProgramId>,
    pub mesh: Option<MeshId>,
    pub index_count: u32,
    /// Texture slot to the texture it samples, resolved through the sampler
    /// uniforms and the texture units at draw time.
    pub textures: BTreeMap<u32, TextureId>,
}

/// Commands issued between `begin_frame` and `end_frame`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameRecord {
    pub viewport: Option<(u32, u32)>,
    pub clear: Option<[f32; 4]>,
    pub program: Option<ProgramId>,
    pub mesh: Option<MeshId>,
    pub uniforms: Vec<(UniformLocation, UniformValue)>,
    /// Texture unit to texture, as bound when the frame ended.
    pub units: BTreeMap<u32, TextureId>,
    /// Sampler slot to texture unit, as set through sampler uniforms.
    pub sampler_units: BTreeMap<u32, u32>,
    pub draws: Vec<DrawCall>,
    /// Whether the mesh was unbound again before the frame ended.
    pub mesh_released: bool,
}

impl FrameRecord {
    /// Last value written to the block offset `offset` during this frame.
    pub fn block_value(&self, offset: u32) -> Option<UniformValue> {
        self.uniforms.iter().rev().find_map(|(location, value)| {
            (*location == UniformLocation::Block { offset }).then_some(*value)
        })
    }
}

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    size: (u32, u32),
    next_id: u32,
    shaders: HashMap<ShaderId, StageSlot>,
    programs: HashMap<ProgramId, Option<ProgramInterface>>,
    textures: HashMap<TextureId, Vec<MipLevel>>,
    meshes: HashMap<MeshId, HeadlessMesh>,
    bound_mesh: Option<MeshId>,
    program: Option<ProgramId>,
    units: BTreeMap<u32, TextureId>,
    sampler_units: BTreeMap<u32, u32>,
    current: Option<FrameRecord>,
    frames: VecDeque<FrameRecord>,
    frames_completed: u64,
    pending_failure: Option<FrameError>,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            ..Self::default()
        }
    }

    /// Simulates the host resizing the drawable surface.
    pub fn set_drawable_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    /// Makes the next `begin_frame` fail with `error`.
    pub fn fail_next_frame(&mut self, error: FrameError) {
        self.pending_failure = Some(error);
    }

    pub fn frames(&self) -> impl Iterator<Item = &FrameRecord> {
        self.frames.iter()
    }

    pub fn last_frame(&self) -> Option<&FrameRecord> {
        self.frames.back()
    }

    pub fn frames_completed(&self) -> u64 {
        self.frames_completed
    }

    /// Mip levels of `texture`, base level first.
    pub fn texture_levels(&self, texture: TextureId) -> Option<&[MipLevel]> {
        self.textures.get(&texture).map(Vec::as_slice)
    }

    pub fn mesh(&self, mesh: MeshId) -> Option<&HeadlessMesh> {
        self.meshes.get(&mesh)
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn frame(&mut self) -> Option<&mut FrameRecord> {
        if self.current.is_none() {
            trace!("headless command outside of a frame ignored");
        }
        self.current.as_mut()
    }

    fn resolve_textures(&self) -> BTreeMap<u32, TextureId> {
        self.sampler_units
            .iter()
            .filter_map(|(slot, unit)| self.units.get(unit).map(|texture| (*slot, *texture)))
            .collect()
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn create_shader(&mut self, kind: StageKind) -> ShaderId {
        let id = ShaderId(self.allocate());
        self.shaders.insert(
            id,
            StageSlot {
                kind,
                compiled: None,
            },
        );
        id
    }

    fn compile_shader(&mut self, shader: ShaderId, source: &str) -> Result<(), String> {
        let slot = self
            .shaders
            .get_mut(&shader)
            .ok_or_else(|| format!("unknown shader object {shader:?}"))?;
        slot.compiled = Some(compile::compile_stage(slot.kind, source)?);
        Ok(())
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn create_program(&mut self) -> ProgramId {
        let id = ProgramId(self.allocate());
        self.programs.insert(id, None);
        id
    }

    fn link_program(
        &mut self,
        program: ProgramId,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<(), String> {
        let stage = |id: ShaderId| {
            self.shaders
                .get(&id)
                .and_then(|slot| slot.compiled.as_ref())
                .ok_or_else(|| format!("shader object {id:?} is not compiled"))
        };
        let interface = compile::link_stages(stage(vertex)?, stage(fragment)?)?.interface;
        let slot = self
            .programs
            .get_mut(&program)
            .ok_or_else(|| format!("unknown program object {program:?}"))?;
        *slot = Some(interface);
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.program == Some(program) {
            self.program = None;
        }
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.programs
            .get(&program)?
            .as_ref()?
            .attribute_location(name)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs.get(&program)?.as_ref()?.uniform_location(name)
    }

    fn create_texture(&mut self) -> TextureId {
        let id = TextureId(self.allocate());
        self.textures.insert(id, Vec::new());
        id
    }

    fn upload_texture(&mut self, texture: TextureId, width: u32, height: u32, rgba: &[u8]) {
        self.upload_mip_chain(texture, &[MipLevel::new(width, height, rgba.to_vec())]);
    }

    fn upload_mip_chain(&mut self, texture: TextureId, levels: &[MipLevel]) {
        let Some(slot) = self.textures.get_mut(&texture) else {
            warn!(?texture, "upload to unknown texture ignored");
            return;
        };
        if levels.is_empty() {
            return;
        }
        *slot = levels.to_vec();
    }

    fn create_mesh(&mut self, vertices: &[u8], indices: &[u16], layout: &VertexLayout) -> MeshId {
        let id = MeshId(self.allocate());
        self.meshes.insert(
            id,
            HeadlessMesh {
                vertex_bytes: vertices.len(),
                indices: indices.to_vec(),
                layout: layout.clone(),
            },
        );
        id
    }

    fn drawable_size(&self) -> (u32, u32) {
        self.size
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        if let Some(frame) = self.frame() {
            frame.viewport = Some((width, height));
        }
    }

    fn begin_frame(&mut self) -> Result<(), FrameError> {
        if let Some(error) = self.pending_failure.take() {
            return Err(error);
        }
        self.current = Some(FrameRecord::default());
        Ok(())
    }

    fn clear(&mut self, color: [f32; 4]) {
        if let Some(frame) = self.frame() {
            frame.clear = Some(color);
        }
    }

    fn bind_mesh(&mut self, mesh: Option<MeshId>) {
        self.bound_mesh = mesh;
        if let Some(frame) = self.frame() {
            match mesh {
                Some(mesh) => {
                    frame.mesh = Some(mesh);
                    frame.mesh_released = false;
                }
                None => frame.mesh_released = true,
            }
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        self.program = Some(program);
        if let Some(frame) = self.frame() {
            frame.program = Some(program);
        }
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        if let (UniformLocation::Sampler { slot }, UniformValue::Int(unit)) = (location, value) {
            self.sampler_units.insert(slot, unit.max(0) as u32);
        }
        if let Some(frame) = self.frame() {
            frame.uniforms.push((location, value));
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        self.units.insert(unit, texture);
    }

    fn draw_indexed(&mut self, index_count: u32) {
        let draw = DrawCall {
            program: self.program,
            mesh: self.bound_mesh,
            index_count,
            textures: self.resolve_textures(),
        };
        if let Some(frame) = self.frame() {
            frame.draws.push(draw);
        }
    }

    fn end_frame(&mut self) -> Result<(), FrameError> {
        let Some(mut frame) = self.current.take() else {
            return Ok(());
        };
        frame.units = self.units.clone();
        frame.sampler_units = self.sampler_units.clone();
        if self.frames.len() == RECORDED_FRAMES {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
        self.frames_completed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::tests::{FRAGMENT, VERTEX};

    #[test]
    fn compile_failure_keeps_stage_uncompiled() {
        let mut backend = HeadlessBackend::new(4, 4);
        let vs = backend.create_shader(StageKind::Vertex);
        assert!(backend.compile_shader(vs, "void main( {").is_err());
        let fs = backend.create_shader(StageKind::Fragment);
        backend.compile_shader(fs, FRAGMENT).expect("fragment");
        let program = backend.create_program();
        let err = backend.link_program(program, vs, fs).expect_err("vertex not compiled");
        assert!(err.contains("not compiled"));
    }

    #[test]
    fn linked_program_resolves_locations() {
        let mut backend = HeadlessBackend::new(4, 4);
        let vs = backend.create_shader(StageKind::Vertex);
        backend.compile_shader(vs, VERTEX).expect("vertex");
        let fs = backend.create_shader(StageKind::Fragment);
        backend.compile_shader(fs, FRAGMENT).expect("fragment");
        let program = backend.create_program();
        backend.link_program(program, vs, fs).expect("link");
        assert_eq!(backend.attribute_location(program, "a_uv"), Some(1));
        assert_eq!(backend.attribute_location(program, "a_missing"), None);
        backend.delete_program(program);
        assert_eq!(backend.attribute_location(program, "a_uv"), None);
    }

    #[test]
    fn draw_resolves_textures_through_sampler_units() {
        let mut backend = HeadlessBackend::new(4, 4);
        let texture = backend.create_texture();
        backend.upload_texture(texture, 1, 1, &[1, 2, 3, 4]);
        backend.begin_frame().expect("frame");
        backend.bind_texture(3, texture);
        backend.set_uniform(UniformLocation::Sampler { slot: 0 }, UniformValue::Int(3));
        backend.draw_indexed(6);
        backend.end_frame().expect("frame");

        let frame = backend.last_frame().expect("recorded");
        assert_eq!(frame.draws[0].textures.get(&0), Some(&texture));
        assert_eq!(frame.sampler_units.get(&0), Some(&3));
    }

    #[test]
    fn injected_failure_skips_one_frame() {
        let mut backend = HeadlessBackend::new(4, 4);
        backend.fail_next_frame(FrameError::Timeout);
        assert_eq!(backend.begin_frame(), Err(FrameError::Timeout));
        assert!(backend.begin_frame().is_ok());
    }
}
