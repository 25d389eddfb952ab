use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, trace, warn};
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::context::GpuContext;
use super::mipmaps::MipLevel;
use super::pipeline::{self, PipelineLayouts};
use super::textures::TextureTable;
use super::uniforms::UniformStaging;
use super::{
    GraphicsBackend, MeshId, ProgramId, ShaderId, TextureId, UniformLocation, UniformValue,
    VertexLayout,
};
use crate::compile::{self, CompiledStage, ProgramInterface};
use crate::error::FrameError;
use crate::types::{StageKind, BODY_COUNT};

/// Texture units addressable through `bind_texture`.
const MAX_UNITS: usize = 16;
/// Always-present texture sampled by units with nothing bound.
const FALLBACK_TEXTURE: TextureId = TextureId(0);

struct GpuStage {
    kind: StageKind,
    compiled: Option<CompiledStage>,
}

struct LinkedProgram {
    interface: ProgramInterface,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    staging: UniformStaging,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    layout: VertexLayout,
}

struct FrameTarget {
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

/// Renders into a winit window surface with wgpu.
///
/// Pipelines are created on first draw of a (program, mesh) pair and cached.
/// The texture bind group is rebuilt only when the texture feeding some slot
/// changes, either through `bind_texture`, a sampler uniform, or new contents.
pub struct WgpuBackend {
    window: Arc<Window>,
    context: GpuContext,
    layouts: PipelineLayouts,
    textures: TextureTable,
    next_id: u32,
    shaders: HashMap<ShaderId, GpuStage>,
    programs: HashMap<ProgramId, Option<LinkedProgram>>,
    meshes: HashMap<MeshId, GpuMesh>,
    pipelines: HashMap<(ProgramId, MeshId), Option<wgpu::RenderPipeline>>,
    texture_group: Option<([(TextureId, u64); BODY_COUNT], wgpu::BindGroup)>,
    units: [TextureId; MAX_UNITS],
    sampler_units: [u32; BODY_COUNT],
    program: Option<ProgramId>,
    bound_mesh: Option<MeshId>,
    viewport: (u32, u32),
    pending_clear: Option<[f32; 4]>,
    frame: Option<FrameTarget>,
}

impl WgpuBackend {
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let context = GpuContext::new(Arc::clone(&window))?;
        let layouts = PipelineLayouts::new(&context.device);
        let mut textures = TextureTable::new(&context.device);
        textures.create(&context.device, &context.queue, FALLBACK_TEXTURE);
        let size = context.size;

        Ok(Self {
            window,
            context,
            layouts,
            textures,
            next_id: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            meshes: HashMap::new(),
            pipelines: HashMap::new(),
            texture_group: None,
            units: [FALLBACK_TEXTURE; MAX_UNITS],
            sampler_units: [0; BODY_COUNT],
            program: None,
            bound_mesh: None,
            viewport: (size.width, size.height),
            pending_clear: None,
            frame: None,
        })
    }

    /// Reconfigures the surface after it was reported lost or outdated.
    pub fn reconfigure(&mut self) {
        let size = self.window.inner_size();
        if size != self.context.size {
            self.context.resize(size);
        } else {
            self.context.reconfigure();
        }
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn create_module(&self, stage: &CompiledStage) -> wgpu::ShaderModule {
        self.context
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(match stage.kind {
                    StageKind::Vertex => "orrery vertex",
                    StageKind::Fragment => "orrery fragment",
                }),
                source: wgpu::ShaderSource::Naga(Cow::Owned(stage.module.clone())),
            })
    }

    fn linked(
        &self,
        vertex: &CompiledStage,
        fragment: &CompiledStage,
        interface: ProgramInterface,
    ) -> Result<LinkedProgram, String> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex_module = self.create_module(vertex);
        let fragment_module = self.create_module(fragment);
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(error.to_string());
        }

        let staging = UniformStaging::new(interface.uniform_block_size);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("orrery uniforms"),
            size: staging.size(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("orrery uniform bind group"),
            layout: &self.layouts.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        Ok(LinkedProgram {
            interface,
            vertex: vertex_module,
            fragment: fragment_module,
            staging,
            buffer,
            bind_group,
        })
    }

    fn ensure_pipeline(&mut self, program: ProgramId, mesh: MeshId) -> bool {
        if let Some(cached) = self.pipelines.get(&(program, mesh)) {
            return cached.is_some();
        }
        let (Some(Some(linked)), Some(gpu_mesh)) =
            (self.programs.get(&program), self.meshes.get(&mesh))
        else {
            return false;
        };

        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let built = self.layouts.build(
            device,
            &linked.vertex,
            &linked.fragment,
            &gpu_mesh.layout,
            self.context.surface_format,
        );
        let pipeline = match pollster::block_on(device.pop_error_scope()) {
            None => {
                debug!(?program, ?mesh, "render pipeline created");
                Some(built)
            }
            Some(error) => {
                warn!(?program, ?mesh, %error, "render pipeline creation failed; draws skipped");
                None
            }
        };
        let ok = pipeline.is_some();
        self.pipelines.insert((program, mesh), pipeline);
        ok
    }

    /// Texture and generation feeding each slot through its sampler unit.
    fn slot_textures(&self) -> [(TextureId, u64); BODY_COUNT] {
        std::array::from_fn(|slot| {
            let unit = self.sampler_units[slot] as usize;
            let id = self.units.get(unit).copied().unwrap_or(FALLBACK_TEXTURE);
            match self.textures.get(id) {
                Some(texture) => (id, texture.generation),
                None => (FALLBACK_TEXTURE, 0),
            }
        })
    }

    fn refresh_texture_group(&mut self) {
        let key = self.slot_textures();
        if matches!(&self.texture_group, Some((current, _)) if *current == key) {
            return;
        }
        let Some(fallback) = self.textures.get(FALLBACK_TEXTURE) else {
            return;
        };
        let views: [&wgpu::TextureView; BODY_COUNT] = std::array::from_fn(|slot| {
            self.textures
                .get(key[slot].0)
                .map(|texture| &texture.view)
                .unwrap_or(&fallback.view)
        });
        let group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("body texture bind group"),
                layout: &self.layouts.texture_layout,
                entries: &pipeline::texture_entries(&views, &self.textures.sampler),
            });
        trace!("texture bind group rebuilt");
        self.texture_group = Some((key, group));
    }
}

impl GraphicsBackend for WgpuBackend {
    fn create_shader(&mut self, kind: StageKind) -> ShaderId {
        let id = ShaderId(self.allocate());
        self.shaders.insert(
            id,
            GpuStage {
                kind,
                compiled: None,
            },
        );
        id
    }

    fn compile_shader(&mut self, shader: ShaderId, source: &str) -> Result<(), String> {
        let stage = self
            .shaders
            .get_mut(&shader)
            .ok_or_else(|| format!("unknown shader object {shader:?}"))?;
        stage.compiled = Some(compile::compile_stage(stage.kind, source)?);
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
                .and_then(|stage| stage.compiled.as_ref())
                .ok_or_else(|| format!("shader object {id:?} is not compiled"))
        };
        let (vs, fs) = (stage(vertex)?, stage(fragment)?);
        let stages = compile::link_stages(vs, fs)?;
        let fs = stages.relocated_fragment.as_ref().unwrap_or(fs);
        let linked = self.linked(vs, fs, stages.interface)?;
        match self.programs.get_mut(&program) {
            Some(slot) => {
                *slot = Some(linked);
                Ok(())
            }
            None => Err(format!("unknown program object {program:?}")),
        }
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.pipelines.retain(|(owner, _), _| *owner != program);
        if self.program == Some(program) {
            self.program = None;
        }
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.programs
            .get(&program)?
            .as_ref()?
            .interface
            .attribute_location(name)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs
            .get(&program)?
            .as_ref()?
            .interface
            .uniform_location(name)
    }

    fn create_texture(&mut self) -> TextureId {
        let id = TextureId(self.allocate());
        self.textures
            .create(&self.context.device, &self.context.queue, id);
        id
    }

    fn upload_texture(&mut self, texture: TextureId, width: u32, height: u32, rgba: &[u8]) {
        self.upload_mip_chain(texture, &[MipLevel::new(width, height, rgba.to_vec())]);
    }

    fn upload_mip_chain(&mut self, texture: TextureId, levels: &[MipLevel]) {
        if let Some(level) = levels.iter().find(|level| !level.is_packed()) {
            warn!(
                ?texture,
                width = level.width,
                height = level.height,
                bytes = level.pixels.len(),
                "texture upload with mismatched size ignored"
            );
            return;
        }
        if !self
            .textures
            .upload(&self.context.device, &self.context.queue, texture, levels)
        {
            warn!(?texture, "upload to unknown texture ignored");
        }
    }

    fn create_mesh(&mut self, vertices: &[u8], indices: &[u16], layout: &VertexLayout) -> MeshId {
        let id = MeshId(self.allocate());
        let device = &self.context.device;
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("orrery vertices"),
            contents: vertices,
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("orrery indices"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.meshes.insert(
            id,
            GpuMesh {
                vertex_buffer,
                index_buffer,
                layout: layout.clone(),
            },
        );
        id
    }

    fn drawable_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn begin_frame(&mut self) -> Result<(), FrameError> {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(FrameError::ZeroSized);
        }
        if size != self.context.size {
            self.context.resize(size);
        }

        let surface_texture = self.context.surface.get_current_texture()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("orrery frame encoder"),
            });
        self.pending_clear = None;
        self.frame = Some(FrameTarget {
            surface_texture,
            view,
            encoder,
        });
        Ok(())
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.pending_clear = Some(color);
    }

    fn bind_mesh(&mut self, mesh: Option<MeshId>) {
        self.bound_mesh = mesh;
    }

    fn use_program(&mut self, program: ProgramId) {
        self.program = Some(program);
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        match location {
            UniformLocation::Block { offset } => {
                let Some(Some(linked)) = self.program.and_then(|p| self.programs.get_mut(&p)) else {
                    trace!(offset, "uniform write without a linked program ignored");
                    return;
                };
                if !linked.staging.write(offset, value) {
                    warn!(offset, ?value, "uniform write outside the block ignored");
                }
            }
            UniformLocation::Sampler { slot } => {
                let (Some(target), UniformValue::Int(unit)) =
                    (self.sampler_units.get_mut(slot as usize), value)
                else {
                    warn!(slot, ?value, "invalid sampler uniform write ignored");
                    return;
                };
                *target = unit.clamp(0, MAX_UNITS as i32 - 1) as u32;
            }
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        match self.units.get_mut(unit as usize) {
            Some(slot) => *slot = texture,
            None => warn!(unit, "texture unit out of range ignored"),
        }
    }

    fn draw_indexed(&mut self, index_count: u32) {
        let (Some(program), Some(mesh)) = (self.program, self.bound_mesh) else {
            warn!("draw without a program and mesh ignored");
            return;
        };
        if self.frame.is_none() {
            trace!("draw outside of a frame ignored");
            return;
        }
        if !self.ensure_pipeline(program, mesh) {
            return;
        }
        self.refresh_texture_group();

        let (Some(Some(linked)), Some(gpu_mesh), Some(Some(pipeline)), Some((_, texture_group)), Some(frame)) = (
            self.programs.get(&program),
            self.meshes.get(&mesh),
            self.pipelines.get(&(program, mesh)),
            self.texture_group.as_ref(),
            self.frame.as_mut(),
        ) else {
            return;
        };

        self.context
            .queue
            .write_buffer(&linked.buffer, 0, linked.staging.as_bytes());

        let load = match self.pending_clear.take() {
            Some(color) => wgpu::LoadOp::Clear(clear_color(color)),
            None => wgpu::LoadOp::Load,
        };
        let (target_width, target_height) = (self.context.config.width, self.context.config.height);
        let width = self.viewport.0.clamp(1, target_width) as f32;
        let height = self.viewport.1.clamp(1, target_height) as f32;

        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("orrery pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_viewport(0.0, 0.0, width, height, 0.0, 1.0);
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &linked.bind_group, &[]);
        pass.set_bind_group(1, texture_group, &[]);
        pass.set_vertex_buffer(0, gpu_mesh.vertex_buffer.slice(..));
        pass.set_index_buffer(gpu_mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..index_count, 0, 0..1);
    }

    fn end_frame(&mut self) -> Result<(), FrameError> {
        let Some(mut frame) = self.frame.take() else {
            return Ok(());
        };
        if let Some(color) = self.pending_clear.take() {
            let _pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("orrery clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color(color)),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.context.queue.submit(Some(frame.encoder.finish()));
        self.window.pre_present_notify();
        frame.surface_texture.present();
        Ok(())
    }
}

fn clear_color(color: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(color[0]),
        g: f64::from(color[1]),
        b: f64::from(color[2]),
        a: f64::from(color[3]),
    }
}
