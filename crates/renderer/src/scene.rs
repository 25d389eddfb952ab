use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::clock::{FrameClock, Tick};
use crate::error::{FrameError, RenderError};
use crate::gpu::{GraphicsBackend, UniformLocation, UniformValue};
use crate::input::{InputCommand, RenderState};
use crate::mesh::StaticMesh;
use crate::shader::{self, Program};
use crate::texture::{ImageSource, TextureSet};
use crate::types::{CelestialBody, ShaderSources, StageKind, TextureManifest, Uniform};

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Owns the program, quad, textures, clock and interaction state, and drives
/// one draw per frame through a [`GraphicsBackend`].
///
/// Construction is the initializing phase: it only succeeds once the program
/// is linked and the mesh uploaded, so every `Renderer` value is running.
///
/// Each [`render_frame`](Self::render_frame) issues, in order: viewport from
/// the fresh drawable size, black clear, mesh and program binding, scalar
/// uniforms, the ten texture units with their sampler uniforms, one indexed
/// draw, mesh unbind. The clock advances after the frame is submitted.
pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    program: Program,
    mesh: StaticMesh,
    textures: TextureSet,
    clock: FrameClock,
    state: RenderState,
    frames: u64,
}

impl<B: GraphicsBackend> Renderer<B> {
    pub fn initialize(
        mut backend: B,
        shaders: &ShaderSources,
        images: Arc<dyn ImageSource>,
        manifest: &TextureManifest,
    ) -> Result<Self, RenderError> {
        let vertex = shader::compile(&mut backend, StageKind::Vertex, &shaders.vertex)?;
        let fragment = match shader::compile(&mut backend, StageKind::Fragment, &shaders.fragment) {
            Ok(fragment) => fragment,
            Err(err) => {
                vertex.release(&mut backend);
                return Err(err);
            }
        };
        let program = shader::link(&mut backend, vertex, fragment)?;
        let mesh = StaticMesh::quad(&mut backend, program.locations());
        let textures = TextureSet::load_all(&mut backend, images, manifest);

        info!(
            textures = textures.iter().count(),
            indices = mesh.index_count(),
            "renderer initialised"
        );
        Ok(Self {
            backend,
            program,
            mesh,
            textures,
            clock: FrameClock::new(),
            state: RenderState::default(),
            frames: 0,
        })
    }

    /// Renders one frame and advances the clock.
    ///
    /// A failed `begin_frame` skips the frame without ticking; the error is
    /// handed back to the host loop.
    pub fn render_frame(&mut self) -> Result<Tick, FrameError> {
        self.render_frame_at(Instant::now())
    }

    /// Same as [`render_frame`](Self::render_frame) with an explicit tick time.
    pub fn render_frame_at(&mut self, now: Instant) -> Result<Tick, FrameError> {
        let (width, height) = self.backend.drawable_size();
        self.backend.begin_frame()?;
        self.backend.set_viewport(width, height);
        self.backend.clear(CLEAR_COLOR);

        self.backend.bind_mesh(Some(self.mesh.id()));
        self.backend.use_program(self.program.id());

        let state = self.state;
        let locations = self.program.locations();
        let values = [
            (Uniform::Resolution, UniformValue::Vec2([width as f32, height as f32])),
            (Uniform::Time, UniformValue::Float(self.clock.time() as f32)),
            (Uniform::Dt, UniformValue::Float(self.clock.dt() as f32)),
            (Uniform::Mouse, UniformValue::Vec2(state.pointer())),
            (Uniform::Zoom, UniformValue::Float(state.zoom())),
            (Uniform::StarMode, UniformValue::Int(state.background().shader_value())),
            (Uniform::Orbit, UniformValue::Int(i32::from(state.orbit()))),
        ];
        for (uniform, value) in values {
            set_optional(&mut self.backend, locations.uniform(uniform), value);
        }

        for body in CelestialBody::ALL {
            let unit = body.unit();
            self.backend.bind_texture(unit, self.textures.get(body).id());
            set_optional(
                &mut self.backend,
                locations.sampler(body),
                UniformValue::Int(unit as i32),
            );
        }

        self.backend.draw_indexed(self.mesh.index_count());
        self.backend.bind_mesh(None);
        let ended = self.backend.end_frame();

        let tick = self.clock.tick_at(now);
        self.frames += 1;
        ended.map(|()| tick)
    }

    /// Applies texture decodes that finished since the last call.
    pub fn pump_texture_loads(&mut self) -> usize {
        let applied = self.textures.pump(&mut self.backend);
        if applied > 0 {
            debug!(applied, pending = self.textures.pending(), "texture loads applied");
        }
        applied
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RenderState {
        &mut self.state
    }

    pub fn apply(&mut self, command: InputCommand) {
        self.state.apply(command);
        debug!(?command, "input command applied");
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn displayed_fps(&self) -> u32 {
        self.clock.displayed_fps()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn mesh(&self) -> &StaticMesh {
        &self.mesh
    }

    pub fn textures(&self) -> &TextureSet {
        &self.textures
    }

    /// Blocks until every texture load settled or `timeout` passes.
    pub fn wait_for_texture_loads(&mut self, timeout: Duration) -> bool {
        self.textures.wait_for_loads(&mut self.backend, timeout)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

/// Writes through `location` when the program uses it.
fn set_optional<B: GraphicsBackend>(
    backend: &mut B,
    location: Option<UniformLocation>,
    value: UniformValue,
) {
    if let Some(location) = location {
        backend.set_uniform(location, value);
    }
}
