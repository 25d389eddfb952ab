//! Stage compilation and program linking on top of a [`GraphicsBackend`].
//!
//! Stage and program status is carried by the types: a [`CompiledShader`]
//! only exists after a successful compile, a [`Program`] only after a
//! successful link. Both functions release whatever backend object they
//! allocated when they fail, so a failed attempt leaves nothing behind.

use tracing::{debug, error};

use crate::error::RenderError;
use crate::gpu::{GraphicsBackend, ProgramId, ShaderId, UniformLocation};
use crate::types::{Attribute, CelestialBody, StageKind, Uniform, BODY_COUNT};

/// A stage that compiled successfully and is waiting to be linked.
#[derive(Debug)]
#[must_use = "a compiled stage holds a backend object until it is linked"]
pub struct CompiledShader {
    kind: StageKind,
    id: ShaderId,
}

impl CompiledShader {
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Releases the stage without linking it.
    pub fn release<B: GraphicsBackend>(self, backend: &mut B) {
        backend.delete_shader(self.id);
    }
}

/// Compiles one stage from source text.
pub fn compile<B: GraphicsBackend>(
    backend: &mut B,
    kind: StageKind,
    source: &str,
) -> Result<CompiledShader, RenderError> {
    let id = backend.create_shader(kind);
    match backend.compile_shader(id, source) {
        Ok(()) => {
            debug!(stage = %kind, "shader stage compiled");
            Ok(CompiledShader { kind, id })
        }
        Err(log) => {
            backend.delete_shader(id);
            error!(stage = %kind, "shader compilation failed:\n{log}");
            Err(RenderError::Compile { stage: kind, log })
        }
    }
}

/// Links a vertex and a fragment stage and resolves the location table.
///
/// Both stages are released whatever the outcome; the program object is
/// released too when linking fails.
pub fn link<B: GraphicsBackend>(
    backend: &mut B,
    vertex: CompiledShader,
    fragment: CompiledShader,
) -> Result<Program, RenderError> {
    let id = backend.create_program();
    let result = match (vertex.kind, fragment.kind) {
        (StageKind::Vertex, StageKind::Fragment) => backend.link_program(id, vertex.id, fragment.id),
        (vs, fs) => Err(format!("cannot link a {vs} stage with a {fs} stage")),
    };
    backend.delete_shader(vertex.id);
    backend.delete_shader(fragment.id);

    match result {
        Ok(()) => {
            let locations = LocationTable::resolve(backend, id);
            debug!(
                attributes = locations.attributes.iter().flatten().count(),
                uniforms = locations.uniforms.iter().flatten().count(),
                samplers = locations.samplers.iter().flatten().count(),
                "shader program linked"
            );
            Ok(Program { id, locations })
        }
        Err(log) => {
            backend.delete_program(id);
            error!("shader program link failed:\n{log}");
            Err(RenderError::Link { log })
        }
    }
}

/// A linked program and its cached input locations.
#[derive(Debug)]
pub struct Program {
    id: ProgramId,
    locations: LocationTable,
}

impl Program {
    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn locations(&self) -> &LocationTable {
        &self.locations
    }
}

/// Locations resolved once after linking. `None` means the program does not
/// use that input; writes through it are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationTable {
    attributes: [Option<u32>; 2],
    uniforms: [Option<UniformLocation>; 7],
    samplers: [Option<UniformLocation>; BODY_COUNT],
}

impl LocationTable {
    fn resolve<B: GraphicsBackend>(backend: &B, program: ProgramId) -> Self {
        Self {
            attributes: Attribute::ALL.map(|a| backend.attribute_location(program, a.name())),
            uniforms: Uniform::ALL.map(|u| backend.uniform_location(program, u.name())),
            samplers: CelestialBody::ALL
                .map(|body| backend.uniform_location(program, &body.sampler_uniform())),
        }
    }

    pub fn attribute(&self, attribute: Attribute) -> Option<u32> {
        self.attributes[attribute.index()]
    }

    pub fn uniform(&self, uniform: Uniform) -> Option<UniformLocation> {
        self.uniforms[uniform.index()]
    }

    pub fn sampler(&self, body: CelestialBody) -> Option<UniformLocation> {
        self.samplers[body.unit() as usize]
    }
}
