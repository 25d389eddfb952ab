use crate::types::StageKind;

/// Fatal start-up failures. Any of these keeps the render loop from starting.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("could not compile {stage} shader:\n{log}")]
    Compile { stage: StageKind, log: String },
    #[error("could not link shader program:\n{log}")]
    Link { log: String },
}

impl RenderError {
    /// Diagnostic text reported by the shader backend.
    pub fn log(&self) -> &str {
        match self {
            RenderError::Compile { log, .. } | RenderError::Link { log } => log,
        }
    }
}

/// Per-frame presentation failures reported by a backend.
///
/// None of these are fatal on their own; the host loop decides whether to
/// reconfigure, retry on the next frame, or exit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("surface lost or outdated")]
    SurfaceLost,
    #[error("timed out acquiring the next surface texture")]
    Timeout,
    #[error("out of GPU memory")]
    OutOfMemory,
    #[error("drawable surface has zero size")]
    ZeroSized,
    #[error("surface error: {0}")]
    Other(String),
}

impl From<wgpu::SurfaceError> for FrameError {
    fn from(value: wgpu::SurfaceError) -> Self {
        match value {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => FrameError::SurfaceLost,
            wgpu::SurfaceError::Timeout => FrameError::Timeout,
            wgpu::SurfaceError::OutOfMemory => FrameError::OutOfMemory,
            other => FrameError::Other(format!("{other:?}")),
        }
    }
}
