/// Smallest zoom factor.
pub const ZOOM_MIN: f32 = 0.1;
/// Largest zoom factor.
pub const ZOOM_MAX: f32 = 5.0;

/// Star field style selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackgroundMode {
    /// Procedural dots.
    #[default]
    Simple,
    /// The star map texture.
    Realistic,
}

impl BackgroundMode {
    /// Value written to `u_starMode`.
    pub fn shader_value(self) -> i32 {
        match self {
            BackgroundMode::Simple => 0,
            BackgroundMode::Realistic => 1,
        }
    }
}

/// Discrete commands issued by UI or keyboard collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCommand {
    SelectSimpleBackground,
    SelectRealisticBackground,
    ToggleOrbit,
    ResetView,
}

/// Interaction parameters read once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    pointer: [f32; 2],
    zoom: f32,
    background: BackgroundMode,
    orbit: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            pointer: [0.0, 0.0],
            zoom: 1.0,
            background: BackgroundMode::Simple,
            orbit: false,
        }
    }
}

impl RenderState {
    /// Sets the pointer from viewport-normalized coordinates, clamped to [0, 1].
    pub fn set_pointer(&mut self, x: f32, y: f32) {
        self.pointer = [clamp_unit(x), clamp_unit(y)];
    }

    /// Sets the pointer from a pixel position inside a `width`×`height` surface.
    pub fn set_pointer_pixels(&mut self, x: f64, y: f64, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.set_pointer((x / width as f64) as f32, (y / height as f64) as f32);
    }

    /// Adds `delta` to the zoom factor, clamped to [`ZOOM_MIN`, `ZOOM_MAX`].
    pub fn adjust_zoom(&mut self, delta: f32) {
        if !delta.is_finite() {
            return;
        }
        self.zoom = (self.zoom + delta).clamp(ZOOM_MIN, ZOOM_MAX);
    }

    pub fn apply(&mut self, command: InputCommand) {
        match command {
            InputCommand::SelectSimpleBackground => self.background = BackgroundMode::Simple,
            InputCommand::SelectRealisticBackground => {
                self.background = BackgroundMode::Realistic
            }
            InputCommand::ToggleOrbit => self.orbit = !self.orbit,
            InputCommand::ResetView => {
                self.pointer = [0.0, 0.0];
                self.zoom = 1.0;
            }
        }
    }

    pub fn pointer(&self) -> [f32; 2] {
        self.pointer
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn background(&self) -> BackgroundMode {
        self.background
    }

    pub fn orbit(&self) -> bool {
        self.orbit
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
