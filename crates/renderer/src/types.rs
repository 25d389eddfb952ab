use std::fmt;
use std::path::PathBuf;

/// Number of celestial bodies the fragment shader samples (`u_texture_*`).
pub const BODY_COUNT: usize = 10;

/// Celestial bodies with a dedicated texture slot.
///
/// The declaration order is the texture-unit order: `Earth` reads from unit 0,
/// `Stars` from unit 9. Shaders rely on this mapping, so it must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CelestialBody {
    Earth,
    Mars,
    Jupiter,
    Mercury,
    Neptune,
    Saturn,
    Uranus,
    Venus,
    Sun,
    Stars,
}

impl CelestialBody {
    /// All bodies in texture-unit order.
    pub const ALL: [CelestialBody; BODY_COUNT] = [
        CelestialBody::Earth,
        CelestialBody::Mars,
        CelestialBody::Jupiter,
        CelestialBody::Mercury,
        CelestialBody::Neptune,
        CelestialBody::Saturn,
        CelestialBody::Uranus,
        CelestialBody::Venus,
        CelestialBody::Sun,
        CelestialBody::Stars,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CelestialBody::Earth => "earth",
            CelestialBody::Mars => "mars",
            CelestialBody::Jupiter => "jupiter",
            CelestialBody::Mercury => "mercury",
            CelestialBody::Neptune => "neptune",
            CelestialBody::Saturn => "saturn",
            CelestialBody::Uranus => "uranus",
            CelestialBody::Venus => "venus",
            CelestialBody::Sun => "sun",
            CelestialBody::Stars => "stars",
        }
    }

    /// Texture unit (and texture slot) this body is bound to.
    pub fn unit(self) -> u32 {
        self as u32
    }

    /// Name of the sampler uniform the shader declares for this body.
    pub fn sampler_uniform(self) -> String {
        format!("u_texture_{}", self.name())
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|body| body.name() == normalized)
    }

    pub fn from_slot(slot: u32) -> Option<Self> {
        Self::ALL.get(slot as usize).copied()
    }
}

impl fmt::Display for CelestialBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Pipeline stage of a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Vertex,
    Fragment,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Vertex => f.write_str("vertex"),
            StageKind::Fragment => f.write_str("fragment"),
        }
    }
}

/// Scalar and vector inputs written once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uniform {
    Resolution,
    Time,
    Dt,
    Mouse,
    Zoom,
    StarMode,
    Orbit,
}

impl Uniform {
    pub const ALL: [Uniform; 7] = [
        Uniform::Resolution,
        Uniform::Time,
        Uniform::Dt,
        Uniform::Mouse,
        Uniform::Zoom,
        Uniform::StarMode,
        Uniform::Orbit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Uniform::Resolution => "u_resolution",
            Uniform::Time => "u_time",
            Uniform::Dt => "u_dt",
            Uniform::Mouse => "u_mouse",
            Uniform::Zoom => "u_zoom",
            Uniform::StarMode => "u_starMode",
            Uniform::Orbit => "u_orbit",
        }
    }

    /// GLSL type of the uniform block member backing this input.
    pub fn glsl_type(self) -> &'static str {
        match self {
            Uniform::Resolution | Uniform::Mouse => "vec2",
            Uniform::Time | Uniform::Dt | Uniform::Zoom => "float",
            Uniform::StarMode | Uniform::Orbit => "int",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Vertex attributes consumed by the vertex stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Position,
    Uv,
}

impl Attribute {
    pub const ALL: [Attribute; 2] = [Attribute::Position, Attribute::Uv];

    pub fn name(self) -> &'static str {
        match self {
            Attribute::Position => "a_position",
            Attribute::Uv => "a_uv",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Vertex and fragment GLSL handed to the renderer before start-up.
#[derive(Debug, Clone)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSources {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}

/// Image identifier for each body's texture, in texture-unit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureManifest {
    sources: [String; BODY_COUNT],
}

impl TextureManifest {
    /// Uses `textures/<body>_texture.jpg` for every body.
    pub fn conventional() -> Self {
        Self {
            sources: std::array::from_fn(|index| {
                format!("textures/{}_texture.jpg", CelestialBody::ALL[index].name())
            }),
        }
    }

    pub fn set(&mut self, body: CelestialBody, source: impl Into<String>) {
        self.sources[body.unit() as usize] = source.into();
    }

    pub fn source(&self, body: CelestialBody) -> &str {
        &self.sources[body.unit() as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (CelestialBody, &str)> + '_ {
        CelestialBody::ALL
            .into_iter()
            .zip(self.sources.iter().map(String::as_str))
    }
}

impl Default for TextureManifest {
    fn default() -> Self {
        Self::conventional()
    }
}

/// Immutable configuration passed to the windowed renderer at start-up.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Window title; the FPS readout is appended when enabled.
    pub title: String,
    /// Shader text for both stages.
    pub shaders: ShaderSources,
    /// Root directory image identifiers are resolved against.
    pub texture_root: PathBuf,
    /// Image identifier per body.
    pub textures: TextureManifest,
    /// Zoom change per scrolled pixel.
    pub zoom_sensitivity: f32,
    /// Show the smoothed frame rate in the window title.
    pub fps_in_title: bool,
}

impl RendererConfig {
    pub fn new(shaders: ShaderSources) -> Self {
        Self {
            surface_size: (1280, 720),
            title: "Orrery".to_string(),
            shaders,
            texture_root: PathBuf::from("."),
            textures: TextureManifest::conventional(),
            zoom_sensitivity: 0.001,
            fps_in_title: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_units_follow_declaration_order() {
        for (index, body) in CelestialBody::ALL.iter().enumerate() {
            assert_eq!(body.unit() as usize, index);
            assert_eq!(CelestialBody::from_slot(index as u32), Some(*body));
        }
        assert_eq!(CelestialBody::Earth.unit(), 0);
        assert_eq!(CelestialBody::Stars.unit(), 9);
        assert_eq!(CelestialBody::from_slot(10), None);
    }

    #[test]
    fn body_names_round_trip() {
        assert_eq!(CelestialBody::from_name(" Saturn "), Some(CelestialBody::Saturn));
        assert_eq!(CelestialBody::from_name("pluto"), None);
        assert_eq!(CelestialBody::Venus.sampler_uniform(), "u_texture_venus");
    }

    #[test]
    fn conventional_manifest_uses_texture_directory() {
        let mut manifest = TextureManifest::conventional();
        assert_eq!(
            manifest.source(CelestialBody::Mercury),
            "textures/mercury_texture.jpg"
        );
        manifest.set(CelestialBody::Sun, "custom/sun.png");
        assert_eq!(manifest.source(CelestialBody::Sun), "custom/sun.png");
        assert_eq!(manifest.iter().count(), BODY_COUNT);
    }
}
