//! The `orrery.toml` document.
//!
//! Every section is optional. A missing file and an empty file both resolve
//! to [`OrreryConfig::default`].

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "orrery.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrreryConfig {
    pub window: WindowSection,
    pub shaders: ShaderSection,
    pub textures: TextureSection,
    pub input: InputSection,
    pub diagnostics: DiagnosticsSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowSection {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Orrery".to_string(),
        }
    }
}

/// Shader files replacing the built-in stages. Relative paths resolve
/// against the directory holding the config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShaderSection {
    pub vertex: Option<PathBuf>,
    pub fragment: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TextureSection {
    pub root: Option<PathBuf>,
    /// Body name to image path, relative to `root`.
    pub overrides: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputSection {
    pub zoom_sensitivity: f32,
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            zoom_sensitivity: 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiagnosticsSection {
    pub fps_in_title: bool,
}

impl Default for DiagnosticsSection {
    fn default() -> Self {
        Self { fps_in_title: true }
    }
}

impl OrreryConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: OrreryConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let mut config = Self::from_toml_str(&contents)?;
                if let Some(base) = path.parent() {
                    config.resolve_relative_to(base);
                }
                Ok(config)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Anchors relative shader and texture paths at `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        for path in [
            self.shaders.vertex.as_mut(),
            self.shaders.fragment.as_mut(),
            self.textures.root.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        if self.window.title.trim().is_empty() {
            return Err(ConfigError::Invalid("window.title may not be empty".into()));
        }

        let sensitivity = self.input.zoom_sensitivity;
        if !sensitivity.is_finite() || sensitivity <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "input.zoom_sensitivity must be > 0, got {sensitivity}"
            )));
        }

        for (body, path) in &self.textures.overrides {
            if body.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "textures.overrides contains an empty body name".into(),
                ));
            }
            if path.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "textures.overrides.{body} must name an image"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[window]
width = 1920
height = 1080
title = "Solar"

[shaders]
fragment = "shaders/custom.frag"

[textures]
root = "/srv/planets"

[textures.overrides]
earth = "earth_night.png"
stars = "milky_way.jpg"

[input]
zoom_sensitivity = 0.002

[diagnostics]
fps_in_title = false
"#;

    #[test]
    fn parses_sample_config() {
        let config = OrreryConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!((config.window.width, config.window.height), (1920, 1080));
        assert_eq!(config.window.title, "Solar");
        assert_eq!(config.shaders.vertex, None);
        assert_eq!(
            config.shaders.fragment.as_deref(),
            Some(Path::new("shaders/custom.frag"))
        );
        assert_eq!(
            config.textures.overrides.get("earth").map(String::as_str),
            Some("earth_night.png")
        );
        assert_eq!(config.input.zoom_sensitivity, 0.002);
        assert!(!config.diagnostics.fps_in_title);
    }

    #[test]
    fn empty_document_is_default() {
        let config = OrreryConfig::from_toml_str("").expect("empty config");
        assert_eq!(config, OrreryConfig::default());
        assert_eq!(config.window.width, 1280);
        assert!(config.diagnostics.fps_in_title);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = OrreryConfig::from_toml_str("[window]\nwidth = 800\n").unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.window.title, "Orrery");
    }

    #[test]
    fn rejects_zero_window() {
        let err = OrreryConfig::from_toml_str("[window]\nheight = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_non_positive_sensitivity() {
        let err = OrreryConfig::from_toml_str("[input]\nzoom_sensitivity = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = OrreryConfig::from_toml_str("[window]\nfullscreen = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = OrreryConfig::load_or_default(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config, OrreryConfig::default());
    }

    #[test]
    fn relative_paths_follow_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "[shaders]\nvertex = \"quad.vert\"\n[textures]\nroot = \"/abs/textures\"\n",
        )
        .unwrap();

        let config = OrreryConfig::load_or_default(&path).unwrap();
        assert_eq!(config.shaders.vertex, Some(dir.path().join("quad.vert")));
        assert_eq!(config.textures.root, Some(PathBuf::from("/abs/textures")));
    }
}
