//! Application settings

use std::path::{Path, PathBuf};

use busview_sim::{SimulationConfig, TimingMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::SessionArgs;
use crate::traffic_view::ExportSettings;

/// Errors while persisting settings
#[derive(Debug, Error)]
pub enum SettingsError {
    /// No home or config directory could be determined
    #[error("could not determine settings path")]
    NoPath,

    /// Filesystem failure
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed settings file
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization failure
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Synthesizer configuration
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Export options
    #[serde(default)]
    pub export: ExportSettings,
    /// Ticks synthesized by `busview run` when no count is given
    #[serde(default = "default_ticks")]
    pub default_ticks: usize,
    /// Messages printed by the console `messages` command
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

fn default_ticks() -> usize {
    1000
}

fn default_list_limit() -> usize {
    20
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            export: ExportSettings::default(),
            default_ticks: default_ticks(),
            list_limit: default_list_limit(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for busview
    /// Uses $XDG_CONFIG_HOME/busview on Linux/macOS, falls back to ~/.config/busview
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("busview"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("busview"))
    }

    /// Default settings file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from `path`, or the default location
    ///
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(SettingsError::Io { path, source }),
        };

        serde_json::from_str(&text).map_err(|source| SettingsError::Parse { path, source })
    }

    /// Save settings to `path`, or the default location
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, SettingsError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path().ok_or(SettingsError::NoPath)?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }

    /// Apply command-line overrides to the simulation configuration
    pub fn apply_session_args(&mut self, args: &SessionArgs) {
        if let Some(seed) = args.seed {
            self.simulation.seed = Some(seed);
        }
        if args.no_default_nodes {
            self.simulation.seed_default_nodes = false;
        }
        if args.jitter {
            self.simulation.timing = TimingMode::JitterPerTick;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.simulation.seed = Some(77);
        settings.list_limit = 5;
        let written = settings.save(Some(&path)).unwrap();
        assert_eq!(written, path);

        assert_eq!(Settings::load(Some(&path)).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "simulation": { "message_capacity": 50 } }"#).unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.simulation.message_capacity, 50);
        assert_eq!(settings.simulation.data_point_capacity, 300);
        assert_eq!(settings.default_ticks, 1000);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_session_overrides() {
        let mut settings = Settings::default();
        settings.apply_session_args(&SessionArgs {
            seed: Some(3),
            no_default_nodes: true,
            jitter: true,
        });
        assert_eq!(settings.simulation.seed, Some(3));
        assert!(!settings.simulation.seed_default_nodes);
        assert_eq!(settings.simulation.timing, TimingMode::JitterPerTick);
    }
}
