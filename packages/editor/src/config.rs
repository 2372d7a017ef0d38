use crate::EditorError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "canvas.config.json";

/// Editor configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    /// Records closer than this collapse into one undo step
    pub history_merge_window_ms: i64,

    /// Maximum number of undo steps kept
    pub history_capacity: usize,

    /// Minimum interval between replica pushes
    pub replica_throttle_ms: u64,

    pub presence_geometry_throttle_ms: u64,

    pub presence_focus_throttle_ms: u64,

    /// Cursor chat messages older than this are hidden
    pub chat_lifetime_ms: i64,

    pub viewport: Viewport,

    pub backend: Backend,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// Rendering backend flavor reported to reducers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Dom,
    Canvas,
}

impl EditorConfig {
    /// Load config from a directory
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, EditorError> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(EditorConfig::default())
        }
    }

    pub fn replica_throttle(&self) -> Duration {
        Duration::from_millis(self.replica_throttle_ms)
    }

    pub fn presence_geometry_throttle(&self) -> Duration {
        Duration::from_millis(self.presence_geometry_throttle_ms)
    }

    pub fn presence_focus_throttle(&self) -> Duration {
        Duration::from_millis(self.presence_focus_throttle_ms)
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_merge_window_ms: 300,
            history_capacity: 100,
            replica_throttle_ms: 50,
            presence_geometry_throttle_ms: 30,
            presence_focus_throttle_ms: 100,
            chat_lifetime_ms: 5_000,
            viewport: Viewport {
                width: 1000.0,
                height: 1000.0,
            },
            backend: Backend::Dom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "historyMergeWindowMs": 150,
            "replicaThrottleMs": 20,
            "viewport": { "width": 1280, "height": 720 },
            "backend": "canvas"
        }"#;

        let config: EditorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.history_merge_window_ms, 150);
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.replica_throttle(), Duration::from_millis(20));
        assert_eq!(config.viewport.width, 1280.0);
        assert_eq!(config.backend, Backend::Canvas);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = std::env::temp_dir().join(format!("canvas-config-{}", std::process::id()));
        let config = EditorConfig::load(&dir).unwrap();
        assert_eq!(config, EditorConfig::default());
        assert_eq!(config.history_merge_window_ms, 300);
    }
}
