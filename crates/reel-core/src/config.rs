//! Engine configuration
//!
//! Settings the engine needs when assembling chains: which modules fill
//! the pluggable slots (UI notifier, default output, capture input) and
//! whether to report per-stage processing time. The configuration-file
//! *format* and discovery live with the application; this module only
//! provides tolerant YAML load/save for the engine's own section.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Chain-assembly and diagnostics settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// UI notifier module inserted into playback/convert chains
    /// (e.g. `"tui.progress"`); none when running headless
    pub ui_module: Option<String>,
    /// Output module used when a track has no explicit "output" target
    /// (e.g. `"audio.alsa"`)
    pub default_output: Option<String>,
    /// Capture module for record tracks (e.g. `"audio.alsa-in"`)
    pub capture_module: Option<String>,
    /// Log a per-stage processing-time report when a track closes
    pub print_time: bool,
}

/// Load an engine config from a YAML file.
///
/// A missing file yields the defaults; a malformed file logs a warning
/// and yields the defaults.
pub fn load_config(path: &Path) -> EngineConfig {
    if !path.exists() {
        log::info!("load_config: {:?} doesn't exist, using defaults", path);
        return EngineConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("load_config: failed to parse {:?}: {}, using defaults", path, e);
                EngineConfig::default()
            }
        },
        Err(e) => {
            log::warn!("load_config: failed to read {:?}: {}, using defaults", path, e);
            EngineConfig::default()
        }
    }
}

/// Save an engine config as YAML, creating parent directories
pub fn save_config(config: &EngineConfig, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, yaml)
}
