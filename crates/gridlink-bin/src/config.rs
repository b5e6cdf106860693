// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Boot configuration.
//!
//! A single JSON file declares which plugin modules to register and which
//! restored nodes to start automatically. Per-node settings are opaque
//! strings owned by the plugins; the boot file never interprets them.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BinError, BinResult};

/// The top-level boot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootConfig {
    /// Plugin module names to register at boot.
    #[serde(default = "default_plugins")]
    pub plugins: Vec<String>,

    /// Node names to start once restore finished.
    #[serde(default)]
    pub autostart: Vec<String>,
}

fn default_plugins() -> Vec<String> {
    vec!["modbus".to_string(), "mqtt".to_string()]
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            plugins: default_plugins(),
            autostart: Vec::new(),
        }
    }
}

impl BootConfig {
    /// Loads the configuration file; a missing file yields the defaults.
    pub fn load(path: &Path) -> BinResult<BootConfig> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(BootConfig::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| BinError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: BootConfig = serde_json::from_str(&raw).map_err(|e| BinError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> BinResult<()> {
        if self.plugins.is_empty() {
            return Err(BinError::Config {
                path: path.to_path_buf(),
                message: "plugin list must not be empty".to_string(),
            });
        }
        if self.plugins.iter().any(|p| p.is_empty()) {
            return Err(BinError::Config {
                path: path.to_path_buf(),
                message: "plugin names must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = BootConfig::load(Path::new("/definitely/not/there.json")).unwrap();
        assert_eq!(config, BootConfig::default());
        assert!(config.plugins.contains(&"modbus".to_string()));
    }

    #[test]
    fn test_load_and_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gridlink.json");
        std::fs::write(
            &path,
            r#"{"plugins": ["modbus"], "autostart": ["d1", "a1"]}"#,
        )
        .unwrap();

        let config = BootConfig::load(&path).unwrap();
        assert_eq!(config.plugins, vec!["modbus"]);
        assert_eq!(config.autostart, vec!["d1", "a1"]);
    }

    #[test]
    fn test_empty_plugin_list_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gridlink.json");
        std::fs::write(&path, r#"{"plugins": []}"#).unwrap();
        assert!(BootConfig::load(&path).is_err());
    }

    #[test]
    fn test_malformed_json_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gridlink.json");
        std::fs::write(&path, "{nope").unwrap();
        assert!(BootConfig::load(&path).is_err());
    }
}
