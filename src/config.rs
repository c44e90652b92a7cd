use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Tunables for the synchronization core.
///
/// Every field has a sensible default, so embedding applications can use
/// `SyncConfig::default()` and never touch a config file.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Quiescence window for debounced preview parameters, in milliseconds.
  /// A fetch fires only after the parameters stop changing for this long.
  #[serde(default = "default_debounce_ms")]
  pub debounce_ms: u64,

  /// How long a cached preview is considered fresh, in seconds.
  #[serde(default = "default_preview_stale_secs")]
  pub preview_stale_secs: u64,
}

fn default_debounce_ms() -> u64 {
  1000
}

fn default_preview_stale_secs() -> u64 {
  300
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      debounce_ms: default_debounce_ms(),
      preview_stale_secs: default_preview_stale_secs(),
    }
  }
}

impl SyncConfig {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (an explicit path that does not exist is
  ///    an error)
  /// 2. ./ledgersync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/ledgersync/config.yaml
  ///
  /// Falls back to `SyncConfig::default()` when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("ledgersync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("ledgersync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: SyncConfig = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_apply_without_a_file() {
    let config = SyncConfig::default();
    assert_eq!(config.debounce_ms, 1000);
    assert_eq!(config.preview_stale_secs, 300);
  }

  #[test]
  fn partial_yaml_fills_in_defaults() {
    let config: SyncConfig = serde_yaml::from_str("debounce_ms: 250").unwrap();
    assert_eq!(config.debounce_ms, 250);
    assert_eq!(config.preview_stale_secs, 300);
  }

  #[test]
  fn missing_explicit_path_is_an_error() {
    let result = SyncConfig::load(Some(Path::new("/nonexistent/ledgersync.yaml")));
    assert!(result.is_err());
  }
}
