//! Service configuration loaded from TOML.
//!
//! Every section and field is optional; see `ServiceConfig` and its parts for defaults.
//! The file location comes from GRADEBRIDGE_CONFIG_PATH.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ServiceConfig {
  #[serde(default)]
  pub storage: StorageCfg,
  #[serde(default)]
  pub autosave: AutosaveCfg,
  #[serde(default)]
  pub export: ExportCfg,
  #[serde(default)]
  pub page: PageGeometry,
}

/// Where the scoped store lives and which keys it uses.
/// An empty `path` keeps everything in memory.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageCfg {
  pub path: String,
  pub session_key: String,
  pub privacy_key: String,
  pub export_notice_key: String,
}

impl Default for StorageCfg {
  fn default() -> Self {
    Self {
      path: "./gradebridge-data/store.json".into(),
      session_key: "gradebridge_session".into(),
      privacy_key: "gradebridge_privacy_ack".into(),
      export_notice_key: "gradebridge_export_notice".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AutosaveCfg {
  pub debounce_ms: u64,
}

impl Default for AutosaveCfg {
  fn default() -> Self {
    Self { debounce_ms: 1000 }
  }
}

impl AutosaveCfg {
  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ExportCfg {
  /// When non-empty, exported backups and documents are also written here.
  pub dir: String,
  pub renderer_timeout_secs: u64,
}

impl Default for ExportCfg {
  fn default() -> Self {
    Self { dir: String::new(), renderer_timeout_secs: 60 }
  }
}

impl ExportCfg {
  pub fn out_dir(&self) -> Option<PathBuf> {
    if self.dir.trim().is_empty() { None } else { Some(PathBuf::from(&self.dir)) }
  }
}

/// Physical sheet handed to the renderer with every job: one page per sheet.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PageGeometry {
  pub format: String,
  pub orientation: String,
  pub width_mm: f64,
  pub height_mm: f64,
  pub margin_mm: f64,
  pub scale: f64,
}

impl Default for PageGeometry {
  fn default() -> Self {
    Self {
      format: "a4".into(),
      orientation: "portrait".into(),
      width_mm: 210.0,
      height_mm: 297.0,
      margin_mm: 0.0,
      scale: 2.0,
    }
  }
}

pub fn parse_config(s: &str) -> Result<ServiceConfig, toml::de::Error> {
  toml::from_str::<ServiceConfig>(s)
}

/// Load from GRADEBRIDGE_CONFIG_PATH. Missing variable, unreadable file or bad TOML all yield defaults.
pub fn load_config_from_env() -> ServiceConfig {
  let Ok(path) = std::env::var("GRADEBRIDGE_CONFIG_PATH") else {
    return ServiceConfig::default();
  };
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_config(&s) {
      Ok(cfg) => {
        info!(target: "gradebridge", %path, "Loaded service config (TOML)");
        cfg
      }
      Err(e) => {
        error!(target: "gradebridge", %path, error = %e, "Failed to parse TOML config; using defaults");
        ServiceConfig::default()
      }
    },
    Err(e) => {
      error!(target: "gradebridge", %path, error = %e, "Failed to read TOML config file; using defaults");
      ServiceConfig::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_file_keeps_other_defaults() {
    let cfg = parse_config(
      r#"
      [autosave]
      debounce_ms = 250
      [page]
      format = "letter"
      width_mm = 215.9
      height_mm = 279.4
      "#,
    )
    .unwrap();
    assert_eq!(cfg.autosave.debounce(), Duration::from_millis(250));
    assert_eq!(cfg.page.format, "letter");
    assert_eq!(cfg.page.margin_mm, 0.0);
    assert_eq!(cfg.storage.session_key, "gradebridge_session");
    assert!(cfg.export.out_dir().is_none());
  }

  #[test]
  fn empty_file_is_all_defaults() {
    let cfg = parse_config("").unwrap();
    assert_eq!(cfg.page, PageGeometry::default());
    assert_eq!(cfg.autosave.debounce_ms, 1000);
  }
}
