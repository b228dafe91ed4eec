//! Application Configuration
//!
//! Reader settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::plate::PlateFormat;
use crate::vision::OcrSettings;

/// Default configuration file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// OCR provider settings
    pub ocr: OcrSettings,
    /// Plate selection settings
    pub plate: PlateFormat,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Path of the default configuration file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(crate::storage::get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load an explicit config file, or the default one if it exists
///
/// An explicit path must exist and parse. A missing default file yields
/// the defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        return load_config(path);
    }

    let default_path = match default_config_path() {
        Ok(path) => path,
        Err(e) => {
            debug!("No config directory ({}), using defaults", e);
            return Ok(AppConfig::default());
        }
    };

    if default_path.is_file() {
        debug!("Loading config from {}", default_path.display());
        load_config(&default_path)
    } else {
        Ok(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plate::SelectionPolicy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();
        assert_eq!(config.ocr, OcrSettings::default());
        assert_eq!(config.plate, PlateFormat::default());
        assert_eq!(config.plate.policy, SelectionPolicy::ScanOrder);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.ocr.models_dir = Some(PathBuf::from("/opt/models"));
        config.ocr.use_gpu = true;
        config.plate.policy = SelectionPolicy::BestScore;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [ocr]
            offline = true

            [plate]
            policy = "best_score"
            "#,
        )
        .unwrap();

        assert!(parsed.ocr.offline);
        assert_eq!(parsed.ocr.det_limit_side_len, 960);
        assert_eq!(parsed.plate.policy, SelectionPolicy::BestScore);
        assert_eq!(parsed.plate.exact_len, 10);
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.ocr.min_confidence = 0.25;

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();

        let loaded = load_config(temp_file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml [[[").unwrap();

        let err = load_config(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_or_default_explicit_path_must_exist() {
        assert!(load_or_default(Some(Path::new("/nonexistent/plate.toml"))).is_err());
    }

    #[test]
    fn test_load_or_default_explicit_path() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[plate]\nmin_len = 7").unwrap();

        let config = load_or_default(Some(temp_file.path())).unwrap();
        assert_eq!(config.plate.min_len, 7);
    }
}
