//! Storage Layer
//!
//! Per-user directories for downloaded models and configuration.

use anyhow::Result;
use std::path::PathBuf;

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "platereader", "PlateReader")
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let proj_dirs = project_dirs()
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

    let data_dir = proj_dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Get the configuration directory
///
/// Not created on demand: a missing directory just means no config file.
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = project_dirs()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(proj_dirs.config_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_is_project_specific() {
        if let Ok(dir) = get_config_dir() {
            let dir = dir.to_string_lossy().to_lowercase();
            assert!(dir.contains("platereader"));
        }
    }
}
