// src/infra/paths.rs — XDG-compliant path management
//
// All paths respect the NEXUS_ECHO_HOME environment variable for isolation.
// When NEXUS_ECHO_HOME is set, config and data live under that directory.
// When unset, config uses the platform config dir and data uses XDG_DATA_HOME.

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "nexus-echo")
}

/// Returns the NEXUS_ECHO_HOME override, if set.
fn echo_home() -> Option<PathBuf> {
    std::env::var_os("NEXUS_ECHO_HOME").map(PathBuf::from)
}

/// Configuration directory: $NEXUS_ECHO_HOME/ or ~/.config/nexus-echo/
pub fn config_dir() -> PathBuf {
    if let Some(home) = echo_home() {
        return home;
    }
    project_dirs()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".nexus-echo"))
}

/// Data directory: $NEXUS_ECHO_HOME/data/ or ~/.local/share/nexus-echo/
pub fn data_dir() -> PathBuf {
    if let Some(home) = echo_home() {
        return home.join("data");
    }
    project_dirs()
        .map(|d| d.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".nexus-echo").join("data"))
}

/// Database path for the key-value state store
pub fn db_path() -> PathBuf {
    data_dir().join("echo.db")
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Ensure config and data directories exist
pub fn ensure_dirs() -> std::io::Result<()> {
    for dir in [config_dir(), data_dir()] {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_path_under_data_dir() {
        let db = db_path();
        assert!(db.starts_with(data_dir()));
        assert_eq!(db.file_name().unwrap(), "echo.db");
    }

    #[test]
    fn test_config_file_name() {
        assert_eq!(config_file_path().file_name().unwrap(), "config.toml");
    }
}
