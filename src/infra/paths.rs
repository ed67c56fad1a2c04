// src/infra/paths.rs — XDG-compliant path management
//
// All paths respect the AUTOPROMO_HOME environment variable for isolation.
// When AUTOPROMO_HOME is set, config and data live under that directory.
// When unset, config uses XDG_CONFIG_HOME/autopromo and data XDG_DATA_HOME/autopromo.

use directories::ProjectDirs;
use std::path::PathBuf;
use std::sync::OnceLock;

static PROJECT_DIRS: OnceLock<Option<ProjectDirs>> = OnceLock::new();

fn project_dirs() -> Option<&'static ProjectDirs> {
    PROJECT_DIRS
        .get_or_init(|| ProjectDirs::from("", "", "autopromo"))
        .as_ref()
}

/// Returns the AUTOPROMO_HOME override, if set.
fn autopromo_home() -> Option<PathBuf> {
    std::env::var_os("AUTOPROMO_HOME").map(PathBuf::from)
}

/// Configuration directory: $AUTOPROMO_HOME/ or XDG_CONFIG_HOME/autopromo
pub fn config_dir() -> PathBuf {
    if let Some(home) = autopromo_home() {
        return home;
    }
    match project_dirs() {
        Some(dirs) => dirs.config_dir().to_path_buf(),
        None => PathBuf::from(".autopromo"),
    }
}

/// Data directory: $AUTOPROMO_HOME/data/ or XDG_DATA_HOME/autopromo
pub fn data_dir() -> PathBuf {
    if let Some(home) = autopromo_home() {
        return home.join("data");
    }
    match project_dirs() {
        Some(dirs) => dirs.data_local_dir().to_path_buf(),
        None => PathBuf::from(".autopromo").join("data"),
    }
}

/// Database path
pub fn db_path() -> PathBuf {
    data_dir().join("autopromo.db")
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Ensure all required directories exist
pub async fn ensure_dirs() -> anyhow::Result<()> {
    for dir in [config_dir(), data_dir()] {
        tokio::fs::create_dir_all(dir).await?;
    }
    Ok(())
}
