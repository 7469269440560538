use std::path::{Path, PathBuf};

use roster_ingest::IngestConfig;

use crate::CliError;

const CONFIG_DIR: &str = "roster";
const CONFIG_FILE: &str = "roster.toml";

/// Per-user config location, `<config_dir>/roster/roster.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Explicit path (flag or `$ROSTER_CONFIG`) first, then the per-user file if
/// it exists, else built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<IngestConfig, CliError> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match default_config_path().filter(|p| p.is_file()) {
            Some(p) => p,
            None => {
                tracing::debug!("no config file, using defaults");
                return Ok(IngestConfig::default());
            }
        },
    };

    let text = std::fs::read_to_string(&path)
        .map_err(|e| CliError::args(format!("cannot read config {}: {}", path.display(), e)))?;
    let config = IngestConfig::from_toml(&text).map_err(|e| {
        CliError::args(format!("{}: {}", path.display(), e))
            .with_hint("see `roster --help` for the config keys")
    })?;
    tracing::info!(path = %path.display(), "loaded config");
    Ok(config)
}
