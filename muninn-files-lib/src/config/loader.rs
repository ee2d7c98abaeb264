use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{Result, ServeError};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| ServeError::Config(format!("Failed to read config file: {e}")))?;
    let cfg: Config = toml::from_str(&txt)
        .map_err(|e| ServeError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

/// Startup validation. A missing root directory is fatal; everything else
/// has a usable default or is clamped where it is consumed.
pub fn validate_config(cfg: &Config) -> Result<()> {
    if !cfg.root_dir.is_dir() {
        return Err(ServeError::Config(format!(
            "Root directory does not exist: {}",
            cfg.root_dir.display()
        )));
    }

    Ok(())
}
