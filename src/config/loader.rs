// src/config/loader.rs

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Environment variable naming the config file to use instead of
/// `Jobdag.toml`.
pub const CONFIG_ENV: &str = "JOBDAG_CONFIG";

/// Deserialize TOML without semantic checks.
pub fn parse_str(contents: &str) -> Result<RawConfigFile> {
    Ok(toml::from_str(contents)?)
}

/// Read and deserialize a config file. Durations, globs and flag
/// combinations are only checked by [`load_and_validate`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    debug!(path = %path.display(), "reading config");
    let contents = fs::read_to_string(path)?;
    parse_str(&contents)
}

/// Read, deserialize and validate a config file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    ConfigFile::try_from(load_from_path(path)?)
}

/// `$JOBDAG_CONFIG` when set and non-empty, else `Jobdag.toml` in the
/// current directory.
pub fn default_config_path() -> PathBuf {
    match env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from("Jobdag.toml"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_optional() {
        let raw = parse_str("[force]\nall = true\n").unwrap();
        assert!(raw.force.all);
        assert!(raw.priority.rules.is_empty());
        assert_eq!(raw.config.latency_wait, "5s");
    }

    #[test]
    fn unknown_types_fail_to_parse() {
        assert!(parse_str("[config]\nkeep_going = \"yes\"\n").is_err());
    }
}
