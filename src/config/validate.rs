// src/config/validate.rs

use std::time::Duration;

use globset::Glob;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{JobdagError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::JobdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let latency_wait = validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.config,
            raw.force,
            raw.priority,
            latency_wait,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<Duration> {
    let latency_wait = parse_duration(&cfg.config.latency_wait).map_err(|e| {
        JobdagError::ConfigError(format!("[config].latency_wait: {e}"))
    })?;
    validate_incomplete_flags(cfg)?;
    validate_names("[force].rules", &cfg.force.rules)?;
    validate_names("[priority].rules", &cfg.priority.rules)?;
    validate_globs("[force].artifacts", &cfg.force.artifacts)?;
    validate_globs("[priority].artifacts", &cfg.priority.artifacts)?;
    Ok(latency_wait)
}

fn validate_incomplete_flags(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.force_incomplete && cfg.config.ignore_incomplete {
        return Err(JobdagError::ConfigError(
            "[config].force_incomplete and [config].ignore_incomplete are mutually exclusive"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_names(section: &str, names: &[String]) -> Result<()> {
    if names.iter().any(|n| n.trim().is_empty()) {
        return Err(JobdagError::ConfigError(format!(
            "{section} must not contain empty rule names"
        )));
    }
    Ok(())
}

fn validate_globs(section: &str, patterns: &[String]) -> Result<()> {
    for pattern in patterns {
        Glob::new(pattern).map_err(|e| {
            JobdagError::ConfigError(format!("{section}: invalid glob '{pattern}': {e}"))
        })?;
    }
    Ok(())
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration(" 2m "), Ok(Duration::from_secs(120)));
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn rejects_conflicting_incomplete_flags() {
        let raw: RawConfigFile = toml::from_str(
            r#"
            [config]
            force_incomplete = true
            ignore_incomplete = true
            "#,
        )
        .unwrap();
        assert!(matches!(
            ConfigFile::try_from(raw),
            Err(JobdagError::ConfigError(_))
        ));
    }

    #[test]
    fn rejects_bad_glob() {
        let raw: RawConfigFile = toml::from_str(
            r#"
            [priority]
            artifacts = ["results/["]
            "#,
        )
        .unwrap();
        let err = ConfigFile::try_from(raw).unwrap_err();
        assert!(err.to_string().contains("[priority].artifacts"));
    }
}
