//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [backend] section
    if let Some(section) = ini.section(Some("backend")) {
        if let Some(v) = section.get("base_url") {
            let v = v.trim();
            if !v.starts_with("http://") && !v.starts_with("https://") {
                return Err(invalid(
                    "backend",
                    "base_url",
                    v,
                    "must start with http:// or https://",
                ));
            }
            config.backend.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = section.get("api_prefix") {
            config.backend.api_prefix = v.trim().to_string();
        }
        if let Some(v) = positive::<u64>(section, "backend", "timeout_secs")? {
            config.backend.timeout_secs = v;
        }
    }

    // [scheduler] section
    if let Some(section) = ini.section(Some("scheduler")) {
        if let Some(v) = positive::<usize>(section, "scheduler", "max_concurrency")? {
            config.scheduler.max_concurrency = v;
        }
        if let Some(v) = millis(section, "scheduler", "dispatch_delay_ms")? {
            config.scheduler.dispatch_delay = v;
        }
    }

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = millis(section, "cache", "dedup_window_ms")? {
            config.cache.dedup_window = v;
        }
        if let Some(v) = positive::<usize>(section, "cache", "max_entries")? {
            config.cache.max_entries = v;
        }
    }

    // [retry] section
    if let Some(section) = ini.section(Some("retry")) {
        if let Some(v) = section.get("max_attempts") {
            config.retry.max_attempts = v.trim().parse().map_err(|_| {
                invalid(
                    "retry",
                    "max_attempts",
                    v,
                    "must be a non-negative integer",
                )
            })?;
        }
        if let Some(v) = millis(section, "retry", "base_delay_ms")? {
            config.retry.base_delay = v;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if v.is_empty() || v.contains('/') {
                return Err(invalid(
                    "logging",
                    "file",
                    v,
                    "must be a plain file name",
                ));
            }
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Reads an integer key that must be at least 1.
fn positive<T>(section: &Properties, name: &str, key: &str) -> Result<Option<T>, ConfigFileError>
where
    T: FromStr + PartialOrd + From<u8>,
{
    let Some(v) = section.get(key) else {
        return Ok(None);
    };
    match v.trim().parse::<T>() {
        Ok(parsed) if parsed >= T::from(1) => Ok(Some(parsed)),
        _ => Err(invalid(name, key, v, "must be a positive integer")),
    }
}

/// Reads a millisecond duration key.
fn millis(section: &Properties, name: &str, key: &str) -> Result<Option<Duration>, ConfigFileError> {
    let Some(v) = section.get(key) else {
        return Ok(None);
    };
    v.trim()
        .parse::<u64>()
        .map(|ms| Some(Duration::from_millis(ms)))
        .map_err(|_| invalid(name, key, v, "must be a non-negative integer (milliseconds)"))
}

/// Expand `~` at the start of a path to the home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
