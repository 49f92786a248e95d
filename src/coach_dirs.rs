//! Centralized application directory paths for fitcoach.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! # Environment Overrides
//!
//! - `FITCOACH_DATA_DIR`: overrides [`data_dir`]
//! - `FITCOACH_CONFIG_DIR`: overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory (logs and other runtime output).
///
/// Resolves to `dirs::data_dir()/fitcoach/` by default.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("FITCOACH_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("fitcoach"))
        .unwrap_or_else(|| PathBuf::from("/tmp/fitcoach-data"))
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/fitcoach/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("FITCOACH_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("fitcoach"))
        .unwrap_or_else(|| PathBuf::from("/tmp/fitcoach-config"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_dir_is_under_data_dir() {
        assert!(logs_dir().starts_with(data_dir()));
        assert!(logs_dir().ends_with("logs"));
    }

    #[test]
    fn config_dir_is_absolute_or_tmp_fallback() {
        let dir = config_dir();
        assert!(!dir.as_os_str().is_empty());
    }
}
