//! Engine configuration
//!
//! ```toml
//! ingest_capacity = 65536
//! event_capacity = 65536
//! day_wrap_window = 5
//! dedupe_refresh_requests = true
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound of the processor's frame queue.
    pub ingest_capacity: usize,
    /// Bound of the FeedEvent queue. Events past it are dropped and counted.
    pub event_capacity: usize,
    /// A day code more than this many days behind the combined session's
    /// is read as the calendar wrapping into the next month.
    pub day_wrap_window: u8,
    /// Ask for a snapshot once per unknown symbol instead of once per update.
    pub dedupe_refresh_requests: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            ingest_capacity: 65_536,
            event_capacity: 65_536,
            day_wrap_window: 5,
            dedupe_refresh_requests: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest_capacity == 0 {
            return Err(ConfigError::Zero("ingest_capacity"));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Zero("event_capacity"));
        }
        if self.day_wrap_window == 0 {
            return Err(ConfigError::Zero("day_wrap_window"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config = EngineConfig::from_toml_str("event_capacity = 16").unwrap();
        assert_eq!(config.event_capacity, 16);
        assert_eq!(config.ingest_capacity, 65_536);
        assert_eq!(config.day_wrap_window, 5);
        assert!(config.dedupe_refresh_requests);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        assert!(matches!(
            EngineConfig::from_toml_str("ingest_capacity = 0"),
            Err(ConfigError::Zero("ingest_capacity"))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("day_wrap_window = \"five\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dedupe_refresh_requests = false").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert!(!config.dedupe_refresh_requests);

        let missing = EngineConfig::load("/nonexistent/ddf.toml");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
