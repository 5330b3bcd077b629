// src/config.rs
//
// Engine configuration, loaded from a TOML file with sane defaults. This
// is only the handful of knobs the engine itself needs; façade
// configuration (bind address, allowed origins, ...) lives elsewhere.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SNEP_PUT_CEILING: usize = 1024;
pub const DEFAULT_PRESENCE_CHECK_MS: u64 = 500;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // Resume polling automatically whenever the engine goes idle after a
    // tag/device session ends.
    pub constant_poll: bool,

    pub presence_check_ms: u64,
    pub snep_put_ceiling: usize,

    // If non-empty, only readers whose PC/SC name contains one of these
    // substrings are considered.
    pub reader_name_filter: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            constant_poll: true,
            presence_check_ms: DEFAULT_PRESENCE_CHECK_MS,
            snep_put_ceiling: DEFAULT_SNEP_PUT_CEILING,
            reader_name_filter: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn presence_check_interval(&self) -> Duration {
        Duration::from_millis(self.presence_check_ms)
    }

    // Missing file is not an error: it just means "use defaults".
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[source] std::io::Error),

    #[error("could not parse config file: {0}")]
    Parse(#[source] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert!(cfg.constant_poll);
        assert_eq!(cfg.presence_check_ms, 500);
        assert_eq!(cfg.snep_put_ceiling, 1024);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = EngineConfig::load("/nonexistent/path/does/not/exist.toml").unwrap();
        assert_eq!(cfg.snep_put_ceiling, DEFAULT_SNEP_PUT_CEILING);
    }

    #[test]
    fn parses_partial_overrides() {
        let toml = "constant_poll = false\nsnep_put_ceiling = 2048\n";
        let cfg: EngineConfig = toml::from_str(toml).unwrap();
        assert!(!cfg.constant_poll);
        assert_eq!(cfg.snep_put_ceiling, 2048);
        assert_eq!(cfg.presence_check_ms, DEFAULT_PRESENCE_CHECK_MS);
    }
}
