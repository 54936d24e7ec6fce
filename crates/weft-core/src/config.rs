use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WeftError};

/// Top-level Weft configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeftConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Graph execution engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of ready nodes executed concurrently.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Maximum nesting of loop/subworkflow sub-graph execution.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Capacity of the workflow event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_depth: default_max_depth(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_max_concurrency() -> usize { 8 }
fn default_max_depth() -> usize { 16 }
fn default_event_capacity() -> usize { 256 }

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String { "weft=info,warn".to_string() }

impl WeftConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| WeftError::ConfigNotFound(path.display().to_string()))?;
        debug!(path = %path.display(), "Loading config");
        Self::parse(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: WeftConfig =
            toml::from_str(&expanded).map_err(|e| WeftError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.engine.max_concurrency == 0 {
            return Err(WeftError::Config("engine.max_concurrency must be at least 1".into()));
        }
        if self.engine.event_capacity == 0 {
            return Err(WeftError::Config("engine.event_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Leave the placeholder if the var is unset
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = WeftConfig::parse("").unwrap();
        assert_eq!(config.engine.max_concurrency, 8);
        assert_eq!(config.engine.max_depth, 16);
        assert_eq!(config.log.filter, "weft=info,warn");
    }

    #[test]
    fn test_partial_engine_section() {
        let config = WeftConfig::parse("[engine]\nmax_depth = 3\n").unwrap();
        assert_eq!(config.engine.max_depth, 3);
        assert_eq!(config.engine.max_concurrency, 8);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = WeftConfig::parse("[engine]\nmax_concurrency = 0\n").unwrap_err();
        assert!(matches!(err, WeftError::Config(_)));
    }

    #[test]
    fn test_expand_env_vars_keeps_unknown() {
        assert_eq!(
            expand_env_vars("a = \"${WEFT_SURELY_UNSET_VAR}\""),
            "a = \"${WEFT_SURELY_UNSET_VAR}\""
        );
    }

    #[test]
    fn test_missing_file() {
        let err = WeftConfig::load(Path::new("/nonexistent/weft.toml")).unwrap_err();
        assert!(matches!(err, WeftError::ConfigNotFound(_)));
    }
}
