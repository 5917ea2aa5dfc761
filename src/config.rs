//! Bridge configuration

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the debugger bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Host used when a connect call does not name one
    pub default_host: String,
    /// Remote-debugging port used when a connect call does not name one
    pub default_port: u16,
    /// How long a protocol command may go unanswered
    pub command_timeout: Duration,
    /// Console messages kept per connection before the oldest is evicted
    pub max_console_messages: usize,
    /// Chrome binary for launches (chromiumoxide searches the system otherwise)
    pub chrome_executable: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_host: "localhost".to_string(),
            default_port: 9222,
            command_timeout: Duration::from_secs(10),
            max_console_messages: 1000,
            chrome_executable: None,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            default_host: lookup("CHROME_DEBUGGER_HOST").unwrap_or(defaults.default_host),
            default_port: lookup("CHROME_DEBUGGER_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.default_port),
            command_timeout: lookup("CHROME_DEBUGGER_COMMAND_TIMEOUT_MS")
                .and_then(|ms| ms.parse().ok())
                .map_or(defaults.command_timeout, Duration::from_millis),
            max_console_messages: lookup("CHROME_DEBUGGER_MAX_CONSOLE")
                .and_then(|n| n.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_console_messages),
            chrome_executable: lookup("CHROME_DEBUGGER_CHROME_PATH").map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> BridgeConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        BridgeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_env() {
        let config = config_from(&[]);
        assert_eq!(config.default_host, "localhost");
        assert_eq!(config.default_port, 9222);
        assert_eq!(config.command_timeout, Duration::from_secs(10));
        assert_eq!(config.max_console_messages, 1000);
        assert!(config.chrome_executable.is_none());
    }

    #[test]
    fn test_overrides_from_env() {
        let config = config_from(&[
            ("CHROME_DEBUGGER_PORT", "9300"),
            ("CHROME_DEBUGGER_COMMAND_TIMEOUT_MS", "250"),
            ("CHROME_DEBUGGER_CHROME_PATH", "/opt/chrome"),
        ]);
        assert_eq!(config.default_port, 9300);
        assert_eq!(config.command_timeout, Duration::from_millis(250));
        assert_eq!(config.chrome_executable, Some(PathBuf::from("/opt/chrome")));
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = config_from(&[
            ("CHROME_DEBUGGER_PORT", "not-a-port"),
            ("CHROME_DEBUGGER_MAX_CONSOLE", "0"),
        ]);
        assert_eq!(config.default_port, 9222);
        assert_eq!(config.max_console_messages, 1000);
    }
}
