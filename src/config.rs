use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::bot::message_log::DEFAULT_CAPACITY;
use crate::bot::unsend::DEFAULT_TEMPLATE;
use crate::rules::{Rules, RulesConfig};

/// Environment variables that take precedence over the config file.
pub const ENV_ACCESS_TOKEN: &str = "LINE_CHANNEL_ACCESS_TOKEN";
pub const ENV_CHANNEL_SECRET: &str = "LINE_CHANNEL_SECRET";
pub const ENV_LISTEN_ADDR: &str = "RECALLBOT_LISTEN_ADDR";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// A keyword compiled to an invalid regex.
    InvalidRegex { keyword: String, source: regex::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::InvalidRegex { keyword, source } => {
                write!(f, "invalid pattern for keyword '{}': {}", keyword, source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::InvalidRegex { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    channel_access_token: String,
    #[serde(default)]
    channel_secret: String,
    #[serde(default = "default_listen_addr")]
    listen_addr: String,
    /// Directory for the message log database and log files. Defaults to current directory.
    data_dir: Option<String>,
    #[serde(default = "default_capacity")]
    message_log_capacity: usize,
    /// Keep the message log in SQLite under data_dir. When false it lives in memory.
    #[serde(default = "default_true")]
    persist_message_log: bool,
    /// Send replies and pushes silently.
    #[serde(default)]
    notification_disabled: bool,
    #[serde(default = "default_unsend_template")]
    unsend_template: String,
    #[serde(default)]
    rules: RulesConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:10000".to_string()
}

fn default_true() -> bool {
    true
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_unsend_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

pub struct Config {
    pub channel_access_token: String,
    pub channel_secret: String,
    pub listen_addr: SocketAddr,
    /// Directory for state files (database, logs).
    pub data_dir: PathBuf,
    pub message_log_capacity: usize,
    pub persist_message_log: bool,
    pub notification_disabled: bool,
    pub unsend_template: String,
    pub rules: Rules,
}

impl Config {
    /// Load from `path`, letting the process environment override credentials.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    fn load_with_env<P, F>(path: P, env: F) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let mut file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        if let Some(token) = lookup(ENV_ACCESS_TOKEN) {
            file.channel_access_token = token;
        }
        if let Some(secret) = lookup(ENV_CHANNEL_SECRET) {
            file.channel_secret = secret;
        }
        if let Some(addr) = lookup(ENV_LISTEN_ADDR) {
            file.listen_addr = addr;
        }

        // Validate required fields
        if file.channel_access_token.is_empty() {
            return Err(ConfigError::Validation(format!(
                "channel_access_token is required (or set {ENV_ACCESS_TOKEN})"
            )));
        }
        if file.channel_secret.is_empty() {
            return Err(ConfigError::Validation(format!(
                "channel_secret is required (or set {ENV_CHANNEL_SECRET})"
            )));
        }
        if file.message_log_capacity == 0 {
            return Err(ConfigError::Validation("message_log_capacity must be at least 1".into()));
        }
        if !file.unsend_template.contains("{text}") {
            return Err(ConfigError::Validation("unsend_template must contain {text}".into()));
        }

        let listen_addr: SocketAddr = file.listen_addr.parse().map_err(|_| {
            ConfigError::Validation(format!("listen_addr '{}' is not a socket address", file.listen_addr))
        })?;

        let rules = &file.rules;
        if let Some(k) = rules.fuzzy_keywords.iter().chain(&rules.keywords).find(|k| k.keyword.is_empty()) {
            return Err(ConfigError::Validation(format!(
                "empty keyword (reply '{}') would match every message",
                k.reply
            )));
        }
        if rules.special_sender.as_ref().is_some_and(|s| s.user_id.is_empty()) {
            return Err(ConfigError::Validation("special_sender.user_id must not be empty".into()));
        }
        let rules = Rules::compile(rules).map_err(|e| ConfigError::InvalidRegex {
            keyword: e.keyword,
            source: e.source,
        })?;

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            channel_access_token: file.channel_access_token,
            channel_secret: file.channel_secret,
            listen_addr,
            data_dir,
            message_log_capacity: file.message_log_capacity,
            persist_message_log: file.persist_message_log,
            notification_disabled: file.notification_disabled,
            unsend_template: file.unsend_template,
            rules,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("message_log.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Inbound;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn load(file: &NamedTempFile, env: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> =
            env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::load_with_env(file.path(), |key| env.get(key).cloned())
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_valid_config() {
        let file = write_config(r#"{
            "channel_access_token": "token",
            "channel_secret": "secret"
        }"#);
        let config = load(&file, &[]).expect("should load valid config");
        assert_eq!(config.message_log_capacity, 500);
        assert_eq!(config.listen_addr, "0.0.0.0:10000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.database_path(), PathBuf::from("./message_log.db"));
        assert!(!config.notification_disabled);
        assert!(config.persist_message_log);
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_rules_are_compiled() {
        let file = write_config(r#"{
            "channel_access_token": "token",
            "channel_secret": "secret",
            "rules": {
                "fuzzy_keywords": [{"keyword": "AB", "reply": "found"}]
            }
        }"#);
        let config = load(&file, &[]).unwrap();
        let reply = config.rules.decide(Inbound {
            sender_id: Some("U1"),
            text: "A--B",
            mentionees: &[],
        });
        assert_eq!(reply.as_deref(), Some("found"));
    }

    #[test]
    fn test_env_overrides_credentials() {
        let file = write_config(r#"{
            "channel_access_token": "file-token",
            "channel_secret": "",
            "listen_addr": "127.0.0.1:8000"
        }"#);
        let config = load(
            &file,
            &[
                (ENV_CHANNEL_SECRET, "env-secret"),
                (ENV_LISTEN_ADDR, "127.0.0.1:9000"),
                (ENV_ACCESS_TOKEN, "  "),
            ],
        )
        .unwrap();
        assert_eq!(config.channel_secret, "env-secret");
        assert_eq!(config.channel_access_token, "file-token");
        assert_eq!(config.listen_addr.port(), 9000);
    }

    #[test]
    fn test_missing_secret() {
        let file = write_config(r#"{"channel_access_token": "token"}"#);
        let err = assert_err(load(&file, &[]));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("channel_secret"));
    }

    #[test]
    fn test_missing_token() {
        let file = write_config(r#"{"channel_secret": "secret"}"#);
        let err = assert_err(load(&file, &[]));
        assert!(err.to_string().contains("channel_access_token"));
    }

    #[test]
    fn test_zero_capacity() {
        let file = write_config(r#"{
            "channel_access_token": "t", "channel_secret": "s", "message_log_capacity": 0
        }"#);
        let err = assert_err(load(&file, &[]));
        assert!(err.to_string().contains("message_log_capacity"));
    }

    #[test]
    fn test_template_without_placeholder() {
        let file = write_config(r#"{
            "channel_access_token": "t", "channel_secret": "s", "unsend_template": "gone"
        }"#);
        let err = assert_err(load(&file, &[]));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_empty_keyword() {
        let file = write_config(r#"{
            "channel_access_token": "t", "channel_secret": "s",
            "rules": {"keywords": [{"keyword": "", "reply": "always"}]}
        }"#);
        let err = assert_err(load(&file, &[]));
        assert!(err.to_string().contains("always"));
    }

    #[test]
    fn test_bad_listen_addr() {
        let file = write_config(r#"{
            "channel_access_token": "t", "channel_secret": "s", "listen_addr": "localhost"
        }"#);
        let err = assert_err(load(&file, &[]));
        assert!(err.to_string().contains("listen_addr"));
    }

    #[test]
    fn test_invalid_regex_names_keyword() {
        let err = ConfigError::InvalidRegex {
            keyword: "早安".to_string(),
            source: regex::Regex::new("(").unwrap_err(),
        };
        assert!(err.to_string().contains("'早安'"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load("/nonexistent/path/config.json"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(load(&file, &[]));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
