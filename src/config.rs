//! Configuration management for the API gate.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::error::{GateError, Result};
use crate::ratelimit::RateConfig;

/// Prefix for structured environment overrides, e.g. `APIGATE__SERVER__PORT`.
const ENV_PREFIX: &str = "APIGATE";
const ENV_SEPARATOR: &str = "__";

/// Main configuration for the gate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// The socket address to listen on.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    5000
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Admissions allowed per rolling 60-second window
    #[serde(default = "default_limit")]
    pub limit_per_window: u32,

    /// Minimum spacing between admissions in milliseconds.
    /// Derived from the limit when unset.
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limit_per_window: default_limit(),
            base_delay_ms: None,
        }
    }
}

fn default_limit() -> u32 {
    500
}

/// Authentication configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared token expected in the `Authorization` header
    #[serde(default)]
    pub token: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GateConfig {
    /// Load configuration from a YAML file on its own.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| GateError::Config(e.to_string()))
    }

    /// Load layered configuration from the process environment.
    ///
    /// Sources, lowest precedence first: defaults, the YAML file at `path`
    /// (or the optional default file), `APIGATE__*` variables, then the plain
    /// `RATE_LIMIT`, `PORT` and `AUTH_TOKEN` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Load layered configuration, reading variables from `env` instead of
    /// the process environment when given.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => builder = builder.add_source(File::from(path).required(true)),
            None => {
                if let Some(default_path) = default_config_path(env.as_ref()) {
                    builder = builder.add_source(File::from(default_path).required(false));
                }
            }
        }

        let lookup = |name: &str| -> Option<String> {
            let value = match &env {
                Some(vars) => vars.get(name).cloned(),
                None => std::env::var(name).ok(),
            };
            value.filter(|v| !v.is_empty())
        };

        let rate_limit = lookup("RATE_LIMIT")
            .map(|raw| parse_env::<u32>("RATE_LIMIT", &raw).map(i64::from))
            .transpose()?;
        let port = lookup("PORT")
            .map(|raw| parse_env::<u16>("PORT", &raw).map(i64::from))
            .transpose()?;
        let token = lookup("AUTH_TOKEN");

        builder = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(env),
            )
            .set_override_option("rate_limiting.limit_per_window", rate_limit)?
            .set_override_option("server.port", port)?
            .set_override_option("auth.token", token)?;

        let config: GateConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Check that the configuration can start a server.
    pub fn validate(&self) -> Result<()> {
        match self.auth.token.as_deref() {
            Some(token) if !token.trim().is_empty() => {}
            _ => {
                return Err(GateError::Config(
                    "an auth token is required (set AUTH_TOKEN or auth.token)".to_string(),
                ))
            }
        }

        self.rate_config()?;
        Ok(())
    }

    /// The initial admission budget.
    pub fn rate_config(&self) -> Result<RateConfig> {
        let limiting = &self.rate_limiting;
        let config = match limiting.base_delay_ms {
            Some(delay) => RateConfig::new(limiting.limit_per_window, delay),
            None => RateConfig::with_limit(limiting.limit_per_window),
        };
        config.map_err(|e| GateError::Config(e.to_string()))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| GateError::Config(format!("{} has an invalid value `{}`", name, raw)))
}

/// `$XDG_CONFIG_HOME/api_gate/config.yaml`, falling back to the working directory.
fn default_config_path(env: Option<&HashMap<String, String>>) -> Option<PathBuf> {
    let base = match env {
        Some(vars) => vars.get("XDG_CONFIG_HOME").cloned(),
        None => std::env::var("XDG_CONFIG_HOME").ok(),
    }
    .unwrap_or_else(|| "./".to_string());

    let path = PathBuf::from(base).join("api_gate").join("config.yaml");
    path.is_file().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn write_temp_yaml(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("api-gate-test-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();
        assert_eq!(config.server.socket_addr(), "127.0.0.1:5000".parse().unwrap());
        assert_eq!(config.rate_limiting.limit_per_window, 500);
        assert_eq!(config.rate_limiting.base_delay_ms, None);
        assert_eq!(config.logging.level, "info");
        assert!(config.auth.token.is_none());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
server:
  host: 0.0.0.0
  port: 8080
rate_limiting:
  limit_per_window: 120
  base_delay_ms: 40
auth:
  token: secret
"#;
        let config = GateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.socket_addr(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.rate_limiting.limit_per_window, 120);
        assert_eq!(config.rate_config().unwrap(), RateConfig::new(120, 40).unwrap());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let path = write_temp_yaml(
            "from-file",
            "server:\n  port: 9000\nrate_limiting:\n  limit_per_window: 30\n",
        );

        let config = GateConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.rate_limiting.limit_per_window, 30);
        assert_eq!(config.rate_limiting.base_delay_ms, None);

        assert!(matches!(
            GateConfig::from_file("/nonexistent-api-gate/config.yaml"),
            Err(GateError::Io(_))
        ));
    }

    #[test]
    fn test_rate_config_derives_base_delay() {
        let config = GateConfig::default();
        let rate = config.rate_config().unwrap();
        assert_eq!(rate.limit_per_window(), 500);
        assert_eq!(rate.base_delay_ms(), 30);
    }

    #[test]
    fn test_validate_requires_token() {
        let mut config = GateConfig::default();
        assert!(matches!(config.validate(), Err(GateError::Config(_))));

        config.auth.token = Some("   ".to_string());
        assert!(config.validate().is_err());

        config.auth.token = Some("secret".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let mut config = GateConfig::default();
        config.auth.token = Some("secret".to_string());
        config.rate_limiting.limit_per_window = 0;
        assert!(config.validate().is_err());

        config.rate_limiting.limit_per_window = 10;
        config.rate_limiting.base_delay_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_with_plain_env_vars() {
        let env = vars(&[
            ("RATE_LIMIT", "50"),
            ("PORT", "6000"),
            ("AUTH_TOKEN", "from-env"),
            ("XDG_CONFIG_HOME", "/nonexistent-api-gate"),
        ]);

        let config = GateConfig::load_with_env(None, Some(env)).unwrap();
        assert_eq!(config.rate_limiting.limit_per_window, 50);
        assert_eq!(config.server.port, 6000);
        assert_eq!(config.auth.token.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_load_layers_file_below_env() {
        let path = write_temp_yaml(
            "layers",
            "rate_limiting:\n  limit_per_window: 80\n  base_delay_ms: 25\nauth:\n  token: from-file\n",
        );
        let env = vars(&[("APIGATE__SERVER__PORT", "7000"), ("AUTH_TOKEN", "override")]);

        let config = GateConfig::load_with_env(Some(path.as_path()), Some(env)).unwrap();
        assert_eq!(config.rate_limiting.limit_per_window, 80);
        assert_eq!(config.rate_limiting.base_delay_ms, Some(25));
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.auth.token.as_deref(), Some("override"));
    }

    #[test]
    fn test_load_rejects_malformed_plain_env_vars() {
        let env = vars(&[("PORT", "http"), ("XDG_CONFIG_HOME", "/nonexistent-api-gate")]);
        let result = GateConfig::load_with_env(None, Some(env));
        assert!(matches!(result, Err(GateError::Config(_))));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let result = GateConfig::load_with_env(
            Some(Path::new("/nonexistent-api-gate/config.yaml")),
            Some(HashMap::new()),
        );
        assert!(matches!(result, Err(GateError::Config(_))));
    }

    #[test]
    fn test_auth_config_debug_redacts_token() {
        let auth = AuthConfig {
            token: Some("secret".to_string()),
        };
        let rendered = format!("{:?}", auth);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("redacted"));
    }
}
