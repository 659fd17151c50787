//! # Configuration Management
//!
//! Centralized configuration for the forwarding proxy.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! ## Forwarding Secret
//! The shared secret is resolved lazily, once, under a mutex. A failed load is
//! cached as well, so every later handshake fails closed without touching the
//! filesystem again. Call [`ForwardingConfig::warm_secret`] at startup (or
//! [`ForwardingConfig::resolve_secret_blocking`] from async code) to keep the
//! blocking read off connection tasks.

use crate::error::{constants, ProtocolError, Result};
use crate::protocol::integrity::ForwardingSecret;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn, Level};

/// Default secret file, relative to the working directory
pub const DEFAULT_SECRET_FILE: &str = "forwarding.secret";

/// Default time allowed for the gateway to answer the forwarding challenge
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default depth of the per-connection outbound queue
pub const DEFAULT_OUTBOUND_QUEUE: usize = 32;

/// Top-level proxy configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProxyConfig {
    /// Gateway forwarding settings
    #[serde(default)]
    pub forwarding: ForwardingConfig,

    /// Per-connection session settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ProxyConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(enabled) = std::env::var("GATEWAY_FORWARDING_ENABLED") {
            config.forwarding.enabled = parse_bool("GATEWAY_FORWARDING_ENABLED", &enabled)?;
        }

        if let Ok(required) = std::env::var("GATEWAY_FORWARDING_REQUIRED") {
            config.forwarding.required = parse_bool("GATEWAY_FORWARDING_REQUIRED", &required)?;
        }

        if let Ok(path) = std::env::var("GATEWAY_FORWARDING_SECRET_FILE") {
            config.forwarding.secret_file = PathBuf::from(path);
        }

        if let Ok(timeout) = std::env::var("GATEWAY_FORWARDING_HANDSHAKE_TIMEOUT_MS") {
            let millis = timeout.trim().parse::<u64>().map_err(|_| {
                ProtocolError::ConfigError(format!(
                    "Invalid milliseconds for GATEWAY_FORWARDING_HANDSHAKE_TIMEOUT_MS: '{timeout}'"
                ))
            })?;
            config.session.handshake_timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.forwarding.validate());
        errors.extend(self.session.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ProtocolError::ConfigError(format!(
            "Invalid boolean for {name}: '{other}'"
        ))),
    }
}

/// Gateway forwarding configuration.
///
/// Clones share one secret cache, so cloning a loaded config never reloads.
/// The cache field is private; build enabled configs with
/// [`ForwardingConfig::with_secret`] or [`ForwardingConfig::with_secret_file`],
/// or mutate a default.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Whether to challenge connections for forwarded identity
    pub enabled: bool,

    /// Whether peers that cannot forward are turned away
    pub required: bool,

    /// File holding the shared secret
    pub secret_file: PathBuf,

    #[serde(skip)]
    secret: SecretCell,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            required: true,
            secret_file: PathBuf::from(DEFAULT_SECRET_FILE),
            secret: SecretCell::default(),
        }
    }
}

impl ForwardingConfig {
    /// Enabled forwarding with an in-memory secret; the secret file is never read
    pub fn with_secret(required: bool, secret: ForwardingSecret) -> Self {
        let config = Self {
            enabled: true,
            required,
            ..Self::default()
        };
        config.secret.preload(secret);
        config
    }

    /// Enabled forwarding with the secret read lazily from `path`
    pub fn with_secret_file(required: bool, path: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            required,
            secret_file: path.into(),
            ..Self::default()
        }
    }

    /// Resolve the secret, loading it on first use.
    ///
    /// Fails with `ConfigurationFault` if the secret is missing or unreadable,
    /// now or on any earlier attempt.
    pub fn secret(&self) -> Result<Arc<ForwardingSecret>> {
        self.secret.resolve(&self.secret_file)
    }

    /// Resolve the secret now, typically at startup
    pub fn warm_secret(&self) -> Result<()> {
        self.secret().map(|_| ())
    }

    /// Resolve the secret on the blocking pool instead of the calling task.
    ///
    /// Returns the cached result without spawning once the secret has been
    /// resolved (or has failed).
    pub async fn resolve_secret_blocking(&self) -> Result<Arc<ForwardingSecret>> {
        if let Some(cached) = self.secret.cached(&self.secret_file) {
            return cached;
        }
        let config = self.clone();
        tokio::task::spawn_blocking(move || config.secret())
            .await
            .map_err(|e| ProtocolError::ConfigurationFault(format!("Secret loader failed: {e}")))?
    }

    /// Validate forwarding configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.enabled && self.secret_file.as_os_str().is_empty() {
            errors.push("secret_file must be set when forwarding is enabled".to_string());
        }

        if !self.enabled && !self.required {
            errors.push(
                "WARNING: 'required = false' has no effect while forwarding is disabled"
                    .to_string(),
            );
        }

        errors
    }
}

/// Resolution state of the forwarding secret
enum SecretSlot {
    Unresolved,
    Loaded(Arc<ForwardingSecret>),
    Failed(String),
}

/// Lazily resolved, shared secret cache
#[derive(Clone)]
struct SecretCell {
    slot: Arc<Mutex<SecretSlot>>,
}

impl Default for SecretCell {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(SecretSlot::Unresolved)),
        }
    }
}

impl SecretCell {
    fn preload(&self, secret: ForwardingSecret) {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| {
            warn!("forwarding secret lock poisoned; recovering");
            poisoned.into_inner()
        });
        *slot = SecretSlot::Loaded(Arc::new(secret));
    }

    /// Resolved result, if one is available without blocking.
    ///
    /// `None` while unresolved or while another thread holds the lock,
    /// which is usually a load in progress.
    fn cached(&self, path: &Path) -> Option<Result<Arc<ForwardingSecret>>> {
        let resolved = match self.slot.try_lock() {
            Ok(slot) => !matches!(*slot, SecretSlot::Unresolved),
            Err(_) => false,
        };
        // The slot never returns to Unresolved, so this cannot load
        resolved.then(|| self.resolve(path))
    }

    fn resolve(&self, path: &Path) -> Result<Arc<ForwardingSecret>> {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| {
            warn!("forwarding secret lock poisoned; recovering");
            poisoned.into_inner()
        });

        if let SecretSlot::Unresolved = *slot {
            *slot = match ForwardingSecret::from_file(path) {
                Ok(secret) => {
                    info!(path = %path.display(), "Loaded forwarding secret");
                    SecretSlot::Loaded(Arc::new(secret))
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to load forwarding secret");
                    SecretSlot::Failed(e.to_string())
                }
            };
        }

        match &*slot {
            SecretSlot::Loaded(secret) => Ok(Arc::clone(secret)),
            SecretSlot::Failed(reason) => Err(ProtocolError::ConfigurationFault(format!(
                "{}: {reason}",
                constants::ERR_SECRET_UNAVAILABLE
            ))),
            SecretSlot::Unresolved => Err(ProtocolError::ConfigurationFault(
                constants::ERR_SECRET_UNAVAILABLE.into(),
            )),
        }
    }
}

impl fmt::Debug for SecretCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.slot.lock().as_deref() {
            Ok(SecretSlot::Unresolved) => "unresolved",
            Ok(SecretSlot::Loaded(_)) => "loaded",
            Ok(SecretSlot::Failed(_)) => "failed",
            Err(_) => "poisoned",
        };
        f.write_str(state)
    }
}

/// Per-connection session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Time allowed between sending the challenge and receiving the response
    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,

    /// Maximum number of packets queued for a connection
    pub outbound_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
        }
    }
}

impl SessionConfig {
    /// Validate session configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.handshake_timeout.as_millis() < 100 {
            errors.push("Handshake timeout too short (minimum: 100ms)".to_string());
        } else if self.handshake_timeout.as_secs() > 300 {
            errors.push("Handshake timeout too long (maximum: 300s)".to_string());
        }

        if self.outbound_queue == 0 {
            errors.push("Outbound queue must be greater than 0".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("gateway-forwarding"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.as_str().to_ascii_lowercase().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
