//! virtbus settings
//!
//! One YAML document with three sections (`bus`, `dispatch`, `logging`).
//! Every field has a default, so an empty or partial file is accepted.
//! [`Config::validate`] reports all problems at once instead of stopping at
//! the first.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::domain::entity::{Driver, LIBVIRT_SERVICE};
use crate::domain::message::validate_interface_name;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Root of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bus: BusConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

/// Where and how to reach the libvirt service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// D-Bus address such as `unix:path=/run/dbus/system_bus_socket`.
    /// `None` connects to the system bus.
    pub address: Option<String>,
    /// Well-known name of the remote service.
    pub service: String,
    /// Hypervisor driver whose connection object is used.
    pub driver: Driver,
    /// SASL mechanism offered to the bus daemon.
    pub auth: AuthMechanism,
}

/// SASL authentication mechanisms understood by the bus adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMechanism {
    /// Peer credentials over the unix socket
    #[default]
    External,
    /// `DBUS_COOKIE_SHA1`
    Cookie,
    Anonymous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Capacity of each subscription's inbound queue. Signals arriving
    /// while the queue is full are dropped for that subscription only.
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Largest accepted `dispatch.queue_capacity`.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            address: None,
            service: LIBVIRT_SERVICE.to_string(),
            driver: Driver::default(),
            auth: AuthMechanism::default(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Reads and parses the YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Like [`load`](Self::load), with any failure yielding the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// `$XDG_CONFIG_HOME/virtbus/config.yaml`, or the platform equivalent.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("virtbus")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted field name, e.g. `dispatch.queue_capacity`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Config {
    /// Every problem found; empty when the configuration is usable.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        self.bus.check(&mut errors);
        self.dispatch.check(&mut errors);
        self.logging.check(&mut errors);
        errors
    }
}

impl BusConfig {
    fn check(&self, errors: &mut Vec<ValidationError>) {
        match self.address.as_deref().map(str::trim) {
            Some("") => errors.push(ValidationError::new(
                "bus.address",
                "is empty; leave it unset for the system bus",
            )),
            Some(address) if !address.contains(':') => errors.push(ValidationError::new(
                "bus.address",
                format!("'{address}' has no transport prefix such as 'unix:'"),
            )),
            _ => {}
        }
        // Well-known bus names share the interface name grammar
        if validate_interface_name(&self.service).is_err() {
            errors.push(ValidationError::new(
                "bus.service",
                format!("'{}' is not a well-known bus name", self.service),
            ));
        }
    }
}

impl DispatchConfig {
    fn check(&self, errors: &mut Vec<ValidationError>) {
        if !(1..=MAX_QUEUE_CAPACITY).contains(&self.queue_capacity) {
            errors.push(ValidationError::new(
                "dispatch.queue_capacity",
                format!(
                    "{} is outside 1..={MAX_QUEUE_CAPACITY}",
                    self.queue_capacity
                ),
            ));
        }
    }
}

impl LoggingConfig {
    fn check(&self, errors: &mut Vec<ValidationError>) {
        if !LOG_LEVELS.contains(&self.level.as_str()) {
            errors.push(ValidationError::new(
                "logging.level",
                format!("'{}' is not one of {}", self.level, LOG_LEVELS.join("|")),
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Programmatic alternative to a config file, starting from the defaults.
///
/// ```rust
/// use virtbus_core::config::ConfigBuilder;
/// use virtbus_core::domain::Driver;
///
/// let config = ConfigBuilder::new()
///     .bus_driver(Driver::Lxc)
///     .dispatch_queue_capacity(64)
///     .build();
/// assert_eq!(config.bus.driver, Driver::Lxc);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bus_address(mut self, address: impl Into<String>) -> Self {
        self.config.bus.address = Some(address.into());
        self
    }

    pub fn bus_service(mut self, service: impl Into<String>) -> Self {
        self.config.bus.service = service.into();
        self
    }

    pub fn bus_driver(mut self, driver: Driver) -> Self {
        self.config.bus.driver = driver;
        self
    }

    pub fn bus_auth(mut self, auth: AuthMechanism) -> Self {
        self.config.bus.auth = auth;
        self
    }

    pub fn dispatch_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.dispatch.queue_capacity = capacity;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: LogFormat) -> Self {
        self.config.logging.format = format;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }

    /// [`build`](Self::build) followed by [`Config::validate`].
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.config;
        match config.validate() {
            errors if errors.is_empty() => Ok(config),
            errors => Err(errors),
        }
    }
}
