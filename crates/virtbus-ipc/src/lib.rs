//! virtbus IPC - zbus transport
//!
//! Implements [`BusSession`](virtbus_core::ports::BusSession) on top of a
//! real D-Bus connection and wires it into a
//! [`Connection`](virtbus_events::Connection).
//!
//! ```ignore
//! let config = virtbus_core::config::Config::load_or_default(&path);
//! let conn = virtbus_ipc::open(&config).await?;
//! let version = conn.connect().lib_version().await?;
//! ```

pub mod convert;
pub mod session;

use std::sync::Arc;

use virtbus_core::config::Config;
use virtbus_events::{Connection, ProxyError};

pub use session::ZbusSession;

/// Connects to the bus described by `config` and starts dispatching
///
/// # Errors
///
/// [`ProxyError::Config`] before any connection attempt when `config` does
/// not validate, [`ProxyError::Bus`] when the connection or authentication
/// fails.
pub async fn open(config: &Config) -> Result<Connection, ProxyError> {
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ProxyError::Config(errors));
    }
    let session = ZbusSession::connect(&config.bus).await?;
    Connection::new(Arc::new(session), config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_rejects_invalid_config_before_connecting() {
        let mut config = Config::default();
        config.bus.address = Some("nowhere".to_string());

        match open(&config).await {
            Err(ProxyError::Config(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "bus.address");
            }
            other => panic!("expected a config error, got {other:?}"),
        }
    }
}
