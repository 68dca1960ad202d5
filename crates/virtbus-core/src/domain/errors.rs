//! Domain error types
//!
//! Validation failures on domain values live in [`DomainError`]; everything
//! that can go wrong talking to the bus lives in [`BusError`].

use thiserror::Error;

/// Errors raised while constructing or validating domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The string is not a valid D-Bus object path
    #[error("Invalid object path: {0}")]
    InvalidObjectPath(String),

    /// The string is not a valid D-Bus interface, member or bus name
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// The hypervisor driver name is not one libvirt exposes
    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

/// Errors reported by a bus session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Connecting, authenticating or the `Hello` handshake failed
    #[error("Bus connection failed: {0}")]
    Connection(String),

    /// A remote method call returned an error reply
    #[error("Call to {method} failed: {message}")]
    Call {
        /// Fully qualified `interface.member` of the failed call
        method: String,
        /// Error name and message returned by the remote side
        message: String,
    },

    /// Installing or removing a match rule was rejected by the bus
    #[error("Match rule {rule} rejected: {message}")]
    MatchRule {
        /// Rule expression that was sent
        rule: String,
        /// Reason given by the bus
        message: String,
    },

    /// A message body could not be converted to or from `BusValue`
    #[error("Decode error: {0}")]
    Decode(String),

    /// The value cannot be expressed on the wire by this adapter
    #[error("Unsupported value: {0}")]
    Unsupported(String),

    /// The session has already been closed
    #[error("Bus session closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidObjectPath("no/slash".to_string());
        assert_eq!(err.to_string(), "Invalid object path: no/slash");

        let err = BusError::Call {
            method: "org.libvirt.Domain.Create".to_string(),
            message: "org.libvirt.Error: domain is already running".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Call to org.libvirt.Domain.Create failed: org.libvirt.Error: domain is already running"
        );

        let err = BusError::MatchRule {
            rule: "type='signal'".to_string(),
            message: "denied".to_string(),
        };
        assert_eq!(err.to_string(), "Match rule type='signal' rejected: denied");
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(BusError::Closed, BusError::Closed);
        assert_ne!(
            BusError::Decode("a".to_string()),
            BusError::Unsupported("a".to_string())
        );
    }
}
