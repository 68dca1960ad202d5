//! Bus messages
//!
//! Inbound signals, outbound method calls and the match rules that ask the
//! bus daemon to route signals to this connection.

use std::fmt::{self, Display, Formatter};

use super::errors::DomainError;
use super::newtypes::ObjectPath;
use super::value::BusValue;

/// One signal received on the shared connection
#[derive(Debug, Clone, PartialEq)]
pub struct SignalMessage {
    /// Object path of the emitter
    pub path: ObjectPath,
    /// Interface the signal belongs to
    pub interface: String,
    /// Signal name
    pub member: String,
    /// Positional arguments in body order
    pub args: Vec<BusValue>,
}

impl SignalMessage {
    pub fn new(
        path: ObjectPath,
        interface: impl Into<String>,
        member: impl Into<String>,
        args: Vec<BusValue>,
    ) -> Self {
        Self {
            path,
            interface: interface.into(),
            member: member.into(),
            args,
        }
    }

    /// Whether this signal is `interface.member`
    #[must_use]
    pub fn is(&self, interface: &str, member: &str) -> bool {
        self.interface == interface && self.member == member
    }
}

/// An outbound method call
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    /// Bus name of the destination service
    pub destination: String,
    pub path: ObjectPath,
    pub interface: String,
    pub member: String,
    /// Positional arguments; empty for no body
    pub args: Vec<BusValue>,
}

impl MethodCall {
    /// Builds a call after validating the interface and member names
    pub fn new(
        destination: impl Into<String>,
        path: ObjectPath,
        interface: impl Into<String>,
        member: impl Into<String>,
        args: Vec<BusValue>,
    ) -> Result<Self, DomainError> {
        let interface = interface.into();
        let member = member.into();
        validate_interface_name(&interface)?;
        validate_member_name(&member)?;
        Ok(Self {
            destination: destination.into(),
            path,
            interface,
            member,
            args,
        })
    }

    /// `interface.member`, used in error reports
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.interface, self.member)
    }
}

/// Signal match rule registered with the bus daemon
///
/// Only the interface and member are constrained. Object path filtering
/// happens client side so that one rule serves every object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchRule {
    pub interface: String,
    pub member: String,
}

impl MatchRule {
    /// Rule for all `interface.member` signals
    pub fn signal(interface: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            member: member.into(),
        }
    }

    /// Whether an inbound signal satisfies this rule
    #[must_use]
    pub fn matches(&self, signal: &SignalMessage) -> bool {
        signal.is(&self.interface, &self.member)
    }
}

impl Display for MatchRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type='signal',interface='{}',member='{}'",
            self.interface, self.member
        )
    }
}

// ============================================================================
// Name validation
// ============================================================================

fn is_name_element(element: &str) -> bool {
    let mut bytes = element.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_alphabetic() || first == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Checks a dotted interface name such as `org.libvirt.Domain`
pub fn validate_interface_name(name: &str) -> Result<(), DomainError> {
    let valid = name.len() <= 255
        && name.split('.').count() >= 2
        && name.split('.').all(is_name_element);
    if valid {
        Ok(())
    } else {
        Err(DomainError::InvalidName(name.to_string()))
    }
}

/// Checks a method or signal name such as `GetXMLDesc`
pub fn validate_member_name(name: &str) -> Result<(), DomainError> {
    if name.len() <= 255 && is_name_element(name) {
        Ok(())
    } else {
        Err(DomainError::InvalidName(name.to_string()))
    }
}
