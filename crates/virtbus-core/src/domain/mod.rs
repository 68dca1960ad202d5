//! Domain types
//!
//! This module contains the data the whole workspace speaks in:
//! - Newtypes for validated object paths and subscription handles
//! - Entity kinds and hypervisor drivers of the `org.libvirt` service
//! - The dynamic `BusValue` used at the decode boundary
//! - Bus messages: inbound signals, method calls and match rules
//! - Domain-specific error types

pub mod entity;
pub mod errors;
pub mod message;
pub mod newtypes;
pub mod value;

// Re-export commonly used types
pub use entity::{Driver, EntityKind, LIBVIRT_SERVICE};
pub use errors::{BusError, DomainError};
pub use message::{MatchRule, MethodCall, SignalMessage};
pub use newtypes::{ObjectPath, SubscriptionId};
pub use value::{BusValue, FromBusValue};
