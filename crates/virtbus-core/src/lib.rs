//! virtbus Core - Domain types and the bus port
//!
//! This crate holds everything the event layer and the bus adapter agree on:
//! - **Domain types** - `ObjectPath`, `SubscriptionId`, `EntityKind`, `Driver`,
//!   `BusValue`, `SignalMessage`, `MatchRule`, `MethodCall`
//! - **Port definitions** - the `BusSession` trait an authenticated bus
//!   connection implements, plus the in-memory `MemoryBus`
//! - **Configuration** - YAML-backed `Config` with validation
//! - **Logging** - `tracing-subscriber` bootstrap
//!
//! # Architecture
//!
//! Same ports & adapters split as the rest of the workspace: the domain
//! module is pure data, ports define the trait the adapter crate
//! (`virtbus-ipc`) implements, and `virtbus-events` drives the port.

pub mod config;
pub mod domain;
pub mod logging;
pub mod ports;
