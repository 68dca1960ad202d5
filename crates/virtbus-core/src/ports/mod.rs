//! Port definitions (hexagonal architecture interfaces)
//!
//! The event layer never talks to a bus library directly. It drives the
//! [`BusSession`] port, implemented over D-Bus by the `virtbus-ipc` crate
//! and in memory by [`MemoryBus`] for tests and embedding.
//!
//! ## Ports Overview
//!
//! - [`BusSession`] - one authenticated duplex bus connection
//! - [`MemoryBus`] - scriptable in-process implementation of it

pub mod bus_session;
pub mod memory;

pub use bus_session::{BusSession, SignalStream};
pub use memory::{MatchOp, MemoryBus};
