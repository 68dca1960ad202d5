//! virtbus events - typed libvirt proxies over one shared bus connection
//!
//! Every proxy created from a [`Connection`] shares the same bus session.
//! Signals arriving on it are fanned out to the per-subscription queues
//! whose filter (object path, member, arity) admits them; each queue feeds
//! a dispatcher that decodes the event and invokes the callback. Each subscription installs the event's match
//! rule; rules are reference counted so the bus sees one `AddMatch` per
//! distinct rule no matter how many objects subscribe to it.
//!
//! # Architecture
//!
//! - [`Connection`] owns the session, the [`hub::SignalHub`] pump and the
//!   [`match_rules::MatchRuleManager`]
//! - [`Proxy`] holds the object path and a [`registry::Registry`] of its
//!   subscriptions
//! - [`dispatcher`] runs one task per subscription
//! - [`catalog`] lists the signals `org.libvirt` emits
//!
//! # Usage
//!
//! ```ignore
//! use virtbus_events::{catalog::DomainEvent, Connection};
//!
//! let conn = Connection::new(session, &config)?;
//! let root = conn.connect();
//! let id = root
//!     .subscribe::<DomainEvent, _>(Some(|event: DomainEvent| {
//!         println!("{} -> {:?}", event.domain, event.lifecycle());
//!     }))
//!     .await?;
//! // ...
//! root.unsubscribe(id).await;
//! conn.close().await;
//! ```

pub mod catalog;
pub mod connection;
pub mod dispatcher;
pub mod entities;
pub mod error;
pub mod event;
pub mod hub;
pub mod match_rules;
pub mod metrics;
pub mod proxy;
pub mod registry;

pub use connection::Connection;
pub use dispatcher::{DispatcherState, DropReason, SignalFilter};
pub use entities::{
    kind, ConnectProxy, DomainProxy, InterfaceProxy, Kind, NWFilterProxy, NetworkProxy,
    NodeDeviceProxy, SecretProxy, StoragePoolProxy, StorageVolProxy,
};
pub use error::ProxyError;
pub use event::SignalEvent;
pub use metrics::DispatchMetrics;
pub use proxy::Proxy;
pub use registry::SubscriptionInfo;
pub use virtbus_core::domain::SubscriptionId;
