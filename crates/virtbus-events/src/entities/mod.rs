//! Entity kinds as types
//!
//! Every libvirt object category is a zero-sized marker implementing
//! [`Kind`]. [`Proxy`] is generic over the marker, which lets the compiler
//! reject subscribing a domain proxy to a connection event, and lets each
//! kind carry its own RPC methods (see the submodules).

use virtbus_core::domain::EntityKind;

use crate::proxy::Proxy;

mod connect;
mod domain;
mod interface;
mod network;
mod node_device;
mod nwfilter;
mod secret;
mod storage;

/// Compile-time entity kind
pub trait Kind: Send + Sync + 'static {
    const KIND: EntityKind;
}

/// Marker types, one per [`EntityKind`]
pub mod kind {
    use super::{EntityKind, Kind};

    macro_rules! markers {
        ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
            $(
                $(#[$meta])*
                #[derive(Debug)]
                pub enum $name {}

                impl Kind for $name {
                    const KIND: EntityKind = EntityKind::$name;
                }
            )*
        };
    }

    markers! {
        /// `org.libvirt.Connect`, one per hypervisor driver
        Connect,
        Domain,
        Network,
        NodeDevice,
        NWFilter,
        Secret,
        StoragePool,
        StorageVol,
        Interface,
    }
}

pub type ConnectProxy = Proxy<kind::Connect>;
pub type DomainProxy = Proxy<kind::Domain>;
pub type NetworkProxy = Proxy<kind::Network>;
pub type NodeDeviceProxy = Proxy<kind::NodeDevice>;
pub type NWFilterProxy = Proxy<kind::NWFilter>;
pub type SecretProxy = Proxy<kind::Secret>;
pub type StoragePoolProxy = Proxy<kind::StoragePool>;
pub type StorageVolProxy = Proxy<kind::StorageVol>;
pub type InterfaceProxy = Proxy<kind::Interface>;
