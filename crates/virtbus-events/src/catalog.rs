//! Signals published by the `org.libvirt` service
//!
//! Connection-level events are emitted on the driver's connection object
//! (`/org/libvirt/QEMU` and so on) and name the affected object in their
//! first argument. Domain events are emitted on the domain's own path.

use std::collections::HashMap;

use virtbus_core::domain::{BusValue, FromBusValue, ObjectPath};

use crate::entities::{kind, Kind};
use crate::event::SignalEvent;

/// Declares one struct per signal and derives its [`SignalEvent`] impl.
/// Arity is the number of fields; fields decode in declaration order.
macro_rules! signal_events {
    ($(
        $(#[$meta:meta])*
        $source:ident::$name:ident { $($(#[$fmeta:meta])* $field:ident: $ty:ty),* $(,)? }
    )*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq)]
            pub struct $name {
                $($(#[$fmeta])* pub $field: $ty,)*
            }

            impl SignalEvent for $name {
                type Source = kind::$source;
                const INTERFACE: &'static str = <kind::$source as Kind>::KIND.interface_name();
                const MEMBER: &'static str = stringify!($name);
                const ARITY: usize = {
                    let fields: &[&str] = &[$(stringify!($field)),*];
                    fields.len()
                };

                #[allow(unused_mut)]
                fn decode(args: &[BusValue]) -> Option<Self> {
                    let mut args = args.iter();
                    let event = Self {
                        $($field: FromBusValue::from_bus_value(args.next()?)?,)*
                    };
                    args.next().is_none().then_some(event)
                }
            }
        )*
    };
}

// ============================================================================
// org.libvirt.Connect
// ============================================================================

signal_events! {
    /// Domain lifecycle change (`virConnectDomainEventRegisterAny`)
    Connect::DomainEvent { domain: ObjectPath, event: i32, detail: i32 }

    Connect::NetworkEvent { network: ObjectPath, event: i32 }

    Connect::NodeDeviceEvent { device: ObjectPath, event: i32, detail: i32 }

    Connect::NodeDeviceUpdate { device: ObjectPath }

    Connect::SecretEvent { secret: ObjectPath, event: i32, detail: i32 }

    Connect::SecretValueChanged { secret: ObjectPath }

    Connect::StoragePoolEvent { pool: ObjectPath, event: i32, detail: i32 }

    Connect::StoragePoolRefresh { pool: ObjectPath }
}

/// `virDomainEventType`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainLifecycle {
    Defined,
    Undefined,
    Started,
    Suspended,
    Resumed,
    Stopped,
    Shutdown,
    PMSuspended,
    Crashed,
}

impl DomainLifecycle {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => DomainLifecycle::Defined,
            1 => DomainLifecycle::Undefined,
            2 => DomainLifecycle::Started,
            3 => DomainLifecycle::Suspended,
            4 => DomainLifecycle::Resumed,
            5 => DomainLifecycle::Stopped,
            6 => DomainLifecycle::Shutdown,
            7 => DomainLifecycle::PMSuspended,
            8 => DomainLifecycle::Crashed,
            _ => return None,
        })
    }
}

impl DomainEvent {
    /// The event code as a known lifecycle transition
    pub fn lifecycle(&self) -> Option<DomainLifecycle> {
        DomainLifecycle::from_code(self.event)
    }
}

// ============================================================================
// org.libvirt.Domain
// ============================================================================

/// One end of a graphics connection: `(family, node, service)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsAddress {
    pub family: String,
    pub node: String,
    pub service: String,
}

impl FromBusValue for GraphicsAddress {
    fn from_bus_value(value: &BusValue) -> Option<Self> {
        let (family, node, service) = <(String, String, String)>::from_bus_value(value)?;
        Some(Self {
            family,
            node,
            service,
        })
    }
}

signal_events! {
    Domain::AgentEvent { state: i32, reason: i32 }

    /// New balloon size in KiB
    Domain::BalloonChange { actual: u64 }

    Domain::BlockJob { disk: String, job_type: i32, status: i32 }

    Domain::BlockThreshold { device: String, path: String, threshold: u64, excess: u64 }

    Domain::ControlError {}

    Domain::DeviceAdded { device: String }

    Domain::DeviceRemovalFailed { device: String }

    Domain::DeviceRemoved { device: String }

    Domain::DiskChange { old_src_path: String, new_src_path: String, device: String, reason: i32 }

    Domain::Graphics {
        phase: i32,
        local: GraphicsAddress,
        remote: GraphicsAddress,
        auth_scheme: String,
        /// `(type, name)` identity pairs
        subject: Vec<(String, String)>,
    }

    Domain::IOError { src_path: String, device: String, action: i32, reason: String }

    /// Job statistics keyed by typed-parameter name
    Domain::JobCompleted { stats: HashMap<String, BusValue> }

    Domain::MemoryFailure { recipient: i32, action: i32, flags: u32 }

    Domain::MetadataChanged { kind: i32, ns_uri: String }

    Domain::MigrationIteration { iteration: i32 }

    Domain::PMSuspend { reason: i32 }

    Domain::PMSuspendDisk { reason: i32 }

    Domain::PMWakeup { reason: i32 }

    /// Offset from UTC in seconds
    Domain::RTCChange { utc_offset: i64 }

    Domain::Reboot {}

    Domain::TrayChange { device: String, reason: i32 }

    Domain::TunableParameters { params: HashMap<String, BusValue> }

    Domain::Watchdog { action: i32 }
}
