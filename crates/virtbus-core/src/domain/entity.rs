//! Entity kinds and hypervisor drivers
//!
//! libvirt publishes one D-Bus interface per remote object category and one
//! connection object per hypervisor driver under `/org/libvirt/<Driver>`.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::ObjectPath;

/// Well-known bus name of the libvirt D-Bus service
pub const LIBVIRT_SERVICE: &str = "org.libvirt";

// ============================================================================
// EntityKind
// ============================================================================

/// Category of remote object exposed by the libvirt service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
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

impl EntityKind {
    /// All entity kinds, in the order libvirt documents them
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Connect,
        EntityKind::Domain,
        EntityKind::Network,
        EntityKind::NodeDevice,
        EntityKind::NWFilter,
        EntityKind::Secret,
        EntityKind::StoragePool,
        EntityKind::StorageVol,
        EntityKind::Interface,
    ];

    /// The D-Bus interface implemented by objects of this kind
    #[must_use]
    pub const fn interface_name(self) -> &'static str {
        match self {
            EntityKind::Connect => "org.libvirt.Connect",
            EntityKind::Domain => "org.libvirt.Domain",
            EntityKind::Network => "org.libvirt.Network",
            EntityKind::NodeDevice => "org.libvirt.NodeDevice",
            EntityKind::NWFilter => "org.libvirt.NWFilter",
            EntityKind::Secret => "org.libvirt.Secret",
            EntityKind::StoragePool => "org.libvirt.StoragePool",
            EntityKind::StorageVol => "org.libvirt.StorageVol",
            EntityKind::Interface => "org.libvirt.Interface",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = self.interface_name();
        f.write_str(name.rsplit('.').next().unwrap_or(name))
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Hypervisor driver whose connection object the session binds to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Driver {
    #[serde(rename = "VBox")]
    VBox,
    #[serde(rename = "VZ")]
    Vz,
    #[default]
    #[serde(rename = "QEMU")]
    Qemu,
    #[serde(rename = "OpenVZ")]
    OpenVz,
    #[serde(rename = "BHyve")]
    BHyve,
    #[serde(rename = "LXC")]
    Lxc,
    #[serde(rename = "Test")]
    Test,
    #[serde(rename = "Xen")]
    Xen,
    #[serde(rename = "UML")]
    Uml,
}

impl Driver {
    /// The path element libvirt uses for this driver
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Driver::VBox => "VBox",
            Driver::Vz => "VZ",
            Driver::Qemu => "QEMU",
            Driver::OpenVz => "OpenVZ",
            Driver::BHyve => "BHyve",
            Driver::Lxc => "LXC",
            Driver::Test => "Test",
            Driver::Xen => "Xen",
            Driver::Uml => "UML",
        }
    }

    /// Object path of the `org.libvirt.Connect` object for this driver
    #[must_use]
    pub fn connect_path(self) -> ObjectPath {
        ObjectPath::new_unchecked(format!("/org/libvirt/{}", self.as_str()))
    }
}

impl Display for Driver {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Driver {
    type Err = DomainError;

    /// Case-insensitive parse (`qemu`, `QEMU` and `Qemu` all work)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [Driver; 9] = [
            Driver::VBox,
            Driver::Vz,
            Driver::Qemu,
            Driver::OpenVz,
            Driver::BHyve,
            Driver::Lxc,
            Driver::Test,
            Driver::Xen,
            Driver::Uml,
        ];
        ALL.into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::UnknownDriver(s.to_string()))
    }
}
