//! `org.libvirt.Domain`

use virtbus_core::domain::BusValue;

use super::kind;
use crate::error::ProxyError;
use crate::proxy::Proxy;

impl Proxy<kind::Domain> {
    /// Starts a defined domain
    pub async fn create(&self, flags: u32) -> Result<(), ProxyError> {
        self.call_unit("Create", vec![BusValue::U32(flags)]).await
    }

    /// Forcefully stops a running domain
    pub async fn destroy(&self, flags: u32) -> Result<(), ProxyError> {
        self.call_unit("Destroy", vec![BusValue::U32(flags)]).await
    }

    pub async fn get_xml_desc(&self, flags: u32) -> Result<String, ProxyError> {
        self.call_one("GetXMLDesc", vec![BusValue::U32(flags)]).await
    }

    pub async fn name(&self) -> Result<String, ProxyError> {
        self.property("Name").await
    }

    pub async fn uuid(&self) -> Result<String, ProxyError> {
        self.property("UUID").await
    }
}
