//! `org.libvirt.Network`

use virtbus_core::domain::BusValue;

use super::kind;
use crate::error::ProxyError;
use crate::proxy::Proxy;

impl Proxy<kind::Network> {
    pub async fn create(&self) -> Result<(), ProxyError> {
        self.call_unit("Create", vec![]).await
    }

    pub async fn destroy(&self) -> Result<(), ProxyError> {
        self.call_unit("Destroy", vec![]).await
    }

    pub async fn get_xml_desc(&self, flags: u32) -> Result<String, ProxyError> {
        self.call_one("GetXMLDesc", vec![BusValue::U32(flags)]).await
    }

    pub async fn name(&self) -> Result<String, ProxyError> {
        self.property("Name").await
    }
}
