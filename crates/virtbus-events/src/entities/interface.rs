//! `org.libvirt.Interface`

use virtbus_core::domain::BusValue;

use super::kind;
use crate::error::ProxyError;
use crate::proxy::Proxy;

impl Proxy<kind::Interface> {
    pub async fn get_xml_desc(&self, flags: u32) -> Result<String, ProxyError> {
        self.call_one("GetXMLDesc", vec![BusValue::U32(flags)]).await
    }

    /// Whether the host interface is up
    pub async fn active(&self) -> Result<bool, ProxyError> {
        self.property("Active").await
    }
}
