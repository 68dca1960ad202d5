//! `org.libvirt.Secret`

use virtbus_core::domain::BusValue;

use super::kind;
use crate::error::ProxyError;
use crate::proxy::Proxy;

impl Proxy<kind::Secret> {
    /// Raw secret bytes
    pub async fn get_value(&self, flags: u32) -> Result<Vec<u8>, ProxyError> {
        self.call_one("GetValue", vec![BusValue::U32(flags)]).await
    }

    /// Replaces the secret; an empty `value` is sent as an empty `ay`
    pub async fn set_value(&self, value: &[u8], flags: u32) -> Result<(), ProxyError> {
        self.call_unit(
            "SetValue",
            vec![BusValue::Bytes(value.to_vec()), BusValue::U32(flags)],
        )
        .await
    }
}
