//! `org.libvirt.StoragePool` and `org.libvirt.StorageVol`

use virtbus_core::domain::{BusValue, ObjectPath};

use super::{kind, StorageVolProxy};
use crate::error::ProxyError;
use crate::proxy::Proxy;

impl Proxy<kind::StoragePool> {
    /// Rescans the pool's volumes
    pub async fn refresh(&self, flags: u32) -> Result<(), ProxyError> {
        self.call_unit("Refresh", vec![BusValue::U32(flags)]).await
    }

    pub async fn list_storage_volumes(&self, flags: u32) -> Result<Vec<StorageVolProxy>, ProxyError> {
        let paths: Vec<ObjectPath> = self
            .call_one("ListStorageVolumes", vec![BusValue::U32(flags)])
            .await?;
        Ok(paths.into_iter().map(|path| self.sibling(path)).collect())
    }

    pub async fn storage_vol_lookup_by_name(&self, name: &str) -> Result<StorageVolProxy, ProxyError> {
        let path: ObjectPath = self
            .call_one("StorageVolLookupByName", vec![name.into()])
            .await?;
        Ok(self.sibling(path))
    }
}

impl Proxy<kind::StorageVol> {
    pub async fn get_xml_desc(&self, flags: u32) -> Result<String, ProxyError> {
        self.call_one("GetXMLDesc", vec![BusValue::U32(flags)]).await
    }

    /// Path of the volume on the host, the `Path` property
    pub async fn vol_path(&self) -> Result<String, ProxyError> {
        self.property("Path").await
    }
}
