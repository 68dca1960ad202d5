//! `org.libvirt.Connect`: lookups that resolve entity proxies

use virtbus_core::domain::{BusValue, ObjectPath};

use super::{
    kind, DomainProxy, InterfaceProxy, NWFilterProxy, NetworkProxy, NodeDeviceProxy,
    SecretProxy, StoragePoolProxy, StorageVolProxy,
};
use crate::error::ProxyError;
use crate::proxy::Proxy;

impl Proxy<kind::Connect> {
    async fn lookup(&self, method: &str, arg: BusValue) -> Result<ObjectPath, ProxyError> {
        self.call_one(method, vec![arg]).await
    }

    async fn list(&self, method: &str, flags: u32) -> Result<Vec<ObjectPath>, ProxyError> {
        self.call_one(method, vec![BusValue::U32(flags)]).await
    }

    // --- domains ---

    pub async fn domain_lookup_by_name(&self, name: &str) -> Result<DomainProxy, ProxyError> {
        let path = self.lookup("DomainLookupByName", name.into()).await?;
        Ok(self.sibling(path))
    }

    pub async fn domain_lookup_by_uuid(&self, uuid: &str) -> Result<DomainProxy, ProxyError> {
        let path = self.lookup("DomainLookupByUUID", uuid.into()).await?;
        Ok(self.sibling(path))
    }

    pub async fn domain_lookup_by_id(&self, id: i32) -> Result<DomainProxy, ProxyError> {
        let path = self.lookup("DomainLookupByID", BusValue::I32(id)).await?;
        Ok(self.sibling(path))
    }

    /// Domains matching `flags` (`virConnectListAllDomainsFlags`)
    pub async fn list_domains(&self, flags: u32) -> Result<Vec<DomainProxy>, ProxyError> {
        let paths = self.list("ListDomains", flags).await?;
        Ok(paths.into_iter().map(|path| self.sibling(path)).collect())
    }

    // --- networks ---

    pub async fn network_lookup_by_name(&self, name: &str) -> Result<NetworkProxy, ProxyError> {
        let path = self.lookup("NetworkLookupByName", name.into()).await?;
        Ok(self.sibling(path))
    }

    pub async fn network_lookup_by_uuid(&self, uuid: &str) -> Result<NetworkProxy, ProxyError> {
        let path = self.lookup("NetworkLookupByUUID", uuid.into()).await?;
        Ok(self.sibling(path))
    }

    pub async fn list_networks(&self, flags: u32) -> Result<Vec<NetworkProxy>, ProxyError> {
        let paths = self.list("ListNetworks", flags).await?;
        Ok(paths.into_iter().map(|path| self.sibling(path)).collect())
    }

    // --- storage ---

    pub async fn storage_pool_lookup_by_name(
        &self,
        name: &str,
    ) -> Result<StoragePoolProxy, ProxyError> {
        let path = self.lookup("StoragePoolLookupByName", name.into()).await?;
        Ok(self.sibling(path))
    }

    pub async fn storage_pool_lookup_by_uuid(
        &self,
        uuid: &str,
    ) -> Result<StoragePoolProxy, ProxyError> {
        let path = self.lookup("StoragePoolLookupByUUID", uuid.into()).await?;
        Ok(self.sibling(path))
    }

    pub async fn storage_vol_lookup_by_key(&self, key: &str) -> Result<StorageVolProxy, ProxyError> {
        let path = self.lookup("StorageVolLookupByKey", key.into()).await?;
        Ok(self.sibling(path))
    }

    pub async fn storage_vol_lookup_by_path(
        &self,
        vol_path: &str,
    ) -> Result<StorageVolProxy, ProxyError> {
        let path = self.lookup("StorageVolLookupByPath", vol_path.into()).await?;
        Ok(self.sibling(path))
    }

    // --- everything else ---

    pub async fn node_device_lookup_by_name(
        &self,
        name: &str,
    ) -> Result<NodeDeviceProxy, ProxyError> {
        let path = self.lookup("NodeDeviceLookupByName", name.into()).await?;
        Ok(self.sibling(path))
    }

    pub async fn nwfilter_lookup_by_name(&self, name: &str) -> Result<NWFilterProxy, ProxyError> {
        let path = self.lookup("NWFilterLookupByName", name.into()).await?;
        Ok(self.sibling(path))
    }

    pub async fn secret_lookup_by_uuid(&self, uuid: &str) -> Result<SecretProxy, ProxyError> {
        let path = self.lookup("SecretLookupByUUID", uuid.into()).await?;
        Ok(self.sibling(path))
    }

    pub async fn interface_lookup_by_name(&self, name: &str) -> Result<InterfaceProxy, ProxyError> {
        let path = self.lookup("InterfaceLookupByName", name.into()).await?;
        Ok(self.sibling(path))
    }

    /// Host capabilities XML
    pub async fn get_capabilities(&self) -> Result<String, ProxyError> {
        self.call_one("GetCapabilities", vec![]).await
    }

    /// libvirt library version as `major * 1_000_000 + minor * 1_000 + release`
    pub async fn lib_version(&self) -> Result<u64, ProxyError> {
        self.property("LibVersion").await
    }
}
