//! Entity proxy
//!
//! A [`Proxy`] stands for one remote object: its object path, the shared
//! connection it talks through, and the subscriptions registered on it.
//! Cloning a proxy is cheap and clones share the same subscriptions.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;
use virtbus_core::domain::{
    BusError, BusValue, EntityKind, FromBusValue, MethodCall, ObjectPath, SubscriptionId,
};

use crate::connection::Shared;
use crate::dispatcher::{self, DispatcherHandle, SignalFilter};
use crate::entities::Kind;
use crate::error::ProxyError;
use crate::event::SignalEvent;
use crate::hub::TapId;
use crate::registry::{Registered, Registry, SubscriptionInfo};

const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Resources held by one live subscription
#[derive(Debug)]
pub(crate) struct ActiveSubscription {
    tap: TapId,
    dispatcher: DispatcherHandle,
}

struct ProxyInner {
    shared: Arc<Shared>,
    path: ObjectPath,
    registry: Registry<ActiveSubscription>,
}

/// Typed handle on one remote object of kind `K`
///
/// Dropping every clone of a proxy does not cancel its subscriptions; they
/// stay live until unsubscribed or until the connection is closed.
pub struct Proxy<K: Kind> {
    inner: Arc<ProxyInner>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: Kind> Clone for Proxy<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _kind: PhantomData,
        }
    }
}

impl<K: Kind> fmt::Debug for Proxy<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("kind", &K::KIND)
            .field("path", &self.inner.path)
            .field("subscriptions", &self.inner.registry.len())
            .finish()
    }
}

impl<K: Kind> Proxy<K> {
    pub(crate) fn new(shared: Arc<Shared>, path: ObjectPath) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                shared,
                path,
                registry: Registry::new(),
            }),
            _kind: PhantomData,
        }
    }

    /// Another proxy on the same connection
    pub(crate) fn sibling<J: Kind>(&self, path: ObjectPath) -> Proxy<J> {
        Proxy::new(Arc::clone(&self.inner.shared), path)
    }

    pub fn path(&self) -> &ObjectPath {
        &self.inner.path
    }

    pub fn kind(&self) -> EntityKind {
        K::KIND
    }

    /// D-Bus interface this proxy calls into
    pub fn interface(&self) -> &'static str {
        K::KIND.interface_name()
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Subscribes `callback` to event `E` emitted by this object
    ///
    /// The callback runs on the blocking thread pool, once per matching
    /// signal, in arrival order. Passing `None` returns
    /// [`SubscriptionId::inert`] without touching the bus:
    ///
    /// ```ignore
    /// let id = domain.subscribe::<Reboot, fn(Reboot)>(None).await?;
    /// assert!(id.is_inert());
    /// ```
    ///
    /// # Errors
    ///
    /// [`ProxyError::Bus`] if the connection is closed or the bus refuses
    /// the match rule. Nothing is left registered in that case.
    pub async fn subscribe<E, F>(&self, callback: Option<F>) -> Result<SubscriptionId, ProxyError>
    where
        E: SignalEvent<Source = K>,
        F: Fn(E) + Send + Sync + 'static,
    {
        let Some(callback) = callback else {
            return Ok(SubscriptionId::inert());
        };
        let shared = &self.inner.shared;
        if shared.token.is_cancelled() {
            return Err(BusError::Closed.into());
        }

        let rule = E::match_rule();
        shared.rules.acquire(&rule).await?;
        // `close` may have run while the rule was being installed
        if shared.token.is_cancelled() {
            shared.rules.release(&rule).await;
            return Err(BusError::Closed.into());
        }

        let (tap, rx) = shared
            .hub
            .open_tap(SignalFilter::for_event::<E>(self.inner.path.clone()));
        let dispatcher = dispatcher::spawn::<E, F>(
            self.inner.path.clone(),
            rx,
            callback,
            shared.token.child_token(),
            Arc::clone(&shared.metrics),
        );
        let event = E::qualified_name();
        debug!(event = %event, path = %self.inner.path, tap = %tap, "Subscribed");

        let id = self.inner.registry.register(Registered {
            rule,
            event,
            handle: ActiveSubscription { tap, dispatcher },
        });
        shared.metrics.active_subscriptions.inc();
        if shared.token.is_cancelled() {
            // Closed after the check above; the gauge stays at zero once closed
            shared.metrics.active_subscriptions.set(0);
        }
        Ok(id)
    }

    /// Cancels a subscription
    ///
    /// Unknown, inert and already cancelled ids are ignored. After this
    /// returns no further signal is queued for the subscription; a callback
    /// already running is allowed to finish.
    pub async fn unsubscribe(&self, id: SubscriptionId) {
        let Some(entry) = self.inner.registry.unregister(id) else {
            debug!(subscription = %id, "Unsubscribe of unknown subscription ignored");
            return;
        };
        let shared = &self.inner.shared;
        entry.handle.dispatcher.stop();
        shared.hub.close_tap(entry.handle.tap);
        if !shared.token.is_cancelled() {
            shared.metrics.active_subscriptions.dec();
        }
        shared.rules.release(&entry.rule).await;
        debug!(subscription = %id, event = %entry.event, path = %self.inner.path, "Unsubscribed");
    }

    /// Snapshot of the live subscriptions on this proxy
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.inner.registry.snapshot()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.registry.len()
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Calls `method` of this object's interface
    pub async fn call(&self, method: &str, args: Vec<BusValue>) -> Result<Vec<BusValue>, ProxyError> {
        self.call_on(self.interface(), method, args).await
    }

    async fn call_on(
        &self,
        interface: &str,
        method: &str,
        args: Vec<BusValue>,
    ) -> Result<Vec<BusValue>, ProxyError> {
        let shared = &self.inner.shared;
        let call = MethodCall::new(
            shared.service.clone(),
            self.inner.path.clone(),
            interface,
            method,
            args,
        )?;
        Ok(shared.session.call(call).await?)
    }

    /// Calls `method` and decodes its single return value
    pub(crate) async fn call_one<T: FromBusValue>(
        &self,
        method: &str,
        args: Vec<BusValue>,
    ) -> Result<T, ProxyError> {
        let reply = self.call(method, args).await?;
        decode_single(&format!("{}.{method}", self.interface()), &reply)
    }

    /// Calls a method without return values; a body is ignored
    pub(crate) async fn call_unit(&self, method: &str, args: Vec<BusValue>) -> Result<(), ProxyError> {
        self.call(method, args).await.map(|_| ())
    }

    /// Reads property `name` of this object's interface
    pub async fn get_property(&self, name: &str) -> Result<BusValue, ProxyError> {
        let reply = self
            .call_on(
                PROPERTIES_INTERFACE,
                "Get",
                vec![BusValue::from(self.interface()), BusValue::from(name)],
            )
            .await?;
        decode_single(&format!("{PROPERTIES_INTERFACE}.Get({name})"), &reply)
    }

    /// Reads and decodes property `name`
    pub(crate) async fn property<T: FromBusValue>(&self, name: &str) -> Result<T, ProxyError> {
        let value = self.get_property(name).await?;
        value.decode().ok_or_else(|| {
            ProxyError::unexpected(
                format!("{}.{name}", self.interface()),
                format!("property has type {}", value.type_name()),
            )
        })
    }
}

/// Decodes a reply that must carry exactly one value
fn decode_single<T: FromBusValue>(method: &str, reply: &[BusValue]) -> Result<T, ProxyError> {
    match reply {
        [value] => value.decode().ok_or_else(|| {
            ProxyError::unexpected(method, format!("cannot decode {}", value.type_name()))
        }),
        other => Err(ProxyError::unexpected(
            method,
            format!("expected one value, got {}", other.len()),
        )),
    }
}
