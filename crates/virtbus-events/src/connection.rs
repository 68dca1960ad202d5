//! Shared connection
//!
//! A [`Connection`] wraps one [`BusSession`] and everything derived from it
//! that all proxies share: the signal hub and its pump task, the match rule
//! counts, the metrics and the cancellation root. Proxies created from it
//! hold an `Arc` to the same state; there is no process-wide connection.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use virtbus_core::config::Config;
use virtbus_core::domain::{Driver, MatchRule, ObjectPath};
use virtbus_core::ports::BusSession;

use crate::entities::{ConnectProxy, Kind};
use crate::error::ProxyError;
use crate::hub::SignalHub;
use crate::match_rules::MatchRuleManager;
use crate::metrics::DispatchMetrics;
use crate::proxy::Proxy;

/// State shared by a connection and all of its proxies
pub(crate) struct Shared {
    pub(crate) session: Arc<dyn BusSession>,
    pub(crate) hub: Arc<SignalHub>,
    pub(crate) rules: MatchRuleManager,
    pub(crate) metrics: Arc<DispatchMetrics>,
    /// Bus name calls are addressed to
    pub(crate) service: String,
    pub(crate) driver: Driver,
    /// Parent of every dispatcher token; cancelled by [`Connection::close`]
    pub(crate) token: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

/// Handle on one shared bus connection
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Wraps `session` and starts the signal pump
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`ProxyError::Config`] when `config` does not validate; nothing is
    /// started in that case.
    pub fn new(session: Arc<dyn BusSession>, config: &Config) -> Result<Self, ProxyError> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ProxyError::Config(errors));
        }
        let metrics = Arc::new(DispatchMetrics::new()?);
        let hub = Arc::new(SignalHub::new(
            config.dispatch.queue_capacity,
            Arc::clone(&metrics),
        ));
        let token = CancellationToken::new();
        let pump = hub.spawn_pump(session.signals(), token.clone());

        info!(
            service = %config.bus.service,
            driver = %config.bus.driver,
            queue_capacity = config.dispatch.queue_capacity,
            "Connection ready"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                rules: MatchRuleManager::new(
                    Arc::clone(&session),
                    Arc::clone(&metrics),
                    token.clone(),
                ),
                session,
                hub,
                metrics,
                service: config.bus.service.clone(),
                driver: config.bus.driver,
                token,
                pump: Mutex::new(Some(pump)),
            }),
        })
    }

    /// Proxy on the driver's `org.libvirt.Connect` object
    pub fn connect(&self) -> ConnectProxy {
        Proxy::new(Arc::clone(&self.shared), self.shared.driver.connect_path())
    }

    /// Proxy of kind `K` on `path`
    pub fn proxy<K: Kind>(&self, path: ObjectPath) -> Proxy<K> {
        Proxy::new(Arc::clone(&self.shared), path)
    }

    /// Like [`proxy`](Self::proxy), with an empty path meaning the
    /// driver's connection object
    pub fn proxy_or_root<K: Kind>(&self, path: &str) -> Result<Proxy<K>, ProxyError> {
        let path = if path.is_empty() {
            self.shared.driver.connect_path()
        } else {
            ObjectPath::new(path)?
        };
        Ok(self.proxy(path))
    }

    pub fn driver(&self) -> Driver {
        self.shared.driver
    }

    pub fn session(&self) -> &Arc<dyn BusSession> {
        &self.shared.session
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.shared.metrics
    }

    /// Installed match rules with their reference counts
    pub async fn active_match_rules(&self) -> Vec<(MatchRule, usize)> {
        self.shared.rules.active_rules().await
    }

    pub fn is_closed(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    /// Stops the pump and every dispatcher and removes all match rules
    ///
    /// Safe to call more than once. Proxies stay usable for bookkeeping:
    /// `unsubscribe` still succeeds, `subscribe` fails with
    /// [`BusError::Closed`](virtbus_core::domain::BusError::Closed).
    pub async fn close(&self) {
        if self.shared.token.is_cancelled() {
            return;
        }
        self.shared.token.cancel();
        self.shared.hub.close_all();
        self.shared.metrics.active_subscriptions.set(0);

        let pump = self
            .shared
            .pump
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(pump) = pump {
            let _ = pump.await;
        }

        let removed = self.shared.rules.release_all().await;
        info!(match_rules_removed = removed, "Connection closed");
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("service", &self.shared.service)
            .field("driver", &self.shared.driver)
            .field("closed", &self.is_closed())
            .finish()
    }
}
