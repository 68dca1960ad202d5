//! Signal hub
//!
//! The fan-out point between the session's single inbound stream and the
//! per-subscription queues ("taps"). The pump task owns the stream and
//! copies each signal into every open tap whose filter admits it:
//!
//! ```text
//! BusSession::signals() ──► pump ──► publish ──┬──► tap 1 ──► dispatcher
//!                                              ├──► tap 2 ──► dispatcher
//!                                              └──► tap n ──► dispatcher
//! ```
//!
//! Signals for other objects or members never enter a tap, so a queue only
//! ever holds its own subscription's backlog. Publishing uses `try_send`:
//! a subscriber that falls behind by a full queue loses signals without
//! slowing anybody else down.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use virtbus_core::domain::SignalMessage;
use virtbus_core::ports::SignalStream;

use crate::dispatcher::{DropReason, SignalFilter};
use crate::metrics::DispatchMetrics;

/// A signal shared between every tap it was published to
pub type SharedSignal = Arc<SignalMessage>;

/// Identifier of one tap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TapId(u64);

impl fmt::Display for TapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tap-{}", self.0)
    }
}

struct Tap {
    filter: SignalFilter,
    tx: mpsc::Sender<SharedSignal>,
}

/// Fan-out of inbound signals into bounded per-subscription queues
pub struct SignalHub {
    taps: DashMap<TapId, Tap>,
    next_id: AtomicU64,
    capacity: usize,
    metrics: Arc<DispatchMetrics>,
}

impl SignalHub {
    /// `capacity` is the queue length of every tap; zero is raised to one
    pub fn new(capacity: usize, metrics: Arc<DispatchMetrics>) -> Self {
        Self {
            taps: DashMap::new(),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            metrics,
        }
    }

    /// Opens a tap receiving the signals `filter` admits
    pub fn open_tap(&self, filter: SignalFilter) -> (TapId, mpsc::Receiver<SharedSignal>) {
        let id = TapId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.capacity);
        debug!(tap = %id, path = %filter.path, member = filter.member, "Tap opened");
        self.taps.insert(id, Tap { filter, tx });
        (id, rx)
    }

    /// Closes a tap; its receiver sees the end of the channel
    pub fn close_tap(&self, id: TapId) {
        if self.taps.remove(&id).is_some() {
            debug!(tap = %id, "Tap closed");
        }
    }

    /// Closes every tap
    pub fn close_all(&self) {
        self.taps.clear();
    }

    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    /// Copies `signal` into every admitting tap without waiting
    ///
    /// A tap whose filter rejects the signal counts a drop with the
    /// filter's reason. Returns the number of taps that accepted it.
    pub fn publish(&self, signal: SharedSignal) -> usize {
        self.metrics.record_received();

        let mut accepted = 0;
        let mut closed = Vec::new();
        for tap in self.taps.iter() {
            if let Err(reason) = tap.filter.admit(&signal) {
                self.metrics.record_drop(reason);
                continue;
            }
            match tap.tx.try_send(Arc::clone(&signal)) {
                Ok(()) => accepted += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        tap = %tap.key(),
                        interface = %signal.interface,
                        member = %signal.member,
                        "Subscription queue full, dropping signal"
                    );
                    self.metrics.record_drop(DropReason::Overflow);
                }
                Err(TrySendError::Closed(_)) => closed.push(*tap.key()),
            }
        }
        // Removing while iterating would deadlock the shard
        for id in closed {
            self.taps.remove(&id);
            debug!(tap = %id, "Removed tap with closed receiver");
        }
        accepted
    }

    /// Spawns the task that drains `stream` into [`publish`](Self::publish)
    ///
    /// The task stops when the stream ends or `token` is cancelled and
    /// closes every tap on its way out.
    pub fn spawn_pump(
        self: &Arc<Self>,
        mut stream: SignalStream,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Signal pump cancelled");
                        break;
                    }
                    next = stream.next() => match next {
                        Some(signal) => {
                            hub.publish(Arc::new(signal));
                        }
                        None => {
                            info!("Inbound signal stream ended");
                            break;
                        }
                    },
                }
            }
            hub.close_all();
        })
    }
}

impl fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalHub")
            .field("taps", &self.taps.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use virtbus_core::domain::ObjectPath;
    use virtbus_core::ports::{BusSession, MemoryBus};

    use super::*;

    fn hub(capacity: usize) -> (Arc<SignalHub>, Arc<DispatchMetrics>) {
        let metrics = Arc::new(DispatchMetrics::new().unwrap());
        (Arc::new(SignalHub::new(capacity, metrics.clone())), metrics)
    }

    fn path(path: &str) -> ObjectPath {
        ObjectPath::new(path).unwrap()
    }

    fn filter(on: &str, member: &'static str) -> SignalFilter {
        SignalFilter {
            path: path(on),
            interface: "org.example.Test",
            member,
            arity: 0,
        }
    }

    fn signal(on: &str, member: &str) -> SharedSignal {
        Arc::new(SignalMessage::new(path(on), "org.example.Test", member, vec![]))
    }

    #[tokio::test]
    async fn test_publish_fans_out_to_admitting_taps() {
        let (hub, metrics) = hub(4);
        let (_, mut a) = hub.open_tap(filter("/a", "One"));
        let (_, mut b) = hub.open_tap(filter("/a", "One"));
        let (_, mut other) = hub.open_tap(filter("/b", "One"));

        assert_eq!(hub.publish(signal("/a", "One")), 2);
        assert_eq!(a.recv().await.unwrap().member, "One");
        assert_eq!(b.recv().await.unwrap().member, "One");
        assert!(other.try_recv().is_err());
        assert_eq!(metrics.signals_received_total.get(), 1);
        assert_eq!(metrics.dropped(DropReason::Path), 1);
    }

    #[tokio::test]
    async fn test_rejected_signals_do_not_take_queue_space() {
        let (hub, metrics) = hub(1);
        let (_, mut rx) = hub.open_tap(filter("/a", "One"));

        for _ in 0..10 {
            hub.publish(signal("/b", "One"));
            hub.publish(signal("/a", "Two"));
        }
        assert_eq!(hub.publish(signal("/a", "One")), 1);
        assert_eq!(rx.recv().await.unwrap().path, path("/a"));
        assert_eq!(metrics.dropped(DropReason::Path), 10);
        assert_eq!(metrics.dropped(DropReason::Member), 10);
        assert_eq!(metrics.dropped(DropReason::Overflow), 0);
    }

    #[tokio::test]
    async fn test_full_tap_drops_only_for_itself() {
        let (hub, metrics) = hub(1);
        let (_, mut slow) = hub.open_tap(filter("/a", "One"));
        let (_, mut fast) = hub.open_tap(filter("/a", "One"));

        hub.publish(signal("/a", "One"));
        assert!(fast.recv().await.is_some());
        // `slow` still holds the first signal; the second overflows there only
        assert_eq!(hub.publish(signal("/a", "One")), 1);
        assert!(fast.recv().await.is_some());
        assert!(slow.recv().await.is_some());
        assert!(slow.try_recv().is_err());
        assert_eq!(metrics.dropped(DropReason::Overflow), 1);
    }

    #[tokio::test]
    async fn test_close_tap_is_idempotent() {
        let (hub, _) = hub(4);
        let (id, mut rx) = hub.open_tap(filter("/a", "One"));
        hub.close_tap(id);
        hub.close_tap(id);
        assert!(rx.recv().await.is_none());
        assert_eq!(hub.publish(signal("/a", "One")), 0);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let (hub, _) = hub(4);
        let (_, rx) = hub.open_tap(filter("/a", "One"));
        drop(rx);
        assert_eq!(hub.tap_count(), 1);
        hub.publish(signal("/a", "One"));
        assert_eq!(hub.tap_count(), 0);
    }

    #[tokio::test]
    async fn test_pump_publishes_until_stream_ends() {
        let bus = MemoryBus::new();
        let (hub, _) = hub(8);
        let (_, mut one) = hub.open_tap(filter("/", "One"));
        let (_, mut two) = hub.open_tap(filter("/", "Two"));
        let pump = hub.spawn_pump(bus.signals(), CancellationToken::new());

        bus.emit(SignalMessage::new(ObjectPath::root(), "org.example.Test", "One", vec![]));
        bus.emit(SignalMessage::new(ObjectPath::root(), "org.example.Test", "Two", vec![]));
        assert_eq!(one.recv().await.unwrap().member, "One");
        assert_eq!(two.recv().await.unwrap().member, "Two");

        bus.close();
        pump.await.unwrap();
        assert!(one.recv().await.is_none());
        assert!(two.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_pump_stops_on_cancel() {
        let bus = MemoryBus::new();
        let (hub, _) = hub(8);
        let (_, mut rx) = hub.open_tap(filter("/", "One"));
        let token = CancellationToken::new();
        let pump = hub.spawn_pump(bus.signals(), token.clone());

        token.cancel();
        pump.await.unwrap();
        assert!(rx.recv().await.is_none());
        assert_eq!(hub.tap_count(), 0);
    }
}
