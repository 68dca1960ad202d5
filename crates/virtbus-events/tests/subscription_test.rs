//! Integration test: MemoryBus → Connection → Proxy subscriptions
//!
//! Signals are injected on an in-memory bus and travel through the real
//! pump, hub and dispatchers. Negative assertions use a sentinel signal:
//! a subscription sees its signals in emission order, so once the sentinel
//! arrives every earlier signal has been either delivered or dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use virtbus_core::config::Config;
use virtbus_core::domain::{BusError, BusValue, MatchRule, MethodCall, ObjectPath, SignalMessage};
use virtbus_core::ports::{BusSession, MatchOp, MemoryBus, SignalStream};
use virtbus_events::catalog::{DomainEvent, Reboot};
use virtbus_events::{kind, Connection, DomainProxy, DropReason, ProxyError, SignalEvent};

/// Two-argument state change used by the dispatch scenarios
#[derive(Debug, Clone, PartialEq)]
struct Lifecycle {
    state: i32,
    reason: i32,
}

impl SignalEvent for Lifecycle {
    type Source = kind::Domain;
    const INTERFACE: &'static str = "org.example.Entity";
    const MEMBER: &'static str = "Lifecycle";
    const ARITY: usize = 2;

    fn decode(args: &[BusValue]) -> Option<Self> {
        match args {
            [state, reason] => Some(Self {
                state: state.decode()?,
                reason: reason.decode()?,
            }),
            _ => None,
        }
    }
}

const WAIT: Duration = Duration::from_secs(5);

fn setup() -> (Arc<MemoryBus>, Connection) {
    let bus = Arc::new(MemoryBus::new());
    let conn = Connection::new(bus.clone(), &Config::default()).unwrap();
    (bus, conn)
}

fn object(path: &str) -> ObjectPath {
    ObjectPath::new(path).unwrap()
}

fn lifecycle(path: &str, state: i32, reason: i32) -> SignalMessage {
    SignalMessage::new(
        object(path),
        Lifecycle::INTERFACE,
        Lifecycle::MEMBER,
        vec![BusValue::I32(state), BusValue::I32(reason)],
    )
}

/// Callback forwarding every event into a channel
fn recorder<E: Send + 'static>() -> (
    impl Fn(E) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<E>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback = move |event: E| {
        let _ = tx.send(event);
    };
    (callback, rx)
}

async fn next<E>(rx: &mut mpsc::UnboundedReceiver<E>) -> E {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("callback channel closed")
}

#[tokio::test]
async fn test_delivers_only_matching_object() {
    let (bus, conn) = setup();
    let entity: DomainProxy = conn.proxy(object("/entity/1"));
    let (callback, mut rx) = recorder::<Lifecycle>();

    let id = entity.subscribe::<Lifecycle, _>(Some(callback)).await.unwrap();
    assert!(!id.is_inert());
    assert_eq!(entity.subscription_count(), 1);

    // Another object, then the real one
    bus.emit(lifecycle("/entity/2", 1, 1));
    bus.emit(lifecycle("/entity/1", 7, 2));
    bus.emit(lifecycle("/entity/1", 99, 99));

    assert_eq!(next(&mut rx).await, Lifecycle { state: 7, reason: 2 });
    assert_eq!(next(&mut rx).await.state, 99);
    assert_eq!(conn.metrics().dropped(DropReason::Path), 1);
    // Delivery of an event is recorded before the next one is dispatched
    assert!(conn.metrics().delivered("org.example.Entity.Lifecycle") >= 1);
}

#[tokio::test]
async fn test_no_delivery_after_unsubscribe() {
    let (bus, conn) = setup();
    let entity: DomainProxy = conn.proxy(object("/entity/1"));
    let (callback, mut rx) = recorder::<Lifecycle>();
    let (witness, mut witness_rx) = recorder::<Lifecycle>();

    let id = entity.subscribe::<Lifecycle, _>(Some(callback)).await.unwrap();
    entity.subscribe::<Lifecycle, _>(Some(witness)).await.unwrap();

    bus.emit(lifecycle("/entity/1", 1, 0));
    assert_eq!(next(&mut rx).await.state, 1);
    assert_eq!(next(&mut witness_rx).await.state, 1);

    entity.unsubscribe(id).await;
    bus.emit(lifecycle("/entity/1", 2, 0));
    assert_eq!(next(&mut witness_rx).await.state, 2);

    assert!(rx.try_recv().is_err());
    assert_eq!(entity.subscription_count(), 1);
}

#[tokio::test]
async fn test_filters_by_arity_and_member() {
    let (bus, conn) = setup();
    let entity: DomainProxy = conn.proxy(object("/entity/1"));
    let (callback, mut rx) = recorder::<Lifecycle>();
    entity.subscribe::<Lifecycle, _>(Some(callback)).await.unwrap();

    bus.emit(SignalMessage::new(
        object("/entity/1"),
        Lifecycle::INTERFACE,
        Lifecycle::MEMBER,
        vec![BusValue::I32(1)],
    ));
    bus.emit(SignalMessage::new(
        object("/entity/1"),
        Lifecycle::INTERFACE,
        "Other",
        vec![BusValue::I32(1), BusValue::I32(2)],
    ));
    // Right shape, wrong argument types
    bus.emit(SignalMessage::new(
        object("/entity/1"),
        Lifecycle::INTERFACE,
        Lifecycle::MEMBER,
        vec![BusValue::from("a"), BusValue::from("b")],
    ));
    bus.emit(lifecycle("/entity/1", 42, 0));

    assert_eq!(next(&mut rx).await.state, 42);
    let metrics = conn.metrics();
    assert_eq!(metrics.dropped(DropReason::Arity), 1);
    assert_eq!(metrics.dropped(DropReason::Member), 1);
    assert_eq!(metrics.dropped(DropReason::Decode), 1);
}

#[tokio::test]
async fn test_delivery_is_fifo() {
    let (bus, conn) = setup();
    let entity: DomainProxy = conn.proxy(object("/entity/1"));
    let (callback, mut rx) = recorder::<Lifecycle>();
    entity.subscribe::<Lifecycle, _>(Some(callback)).await.unwrap();

    for state in 0..200 {
        bus.emit(lifecycle("/entity/1", state, 0));
    }
    for expected in 0..200 {
        assert_eq!(next(&mut rx).await.state, expected);
    }
}

#[tokio::test]
async fn test_unsubscribe_is_idempotent() {
    let (bus, conn) = setup();
    let entity: DomainProxy = conn.proxy(object("/entity/1"));
    let (callback, _rx) = recorder::<Lifecycle>();

    let id = entity.subscribe::<Lifecycle, _>(Some(callback)).await.unwrap();
    entity.unsubscribe(id).await;
    entity.unsubscribe(id).await;
    entity.unsubscribe(virtbus_events::SubscriptionId::new()).await;
    entity.unsubscribe(virtbus_events::SubscriptionId::inert()).await;

    assert_eq!(entity.subscription_count(), 0);
    assert_eq!(
        bus.match_ops(),
        vec![
            MatchOp::Add(Lifecycle::match_rule()),
            MatchOp::Remove(Lifecycle::match_rule()),
        ]
    );
}

#[tokio::test]
async fn test_subscribe_without_callback_is_inert() {
    let (bus, conn) = setup();
    let dom: DomainProxy = conn.proxy(object("/org/libvirt/QEMU/domain/_1"));

    let id = dom.subscribe::<Reboot, fn(Reboot)>(None).await.unwrap();
    assert!(id.is_inert());
    assert_eq!(dom.subscription_count(), 0);
    assert!(bus.match_ops().is_empty());

    dom.unsubscribe(id).await;
    assert!(bus.match_ops().is_empty());
}

#[tokio::test]
async fn test_match_rule_shared_between_objects() {
    let (bus, conn) = setup();
    let first: DomainProxy = conn.proxy(object("/entity/1"));
    let second: DomainProxy = conn.proxy(object("/entity/2"));
    let (cb1, _rx1) = recorder::<Lifecycle>();
    let (cb2, mut rx2) = recorder::<Lifecycle>();
    let rule = Lifecycle::match_rule();

    let id1 = first.subscribe::<Lifecycle, _>(Some(cb1)).await.unwrap();
    let id2 = second.subscribe::<Lifecycle, _>(Some(cb2)).await.unwrap();
    assert_eq!(bus.installed_count(&rule), 1);
    assert_eq!(conn.active_match_rules().await, vec![(rule.clone(), 2)]);

    first.unsubscribe(id1).await;
    assert_eq!(bus.installed_count(&rule), 1);

    // The surviving subscription still receives
    bus.emit(lifecycle("/entity/2", 3, 3));
    assert_eq!(next(&mut rx2).await.state, 3);

    second.unsubscribe(id2).await;
    assert_eq!(bus.installed_count(&rule), 0);
    assert_eq!(
        bus.match_ops(),
        vec![MatchOp::Add(rule.clone()), MatchOp::Remove(rule)]
    );
    assert!(conn.active_match_rules().await.is_empty());
}

#[tokio::test]
async fn test_clones_share_subscriptions() {
    let (_bus, conn) = setup();
    let entity: DomainProxy = conn.proxy(object("/entity/1"));
    let clone = entity.clone();
    let (callback, _rx) = recorder::<Lifecycle>();

    let id = entity.subscribe::<Lifecycle, _>(Some(callback)).await.unwrap();
    assert_eq!(clone.subscription_count(), 1);
    assert_eq!(clone.subscriptions()[0].event, "org.example.Entity.Lifecycle");

    clone.unsubscribe(id).await;
    assert_eq!(entity.subscription_count(), 0);
}

#[tokio::test]
async fn test_callback_panic_does_not_stop_dispatch() {
    let (bus, conn) = setup();
    let entity: DomainProxy = conn.proxy(object("/entity/1"));
    let (tx, mut rx) = mpsc::unbounded_channel();

    entity
        .subscribe::<Lifecycle, _>(Some(move |event: Lifecycle| {
            if event.state == 0 {
                panic!("subscriber bug");
            }
            let _ = tx.send(event.state);
        }))
        .await
        .unwrap();

    bus.emit(lifecycle("/entity/1", 0, 0));
    bus.emit(lifecycle("/entity/1", 1, 0));
    bus.emit(lifecycle("/entity/1", 2, 0));

    assert_eq!(next(&mut rx).await, 1);
    assert_eq!(next(&mut rx).await, 2);
    assert!(rx.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_callback_does_not_block_others() {
    let (bus, conn) = setup();
    let slow: DomainProxy = conn.proxy(object("/entity/slow"));
    let fast: DomainProxy = conn.proxy(object("/entity/fast"));
    let started = Arc::new(AtomicUsize::new(0));

    let slow_started = Arc::clone(&started);
    slow.subscribe::<Lifecycle, _>(Some(move |_: Lifecycle| {
        slow_started.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_secs(2));
    }))
    .await
    .unwrap();
    let (callback, mut rx) = recorder::<Lifecycle>();
    fast.subscribe::<Lifecycle, _>(Some(callback)).await.unwrap();

    bus.emit(lifecycle("/entity/slow", 1, 0));
    bus.emit(lifecycle("/entity/slow", 2, 0));
    bus.emit(lifecycle("/entity/fast", 3, 0));

    let event = tokio::time::timeout(Duration::from_millis(1500), rx.recv())
        .await
        .expect("fast subscriber was held up by the slow one")
        .unwrap();
    assert_eq!(event.state, 3);
    assert!(started.load(Ordering::SeqCst) <= 1);
}

#[tokio::test]
async fn test_slow_callback_keeps_its_signals_under_foreign_traffic() {
    let (bus, conn) = setup();
    let entity: DomainProxy = conn.proxy(object("/entity/1"));
    let (tx, mut rx) = mpsc::unbounded_channel();
    entity
        .subscribe::<Lifecycle, _>(Some(move |event: Lifecycle| {
            let _ = tx.send(event.state);
            if event.state == 1 {
                std::thread::sleep(Duration::from_millis(500));
            }
        }))
        .await
        .unwrap();

    bus.emit(lifecycle("/entity/1", 1, 0));
    assert_eq!(next(&mut rx).await, 1);

    // More traffic for other objects and members than one queue holds
    let capacity = Config::default().dispatch.queue_capacity;
    for n in 0..capacity + 100 {
        bus.emit(lifecycle("/entity/2", n as i32, 0));
        bus.emit(SignalMessage::new(object("/entity/1"), Lifecycle::INTERFACE, "Other", vec![]));
    }
    bus.emit(lifecycle("/entity/1", 42, 0));

    assert_eq!(next(&mut rx).await, 42);
    let metrics = conn.metrics();
    assert_eq!(metrics.dropped(DropReason::Overflow), 0);
    assert_eq!(metrics.dropped(DropReason::Path), (capacity + 100) as u64);
    assert_eq!(metrics.dropped(DropReason::Member), (capacity + 100) as u64);
}

/// Session whose first `add_match` waits until the test releases it
struct GatedBus {
    inner: MemoryBus,
    entered: Notify,
    release: Notify,
}

#[async_trait::async_trait]
impl BusSession for GatedBus {
    async fn call(&self, call: MethodCall) -> Result<Vec<BusValue>, BusError> {
        self.inner.call(call).await
    }

    async fn add_match(&self, rule: &MatchRule) -> Result<(), BusError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.add_match(rule).await
    }

    async fn remove_match(&self, rule: &MatchRule) -> Result<(), BusError> {
        self.inner.remove_match(rule).await
    }

    fn signals(&self) -> SignalStream {
        self.inner.signals()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_during_subscribe_leaves_no_rule() {
    let bus = Arc::new(GatedBus {
        inner: MemoryBus::new(),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let conn = Connection::new(bus.clone(), &Config::default()).unwrap();
    let entity: DomainProxy = conn.proxy(object("/entity/1"));

    let subscribe = tokio::spawn({
        let entity = entity.clone();
        async move {
            entity
                .subscribe::<Lifecycle, _>(Some(|_: Lifecycle| {}))
                .await
        }
    });
    bus.entered.notified().await;

    // AddMatch is in flight; close cancels and then waits on the rule lock
    let closing = tokio::spawn({
        let conn = conn.clone();
        async move { conn.close().await }
    });
    tokio::time::timeout(WAIT, async {
        while !conn.is_closed() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    bus.release.notify_one();

    let err = subscribe.await.unwrap().unwrap_err();
    assert!(matches!(err, ProxyError::Bus(BusError::Closed)));
    closing.await.unwrap();

    assert_eq!(bus.inner.installed_total(), 0);
    assert!(conn.active_match_rules().await.is_empty());
    assert_eq!(entity.subscription_count(), 0);
    assert_eq!(conn.metrics().active_subscriptions.get(), 0);

    // A later subscribe is refused before any AddMatch
    let ops = bus.inner.match_ops().len();
    let err = entity
        .subscribe::<Lifecycle, _>(Some(|_: Lifecycle| {}))
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::Bus(BusError::Closed)));
    assert_eq!(bus.inner.match_ops().len(), ops);
}

#[tokio::test]
async fn test_add_match_failure_leaves_nothing_registered() {
    let (bus, conn) = setup();
    let entity: DomainProxy = conn.proxy(object("/entity/1"));
    bus.fail_add_match(Some("org.freedesktop.DBus.Error.AccessDenied"));

    let (callback, _rx) = recorder::<Lifecycle>();
    let err = entity
        .subscribe::<Lifecycle, _>(Some(callback))
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::Bus(BusError::MatchRule { .. })));
    assert_eq!(entity.subscription_count(), 0);
    assert!(conn.active_match_rules().await.is_empty());

    // A later attempt retries the AddMatch
    bus.fail_add_match(None);
    let (callback, _rx) = recorder::<Lifecycle>();
    entity.subscribe::<Lifecycle, _>(Some(callback)).await.unwrap();
    assert_eq!(bus.installed_count(&Lifecycle::match_rule()), 1);
}

#[tokio::test]
async fn test_remove_match_failure_still_unsubscribes() {
    let (bus, conn) = setup();
    let entity: DomainProxy = conn.proxy(object("/entity/1"));
    let (callback, _rx) = recorder::<Lifecycle>();
    let id = entity.subscribe::<Lifecycle, _>(Some(callback)).await.unwrap();

    bus.fail_remove_match(Some("org.freedesktop.DBus.Error.NoReply"));
    entity.unsubscribe(id).await;

    assert_eq!(entity.subscription_count(), 0);
    assert!(conn.active_match_rules().await.is_empty());
}

#[tokio::test]
async fn test_close_removes_rules_and_refuses_subscriptions() {
    let (bus, conn) = setup();
    let root = conn.connect();
    let dom: DomainProxy = conn.proxy(object("/org/libvirt/QEMU/domain/_1"));
    let (cb1, _rx1) = recorder::<DomainEvent>();
    let (cb2, _rx2) = recorder::<Reboot>();

    let id = root.subscribe::<DomainEvent, _>(Some(cb1)).await.unwrap();
    dom.subscribe::<Reboot, _>(Some(cb2)).await.unwrap();
    assert_eq!(bus.installed_total(), 2);

    conn.close().await;
    assert!(conn.is_closed());
    assert_eq!(bus.installed_total(), 0);
    assert!(conn.active_match_rules().await.is_empty());

    let (callback, _rx) = recorder::<Reboot>();
    let err = dom.subscribe::<Reboot, _>(Some(callback)).await.unwrap_err();
    assert!(matches!(err, ProxyError::Bus(BusError::Closed)));

    // Bookkeeping still works; no extra RemoveMatch is sent
    let ops_before = bus.match_ops().len();
    root.unsubscribe(id).await;
    assert_eq!(root.subscription_count(), 0);
    assert_eq!(bus.match_ops().len(), ops_before);
}

#[tokio::test]
async fn test_connection_event_on_driver_object() {
    let (bus, conn) = setup();
    let root = conn.connect();
    let (callback, mut rx) = recorder::<DomainEvent>();
    root.subscribe::<DomainEvent, _>(Some(callback)).await.unwrap();

    bus.emit(SignalMessage::new(
        object("/org/libvirt/QEMU"),
        "org.libvirt.Connect",
        "DomainEvent",
        vec![
            BusValue::ObjectPath(object("/org/libvirt/QEMU/domain/_7")),
            BusValue::I32(5),
            BusValue::I32(1),
        ],
    ));

    let event = next(&mut rx).await;
    assert_eq!(event.domain, object("/org/libvirt/QEMU/domain/_7"));
    assert_eq!(
        event.lifecycle(),
        Some(virtbus_events::catalog::DomainLifecycle::Stopped)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_subscribe_unsubscribe() {
    let (bus, conn) = setup();
    let rule: MatchRule = Lifecycle::match_rule();

    let mut tasks = Vec::new();
    for worker in 0..8 {
        let entity: DomainProxy = conn.proxy(object(&format!("/entity/{worker}")));
        tasks.push(tokio::spawn(async move {
            for _ in 0..25 {
                let id = entity
                    .subscribe::<Lifecycle, _>(Some(|_: Lifecycle| {}))
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
                entity.unsubscribe(id).await;
            }
            entity.subscription_count()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), 0);
    }

    assert!(conn.active_match_rules().await.is_empty());
    assert_eq!(bus.installed_count(&rule), 0);
    let adds = bus
        .match_ops()
        .iter()
        .filter(|op| matches!(op, MatchOp::Add(_)))
        .count();
    let removes = bus.match_ops().len() - adds;
    assert_eq!(adds, removes);
}

#[tokio::test]
async fn test_bus_disconnect_terminates_dispatch() {
    let (bus, conn) = setup();
    let entity: DomainProxy = conn.proxy(object("/entity/1"));
    let (callback, mut rx) = recorder::<Lifecycle>();
    entity.subscribe::<Lifecycle, _>(Some(callback)).await.unwrap();

    bus.emit(lifecycle("/entity/1", 1, 0));
    assert_eq!(next(&mut rx).await.state, 1);

    // The dispatcher drops the callback, and its sender, when it exits
    bus.close();
    let closed = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
    assert!(closed.is_none());
}
