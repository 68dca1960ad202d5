//! Signal dispatcher
//!
//! One task per subscription. The hub only queues signals that pass the
//! subscription's [`SignalFilter`]; the task reads its tap in order,
//! decodes each signal and runs the callback.
//!
//! ## Lifecycle
//!
//! ```text
//! Active ──stop()──► Draining ──task exits──► Terminated
//!    └────────── tap closed / cancelled ─────────┘
//! ```
//!
//! While draining, a callback already running finishes; queued signals are
//! discarded. Callbacks run on the blocking pool and are awaited one at a
//! time, which keeps delivery FIFO per subscription and keeps user code
//! off the async workers. A panicking callback is logged and counted, and
//! the next signal is processed normally.

use std::any::Any;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use virtbus_core::domain::{ObjectPath, SignalMessage};

use crate::event::SignalEvent;
use crate::hub::SharedSignal;
use crate::metrics::DispatchMetrics;

// ============================================================================
// Filter
// ============================================================================

/// Why a subscription discarded a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Emitted by another object
    Path,
    /// Different interface or member
    Member,
    /// Wrong number of arguments
    Arity,
    /// Arguments did not decode into the event's types
    Decode,
    /// The subscription's queue was full
    Overflow,
}

impl DropReason {
    /// Metrics label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DropReason::Path => "path",
            DropReason::Member => "member",
            DropReason::Arity => "arity",
            DropReason::Decode => "decode",
            DropReason::Overflow => "overflow",
        }
    }
}

/// Structural checks applied before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalFilter {
    pub path: ObjectPath,
    pub interface: &'static str,
    pub member: &'static str,
    pub arity: usize,
}

impl SignalFilter {
    /// Filter for event `E` emitted by the object at `path`
    pub fn for_event<E: SignalEvent>(path: ObjectPath) -> Self {
        Self {
            path,
            interface: E::INTERFACE,
            member: E::MEMBER,
            arity: E::ARITY,
        }
    }

    /// Checks path, then interface and member, then argument count
    pub fn admit(&self, signal: &SignalMessage) -> Result<(), DropReason> {
        if signal.path != self.path {
            return Err(DropReason::Path);
        }
        if !signal.is(self.interface, self.member) {
            return Err(DropReason::Member);
        }
        if signal.args.len() != self.arity {
            return Err(DropReason::Arity);
        }
        Ok(())
    }
}

// ============================================================================
// State
// ============================================================================

/// Lifecycle state of a dispatcher task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Active,
    Draining,
    Terminated,
}

const ACTIVE: u8 = 0;
const DRAINING: u8 = 1;
const TERMINATED: u8 = 2;

impl DispatcherState {
    fn from_u8(value: u8) -> Self {
        match value {
            ACTIVE => DispatcherState::Active,
            DRAINING => DispatcherState::Draining,
            _ => DispatcherState::Terminated,
        }
    }
}

/// Owner's handle on a running dispatcher
#[derive(Debug)]
pub struct DispatcherHandle {
    token: CancellationToken,
    state: Arc<AtomicU8>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    pub fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Requests the task to stop after the callback in flight, if any
    pub fn stop(&self) {
        let _ = self
            .state
            .compare_exchange(ACTIVE, DRAINING, Ordering::AcqRel, Ordering::Acquire);
        self.token.cancel();
    }

    /// Stops the task and waits for it to exit
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Dispatcher task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// ============================================================================
// Task
// ============================================================================

/// Spawns the dispatcher for event `E` emitted by `path`, reading from `tap`
///
/// `token` should be a child of the connection token so that closing the
/// connection stops every dispatcher.
pub fn spawn<E, F>(
    path: ObjectPath,
    mut tap: mpsc::Receiver<SharedSignal>,
    callback: F,
    token: CancellationToken,
    metrics: Arc<DispatchMetrics>,
) -> DispatcherHandle
where
    E: SignalEvent,
    F: Fn(E) + Send + Sync + 'static,
{
    let state = Arc::new(AtomicU8::new(ACTIVE));
    let callback = Arc::new(callback);
    let event_name = E::qualified_name();

    let task_state = Arc::clone(&state);
    let task_token = token.clone();
    let task = tokio::spawn(async move {
        loop {
            let signal = tokio::select! {
                biased;
                _ = task_token.cancelled() => break,
                next = tap.recv() => match next {
                    Some(signal) => signal,
                    None => break,
                },
            };

            let Some(event) = E::decode(&signal.args) else {
                debug!(
                    event = %event_name,
                    path = %signal.path,
                    reason = DropReason::Decode.as_str(),
                    "Signal dropped"
                );
                metrics.record_drop(DropReason::Decode);
                continue;
            };

            let callback = Arc::clone(&callback);
            match tokio::task::spawn_blocking(move || callback(event)).await {
                Ok(()) => metrics.record_delivery(&event_name),
                Err(e) if e.is_panic() => {
                    error!(
                        event = %event_name,
                        path = %path,
                        panic = %panic_message(e.into_panic().as_ref()),
                        "Subscriber callback panicked"
                    );
                    metrics.record_panic(&event_name);
                }
                Err(e) => {
                    warn!(event = %event_name, error = %e, "Subscriber callback cancelled");
                    break;
                }
            }
        }
        task_state.store(TERMINATED, Ordering::Release);
        debug!(event = %event_name, path = %path, "Dispatcher terminated");
    });

    DispatcherHandle { token, state, task }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
