//! In-memory bus session
//!
//! [`MemoryBus`] implements [`BusSession`] without a bus daemon. Signals are
//! injected with [`MemoryBus::emit`], method replies are scripted per
//! `interface.member`, and every match rule operation is recorded so tests
//! can assert on what would have reached the daemon.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use super::bus_session::{BusSession, SignalStream};
use crate::domain::{BusError, BusValue, MatchRule, MethodCall, SignalMessage};

/// One recorded match rule operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOp {
    Add(MatchRule),
    Remove(MatchRule),
}

#[derive(Default)]
struct MemoryState {
    sender: Option<mpsc::UnboundedSender<SignalMessage>>,
    receiver: Option<mpsc::UnboundedReceiver<SignalMessage>>,
    match_ops: Vec<MatchOp>,
    installed: HashMap<MatchRule, usize>,
    fail_add_match: Option<String>,
    fail_remove_match: Option<String>,
    replies: HashMap<String, Result<Vec<BusValue>, BusError>>,
    calls: Vec<MethodCall>,
    closed: bool,
}

/// Scriptable in-process [`BusSession`]
pub struct MemoryBus {
    state: Mutex<MemoryState>,
}

impl MemoryBus {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(MemoryState {
                sender: Some(sender),
                receiver: Some(receiver),
                ..MemoryState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test thread must not wedge every other assertion
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Injects an inbound signal; returns `false` once the bus is closed
    pub fn emit(&self, signal: SignalMessage) -> bool {
        match &self.state().sender {
            Some(sender) => sender.send(signal).is_ok(),
            None => false,
        }
    }

    /// Ends the inbound stream and fails later calls with [`BusError::Closed`]
    pub fn close(&self) {
        let mut state = self.state();
        state.sender = None;
        state.closed = true;
    }

    /// Scripts the reply of `interface.member`
    pub fn reply(&self, interface: &str, member: &str, body: Vec<BusValue>) {
        self.state()
            .replies
            .insert(format!("{interface}.{member}"), Ok(body));
    }

    /// Scripts an error reply for `interface.member`
    pub fn reply_error(&self, interface: &str, member: &str, message: impl Into<String>) {
        let method = format!("{interface}.{member}");
        let error = BusError::Call {
            method: method.clone(),
            message: message.into(),
        };
        self.state().replies.insert(method, Err(error));
    }

    /// Makes every following `add_match` fail with `message`
    pub fn fail_add_match(&self, message: Option<&str>) {
        self.state().fail_add_match = message.map(str::to_string);
    }

    /// Makes every following `remove_match` fail with `message`
    pub fn fail_remove_match(&self, message: Option<&str>) {
        self.state().fail_remove_match = message.map(str::to_string);
    }

    /// Every match rule operation received, in order
    pub fn match_ops(&self) -> Vec<MatchOp> {
        self.state().match_ops.clone()
    }

    /// How many times `rule` is currently installed
    pub fn installed_count(&self, rule: &MatchRule) -> usize {
        self.state().installed.get(rule).copied().unwrap_or(0)
    }

    /// Total number of installed rules, counting duplicates
    pub fn installed_total(&self) -> usize {
        self.state().installed.values().sum()
    }

    /// Every method call received, in order
    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().calls.clone()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("MemoryBus")
            .field("installed", &state.installed.len())
            .field("calls", &state.calls.len())
            .field("closed", &state.closed)
            .finish()
    }
}

#[async_trait::async_trait]
impl BusSession for MemoryBus {
    async fn call(&self, call: MethodCall) -> Result<Vec<BusValue>, BusError> {
        let mut state = self.state();
        if state.closed {
            return Err(BusError::Closed);
        }
        let method = call.qualified_name();
        debug!(method = %method, path = %call.path, "MemoryBus call");
        state.calls.push(call);
        match state.replies.get(&method) {
            Some(reply) => reply.clone(),
            None => Err(BusError::Call {
                method,
                message: "org.freedesktop.DBus.Error.UnknownMethod".to_string(),
            }),
        }
    }

    async fn add_match(&self, rule: &MatchRule) -> Result<(), BusError> {
        let mut state = self.state();
        if state.closed {
            return Err(BusError::Closed);
        }
        if let Some(message) = &state.fail_add_match {
            return Err(BusError::MatchRule {
                rule: rule.to_string(),
                message: message.clone(),
            });
        }
        state.match_ops.push(MatchOp::Add(rule.clone()));
        *state.installed.entry(rule.clone()).or_insert(0) += 1;
        Ok(())
    }

    async fn remove_match(&self, rule: &MatchRule) -> Result<(), BusError> {
        let mut state = self.state();
        if state.closed {
            return Err(BusError::Closed);
        }
        if let Some(message) = &state.fail_remove_match {
            return Err(BusError::MatchRule {
                rule: rule.to_string(),
                message: message.clone(),
            });
        }
        match state.installed.get(rule).copied().unwrap_or(0) {
            0 => {
                return Err(BusError::MatchRule {
                    rule: rule.to_string(),
                    message: "org.freedesktop.DBus.Error.MatchRuleNotFound".to_string(),
                })
            }
            1 => {
                state.installed.remove(rule);
            }
            count => {
                state.installed.insert(rule.clone(), count - 1);
            }
        }
        // Only removals the daemon would have accepted are recorded
        state.match_ops.push(MatchOp::Remove(rule.clone()));
        Ok(())
    }

    fn signals(&self) -> SignalStream {
        match self.state().receiver.take() {
            Some(receiver) => stream::unfold(receiver, |mut receiver| async move {
                receiver.recv().await.map(|signal| (signal, receiver))
            })
            .boxed(),
            None => stream::empty().boxed(),
        }
    }
}
