//! zbus-backed [`BusSession`]
//!
//! One [`ZbusSession`] owns one authenticated connection. The inbound
//! message stream is opened together with the connection, so no signal
//! routed to it after `AddMatch` can be missed, and handed out once through
//! [`BusSession::signals`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use virtbus_core::config::{AuthMechanism, BusConfig};
use virtbus_core::domain::{BusError, BusValue, MatchRule, MethodCall, ObjectPath, SignalMessage};
use virtbus_core::ports::{BusSession, SignalStream};
use zbus::fdo::DBusProxy;
use zbus::message::Type as MessageType;
use zbus::zvariant::{Structure, StructureBuilder};
use zbus::{Message, MessageStream};

use crate::convert;

/// Authenticated connection to the bus daemon
pub struct ZbusSession {
    connection: zbus::Connection,
    dbus: DBusProxy<'static>,
    stream: Mutex<Option<MessageStream>>,
    closed: AtomicBool,
}

impl ZbusSession {
    /// Connects, authenticates and completes the `Hello` handshake
    ///
    /// Without an explicit address the system bus is used.
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        let builder = match &config.address {
            Some(address) => zbus::connection::Builder::address(address.as_str()),
            None => zbus::connection::Builder::system(),
        }
        .map_err(connection_error)?;

        let connection = builder
            .auth_mechanisms(&[auth_mechanism(config.auth)])
            .build()
            .await
            .map_err(connection_error)?;
        let stream = MessageStream::from(&connection);
        let dbus = DBusProxy::new(&connection)
            .await
            .map_err(connection_error)?;

        info!(
            address = config.address.as_deref().unwrap_or("system"),
            unique_name = ?connection.unique_name().map(|n| n.as_str()),
            "Connected to bus"
        );

        Ok(Self {
            connection,
            dbus,
            stream: Mutex::new(Some(stream)),
            closed: AtomicBool::new(false),
        })
    }

    /// Underlying zbus connection
    pub fn connection(&self) -> &zbus::Connection {
        &self.connection
    }

    /// Fails every later call; the inbound stream ends when the last
    /// clone of the connection is dropped
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        Ok(())
    }
}

fn auth_mechanism(auth: AuthMechanism) -> zbus::AuthMechanism {
    match auth {
        AuthMechanism::External => zbus::AuthMechanism::External,
        AuthMechanism::Cookie => zbus::AuthMechanism::Cookie,
        AuthMechanism::Anonymous => zbus::AuthMechanism::Anonymous,
    }
}

fn connection_error(e: zbus::Error) -> BusError {
    BusError::Connection(e.to_string())
}

/// zbus form of a signal match rule
fn wire_rule(rule: &MatchRule) -> Result<zbus::MatchRule<'_>, BusError> {
    let invalid = |e: zbus::Error| BusError::MatchRule {
        rule: rule.to_string(),
        message: e.to_string(),
    };
    Ok(zbus::MatchRule::builder()
        .msg_type(MessageType::Signal)
        .interface(rule.interface.as_str())
        .map_err(invalid)?
        .member(rule.member.as_str())
        .map_err(invalid)?
        .build())
}

/// Body of a message as positional arguments
fn body_args(message: &Message) -> Result<Vec<BusValue>, BusError> {
    let header = message.header();
    let empty = header
        .signature()
        .map_or(true, |signature| signature.as_str().is_empty());
    if empty {
        return Ok(Vec::new());
    }
    let body = message.body();
    let fields: Structure<'_> = body
        .deserialize()
        .map_err(|e| BusError::Decode(e.to_string()))?;
    convert::fields_from(fields.fields())
}

/// Converts an inbound message; `None` for anything that is not a
/// well-formed signal
fn to_signal(message: &Message) -> Option<SignalMessage> {
    let header = message.header();
    if header.message_type() != MessageType::Signal {
        return None;
    }
    let path = ObjectPath::new(header.path()?.as_str()).ok()?;
    let interface = header.interface()?.as_str().to_string();
    let member = header.member()?.as_str().to_string();
    match body_args(message) {
        Ok(args) => Some(SignalMessage::new(path, interface, member, args)),
        Err(e) => {
            warn!(path = %path, interface = %interface, member = %member, error = %e, "Undecodable signal body");
            None
        }
    }
}

#[async_trait::async_trait]
impl BusSession for ZbusSession {
    async fn call(&self, call: MethodCall) -> Result<Vec<BusValue>, BusError> {
        self.ensure_open()?;
        let method = call.qualified_name();
        let call_error = |e: zbus::Error| BusError::Call {
            method: method.clone(),
            message: e.to_string(),
        };
        let destination = call.destination.as_str();
        let path = call.path.as_str();
        let interface = call.interface.as_str();
        let member = call.member.as_str();
        debug!(method = %method, path = %path, args = call.args.len(), "Calling");

        let reply = if call.args.is_empty() {
            self.connection
                .call_method(Some(destination), path, Some(interface), member, &())
                .await
        } else {
            let mut body = StructureBuilder::new();
            for arg in &call.args {
                body = body.append_field(convert::to_value(arg)?);
            }
            self.connection
                .call_method(Some(destination), path, Some(interface), member, &body.build())
                .await
        }
        .map_err(call_error)?;

        body_args(&reply)
    }

    async fn add_match(&self, rule: &MatchRule) -> Result<(), BusError> {
        self.ensure_open()?;
        self.dbus
            .add_match_rule(wire_rule(rule)?)
            .await
            .map_err(|e| BusError::MatchRule {
                rule: rule.to_string(),
                message: e.to_string(),
            })
    }

    async fn remove_match(&self, rule: &MatchRule) -> Result<(), BusError> {
        self.ensure_open()?;
        self.dbus
            .remove_match_rule(wire_rule(rule)?)
            .await
            .map_err(|e| BusError::MatchRule {
                rule: rule.to_string(),
                message: e.to_string(),
            })
    }

    fn signals(&self) -> SignalStream {
        let taken = self
            .stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match taken {
            Some(stream) => stream
                .filter_map(|item| async move {
                    match item {
                        Ok(message) => to_signal(&message),
                        Err(e) => {
                            warn!(error = %e, "Error on inbound message stream");
                            None
                        }
                    }
                })
                .boxed(),
            None => stream::empty().boxed(),
        }
    }
}

impl std::fmt::Debug for ZbusSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZbusSession")
            .field("unique_name", &self.connection.unique_name())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
