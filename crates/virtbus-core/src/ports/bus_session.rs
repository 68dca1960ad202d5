//! Bus session port (driven/secondary port)
//!
//! A bus session owns one authenticated connection to a message bus and
//! exposes exactly what the event layer needs from it.
//!
//! ## Design Notes
//!
//! - Uses the typed [`BusError`] rather than `anyhow` because callers react
//!   differently to call failures and match rule rejections.
//! - [`BusSession::signals`] hands out the inbound stream once. The event
//!   layer owns it inside a single pump task and fans it out itself.
//! - Match rules are sent as given. Reference counting is the caller's job.

use futures::stream::BoxStream;

use crate::domain::{BusError, BusValue, MatchRule, MethodCall, SignalMessage};

/// Inbound signal stream of a session
pub type SignalStream = BoxStream<'static, SignalMessage>;

/// One authenticated, duplex bus connection
#[async_trait::async_trait]
pub trait BusSession: Send + Sync {
    /// Sends a method call and waits for its reply body
    ///
    /// # Errors
    ///
    /// [`BusError::Call`] when the remote side answers with an error,
    /// [`BusError::Unsupported`] when an argument cannot be encoded and
    /// [`BusError::Closed`] after the session was shut down.
    async fn call(&self, call: MethodCall) -> Result<Vec<BusValue>, BusError>;

    /// Asks the bus daemon to route signals matching `rule` to this session
    async fn add_match(&self, rule: &MatchRule) -> Result<(), BusError>;

    /// Withdraws a rule installed with [`add_match`](Self::add_match)
    async fn remove_match(&self, rule: &MatchRule) -> Result<(), BusError>;

    /// Takes the inbound signal stream
    ///
    /// The first call returns the live stream; later calls return a stream
    /// that ends immediately.
    fn signals(&self) -> SignalStream;
}
