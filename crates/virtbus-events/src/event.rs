//! Typed signal events
//!
//! A [`SignalEvent`] describes one signal: where it comes from, how many
//! arguments it carries and how to decode them. The dispatcher only hands
//! a callback values that went through [`SignalEvent::decode`].

use virtbus_core::domain::{BusValue, MatchRule};

use crate::entities::Kind;

/// A signal with a statically known interface, member and argument list
pub trait SignalEvent: Sized + Send + 'static {
    /// Entity kind whose proxies may subscribe to this event
    type Source: Kind;

    /// D-Bus interface the signal is emitted on
    const INTERFACE: &'static str;

    /// Signal name
    const MEMBER: &'static str;

    /// Number of body arguments
    const ARITY: usize;

    /// Positional decode of exactly [`ARITY`](Self::ARITY) arguments
    ///
    /// Returns `None` if any argument has the wrong shape.
    fn decode(args: &[BusValue]) -> Option<Self>;

    /// Bus match rule selecting this signal on every object path
    fn match_rule() -> MatchRule {
        MatchRule::signal(Self::INTERFACE, Self::MEMBER)
    }

    /// `interface.member`, used as metrics label and in logs
    fn qualified_name() -> String {
        format!("{}.{}", Self::INTERFACE, Self::MEMBER)
    }
}
