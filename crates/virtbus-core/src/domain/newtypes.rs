//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for object paths and subscription handles.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// ObjectPath
// ============================================================================

/// A validated D-Bus object path
///
/// Either `/` or one or more `/element` segments where each element is
/// non-empty and made of `[A-Za-z0-9_]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Validates and wraps an object path
    pub fn new(path: impl Into<String>) -> Result<Self, DomainError> {
        let path = path.into();
        if Self::is_valid(&path) {
            Ok(Self(path))
        } else {
            Err(DomainError::InvalidObjectPath(path))
        }
    }

    /// Wraps a path already known to be valid
    pub(crate) fn new_unchecked(path: String) -> Self {
        debug_assert!(Self::is_valid(&path), "invalid object path {path}");
        Self(path)
    }

    /// The root object path `/`
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Returns the path as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends one element to this path
    ///
    /// The element must be non-empty `[A-Za-z0-9_]`; a `/` inside it is
    /// rejected rather than read as several elements.
    pub fn join(&self, element: &str) -> Result<Self, DomainError> {
        if !Self::is_element(element) {
            return Err(DomainError::InvalidObjectPath(format!(
                "{}/{element}",
                self.0.trim_end_matches('/')
            )));
        }
        if self.0 == "/" {
            Self::new(format!("/{element}"))
        } else {
            Self::new(format!("{}/{element}", self.0))
        }
    }

    fn is_valid(path: &str) -> bool {
        if path == "/" {
            return true;
        }
        let Some(rest) = path.strip_prefix('/') else {
            return false;
        };
        rest.split('/').all(Self::is_element)
    }

    fn is_element(element: &str) -> bool {
        !element.is_empty()
            && element
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    }
}

impl Display for ObjectPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectPath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ObjectPath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ObjectPath {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectPath> for String {
    fn from(path: ObjectPath) -> Self {
        path.0
    }
}

impl AsRef<str> for ObjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Handle identifying one live signal subscription
///
/// The nil UUID is reserved for the inert handle handed out when a caller
/// subscribes without a callback; it is never registered anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random SubscriptionId
    #[must_use]
    pub fn new() -> Self {
        loop {
            let id = Uuid::new_v4();
            if !id.is_nil() {
                return Self(id);
            }
        }
    }

    /// The inert handle returned for callback-less subscriptions
    #[must_use]
    pub const fn inert() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the inert handle
    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.0.is_nil()
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriptionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid UUID: {e}")))
    }
}
