//! Recipient identity.
//!
//! [`UserId`] is the opaque identity a connection session is correlated
//! with. Domain-only clients that have no user identity of their own get
//! an anonymous one minted from a UUID v4.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identity of one event recipient.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps an existing identity string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a random identity for an anonymous, domain-only recipient.
    #[must_use]
    pub fn anonymous() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
