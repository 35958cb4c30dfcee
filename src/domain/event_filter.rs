//! Event filter contract and the wire-portable filter language.
//!
//! The registry evaluates an [`EventFilter`] per (user, domain) before an
//! event is enqueued. Application code can plug in any implementation;
//! [`FilterSpec`] is the one that can travel over HTTP from a remote
//! client to the server.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Event;

/// Predicate deciding whether an event reaches a recipient.
pub trait EventFilter: fmt::Debug + Send + Sync {
    /// Returns `true` if `event` should be delivered.
    fn accepts(&self, event: &Event) -> bool;
}

/// Serializable filter over the JSON payload of an [`Event`].
///
/// Pointers use JSON pointer syntax (RFC 6901), e.g. `/symbol`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSpec {
    /// Accepts events whose payload holds `value` at `pointer`.
    FieldEquals {
        /// JSON pointer into the payload.
        pointer: String,
        /// Expected value.
        value: serde_json::Value,
    },
    /// Accepts events whose payload has any value at `pointer`.
    FieldExists {
        /// JSON pointer into the payload.
        pointer: String,
    },
    /// Inverts the inner filter.
    Not {
        /// Filter to invert.
        inner: Box<FilterSpec>,
    },
    /// Accepts events every inner filter accepts.
    All {
        /// Filters that must all accept.
        filters: Vec<FilterSpec>,
    },
    /// Accepts events at least one inner filter accepts.
    Any {
        /// Filters of which one must accept.
        filters: Vec<FilterSpec>,
    },
}

impl FilterSpec {
    /// Shorthand for [`FilterSpec::FieldEquals`].
    #[must_use]
    pub fn field_equals(pointer: impl Into<String>, value: serde_json::Value) -> Self {
        Self::FieldEquals {
            pointer: pointer.into(),
            value,
        }
    }

    /// Shorthand for [`FilterSpec::Not`].
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not {
            inner: Box::new(self),
        }
    }

    /// Checks that every pointer is a valid JSON pointer.
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed pointer.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::FieldEquals { pointer, .. } | Self::FieldExists { pointer } => {
                if pointer.is_empty() || pointer.starts_with('/') {
                    Ok(())
                } else {
                    Err(format!("filter pointer {pointer:?} must start with '/'"))
                }
            }
            Self::Not { inner } => inner.validate(),
            Self::All { filters } | Self::Any { filters } => {
                filters.iter().try_for_each(Self::validate)
            }
        }
    }
}

impl EventFilter for FilterSpec {
    fn accepts(&self, event: &Event) -> bool {
        let payload = event.payload();
        match self {
            Self::FieldEquals { pointer, value } => payload.pointer(pointer) == Some(value),
            Self::FieldExists { pointer } => payload.pointer(pointer).is_some(),
            Self::Not { inner } => !inner.accepts(event),
            Self::All { filters } => filters.iter().all(|f| f.accepts(event)),
            Self::Any { filters } => filters.iter().any(|f| f.accepts(event)),
        }
    }
}
