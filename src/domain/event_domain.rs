//! Interned event domain identifier.
//!
//! A [`Domain`] names a topic that clients subscribe to. Domains are
//! interned: constructing two domains from the same name yields handles
//! to the same shared allocation, so cloning and hashing stay cheap no
//! matter how many registrations reference a domain.
//!
//! The pool holds names weakly. A name whose last handle is dropped is
//! reclaimed by a later sweep, so publishing to short-lived domains does
//! not grow the pool without bound.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};

/// Pool size below which dead entries are never swept.
const MIN_SWEEP_THRESHOLD: usize = 64;

/// Process-wide pool of interned domain names.
static INTERNED: LazyLock<Mutex<InternPool>> = LazyLock::new(Mutex::default);

#[derive(Debug)]
struct InternPool {
    names: HashMap<Box<str>, Weak<str>>,
    sweep_at: usize,
}

impl Default for InternPool {
    fn default() -> Self {
        Self {
            names: HashMap::new(),
            sweep_at: MIN_SWEEP_THRESHOLD,
        }
    }
}

impl InternPool {
    fn intern(&mut self, name: &str) -> Arc<str> {
        if let Some(live) = self.names.get(name).and_then(Weak::upgrade) {
            return live;
        }
        if self.names.len() >= self.sweep_at {
            self.names.retain(|_, weak| weak.strong_count() > 0);
            // Next sweep once the pool has doubled past the live names.
            self.sweep_at = (self.names.len() * 2).max(MIN_SWEEP_THRESHOLD);
        }
        let interned: Arc<str> = Arc::from(name);
        self.names.insert(Box::from(name), Arc::downgrade(&interned));
        interned
    }
}

fn pool() -> MutexGuard<'static, InternPool> {
    INTERNED.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Named topic a client can subscribe to for broadcast events.
///
/// Equality, ordering and hashing are by name. Used as the map key in
/// [`crate::registry::ListenerRegistry`] and in the client-side
/// registration state.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Domain(Arc<str>);

impl Domain {
    /// Returns the interned domain for `name`.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(pool().intern(name.as_ref()))
    }

    /// Returns the domain name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Returns `true` if both handles point at the same interned name.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Domain").field(&self.name()).finish()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for Domain {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Domain {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<Domain> for String {
    fn from(domain: Domain) -> Self {
        domain.name().to_string()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn equal_names_share_one_instance() {
        let a = Domain::new("test_domain");
        let b = Domain::from(String::from("test_domain"));
        assert_eq!(a, b);
        assert!(a.same_instance(&b));
    }

    #[test]
    fn different_names_are_distinct() {
        let a = Domain::new("test_domain");
        let b = Domain::new("test_domain_2");
        assert_ne!(a, b);
        assert!(!a.same_instance(&b));
    }

    #[test]
    fn display_is_name() {
        let domain = Domain::new("prices");
        assert_eq!(domain.to_string(), "prices");
        assert_eq!(format!("{domain:?}"), "Domain(\"prices\")");
    }

    #[test]
    fn deserialized_domain_is_interned() {
        let original = Domain::new("wire_domain");
        let Ok(parsed) = serde_json::from_str::<Domain>("\"wire_domain\"") else {
            panic!("deserialization failed");
        };
        assert!(parsed.same_instance(&original));
        assert_eq!(
            serde_json::to_string(&parsed).unwrap_or_default(),
            "\"wire_domain\""
        );
    }

    #[test]
    fn dropped_domains_are_reclaimed() {
        let kept = Domain::new("reclaim_kept");
        for n in 0..10_000 {
            let transient = Domain::new(format!("reclaim_transient_{n}"));
            assert_eq!(transient.name(), format!("reclaim_transient_{n}"));
        }
        assert!(pool().names.len() < 1_000);
        assert!(Domain::new("reclaim_kept").same_instance(&kept));
    }

    #[test]
    fn name_is_interned_again_after_last_handle_drops() {
        let first = Domain::new("reclaim_again");
        drop(first);
        let second = Domain::new("reclaim_again");
        let third = Domain::new("reclaim_again");
        assert!(second.same_instance(&third));
    }

    #[test]
    fn hash_works_in_hashmap() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(Domain::new("a"), 1);
        assert_eq!(map.get(&Domain::new("a")), Some(&1));
    }
}
