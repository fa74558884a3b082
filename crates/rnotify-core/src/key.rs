#![forbid(unsafe_code)]

//! Opaque identity tokens.
//!
//! [`Key`] addresses a record in the registry. Keys are either minted from a
//! process-wide counter ([`Key::auto`]) or supplied by the caller
//! ([`Key::named`]) when a stable identity is needed across restarts, for
//! example in tests. The two forms never compare equal to each other.
//!
//! [`ReferenceId`] identifies a mounted UI component holding a reference to
//! a container.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_AUTO_KEY: AtomicU64 = AtomicU64::new(1);
static NEXT_REFERENCE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum KeyRepr {
    Auto(u64),
    Named(Arc<str>),
}

/// Identity of a registry record.
///
/// Cheap to clone. Ordering places auto keys before named keys and is only
/// meant for deterministic iteration, not for semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(KeyRepr);

impl Key {
    /// Mint a fresh key, unique for the lifetime of the process.
    #[must_use]
    pub fn auto() -> Self {
        Self(KeyRepr::Auto(NEXT_AUTO_KEY.fetch_add(1, Ordering::Relaxed)))
    }

    /// A caller-supplied key. Two named keys are equal iff their names are.
    #[must_use]
    pub fn named(name: impl AsRef<str>) -> Self {
        Self(KeyRepr::Named(Arc::from(name.as_ref())))
    }

    /// Whether this key was minted by [`Key::auto`].
    #[must_use]
    pub fn is_auto(&self) -> bool {
        matches!(self.0, KeyRepr::Auto(_))
    }

    /// The name of a caller-supplied key.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match &self.0 {
            KeyRepr::Named(name) => Some(name),
            KeyRepr::Auto(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            KeyRepr::Auto(id) => write!(f, "#{id}"),
            KeyRepr::Named(name) => f.write_str(name),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self(KeyRepr::Named(Arc::from(name)))
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

/// Identity of a mounted UI component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceId {
    /// Numeric id, typically a component/element id from the host.
    Id(u64),
    /// Named reference, handy in tests and logs.
    Named(Arc<str>),
}

impl ReferenceId {
    /// Wrap a host-provided numeric id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self::Id(id)
    }

    /// A named reference.
    #[must_use]
    pub fn named(name: impl AsRef<str>) -> Self {
        Self::Named(Arc::from(name.as_ref()))
    }

    /// Mint a process-unique numeric id.
    #[must_use]
    pub fn next() -> Self {
        Self::Id(NEXT_REFERENCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "ref#{id}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

impl From<&str> for ReferenceId {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<u64> for ReferenceId {
    fn from(id: u64) -> Self {
        Self::Id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashSet;

    #[test]
    fn auto_keys_are_distinct() {
        let keys: AHashSet<Key> = (0..1000).map(|_| Key::auto()).collect();
        assert_eq!(keys.len(), 1000);
    }

    #[test]
    fn named_keys_compare_by_name() {
        assert_eq!(Key::named("A"), Key::from("A"));
        assert_eq!(Key::named("A"), Key::from("A".to_string()));
        assert_ne!(Key::named("A"), Key::named("B"));
    }

    #[test]
    fn auto_and_named_never_collide() {
        let auto = Key::auto();
        let spoof = Key::named(auto.to_string());
        assert_ne!(auto, spoof);
        assert!(auto.is_auto());
        assert!(!spoof.is_auto());
    }

    #[test]
    fn display_forms() {
        assert_eq!(Key::named("counter").to_string(), "counter");
        assert!(Key::auto().to_string().starts_with('#'));
        assert_eq!(ReferenceId::new(7).to_string(), "ref#7");
        assert_eq!(ReferenceId::named("header").to_string(), "header");
    }

    #[test]
    fn name_accessor() {
        assert_eq!(Key::named("x").name(), Some("x"));
        assert_eq!(Key::auto().name(), None);
    }

    #[test]
    fn reference_ids_are_unique() {
        assert_ne!(ReferenceId::next(), ReferenceId::next());
    }
}
