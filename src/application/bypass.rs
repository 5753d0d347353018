//! Registry of identifiers exempt from rate limiting.

use dashmap::DashSet;

/// Concurrent set of bypassed identifiers.
///
/// Membership checks sit on the hot path of every request, so the set is a
/// sharded concurrent structure with O(1) lookups. The registry is rebuilt
/// from configuration at startup; nothing is persisted.
#[derive(Debug, Default)]
pub struct BypassRegistry {
    identifiers: DashSet<String>,
}

impl BypassRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configured identifiers.
    pub fn from_iter<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new();
        for id in identifiers {
            registry.add(id);
        }
        registry
    }

    /// Exempt an identifier from limiting.
    pub fn add(&self, identifier: impl Into<String>) {
        self.identifiers.insert(identifier.into());
    }

    /// Remove an exemption.
    pub fn remove(&self, identifier: &str) {
        self.identifiers.remove(identifier);
    }

    /// Whether an identifier is exempt.
    pub fn contains(&self, identifier: &str) -> bool {
        self.identifiers.contains(identifier)
    }

    /// Number of exempt identifiers.
    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    /// Whether the registry has no exemptions.
    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}
