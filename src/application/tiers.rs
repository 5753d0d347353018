//! Registry of named quota tiers.

use crate::domain::tier::Tier;
use dashmap::DashMap;

/// Holds every registered tier plus the default every lookup can fall back
/// to.
///
/// The default tier is supplied at construction, so [`TierRegistry::resolve`]
/// never fails: a missing default is unrepresentable rather than a runtime
/// error path.
#[derive(Debug)]
pub struct TierRegistry {
    default: Tier,
    tiers: DashMap<String, Tier>,
}

impl TierRegistry {
    /// Create a registry around the tier unmatched lookups resolve to.
    ///
    /// The default is also registered under its own name (conventionally
    /// `"default"`).
    pub fn new(default: Tier) -> Self {
        let tiers = DashMap::new();
        tiers.insert(default.name.clone(), default.clone());
        Self { default, tiers }
    }

    /// Insert or replace a tier under its name.
    pub fn register(&self, tier: Tier) {
        self.tiers.insert(tier.name.clone(), tier);
    }

    /// Look up a tier by name, falling back to the default.
    pub fn resolve(&self, name: &str) -> Tier {
        self.tiers
            .get(name)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| self.default.clone())
    }

    /// Whether a tier with this exact name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tiers.contains_key(name)
    }

    /// Number of registered tiers, including the default.
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// Always false: the default tier is registered at construction.
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}
