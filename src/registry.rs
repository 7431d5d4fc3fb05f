//! Registry of per-action cooldown configuration.
//!
//! Write-once per action name, read on every check. Reads are lock-free snapshots via
//! `ArcSwap`; registrations copy the map.

use crate::config::CooldownSpec;
use crate::error::ConfigError;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

type SpecMap = HashMap<String, Arc<CooldownSpec>>;

/// Registry of cooldown specs keyed by action name.
///
/// Registering the same spec twice is a no-op. Registering a different spec under an existing
/// name is rejected: configuration is immutable for the life of the process.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    inner: Arc<ArcSwap<SpecMap>>,
}

/// Result of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The spec was stored.
    Added,
    /// An identical spec was already present.
    Unchanged,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `spec` under its action name.
    ///
    /// Names are compared ASCII case-insensitively: a name that differs from a registered one
    /// only in case is a conflict. SQLite column names fold case.
    pub fn register(&self, spec: CooldownSpec) -> Result<Registration, ConfigError> {
        let action = spec.action().to_string();
        let spec = Arc::new(spec);

        let mut added = false;
        let previous = self.inner.rcu(|map| {
            if map.keys().any(|name| name.eq_ignore_ascii_case(&action)) {
                added = false;
                return Arc::clone(map);
            }
            added = true;
            let mut next = SpecMap::clone(map);
            next.insert(action.clone(), Arc::clone(&spec));
            Arc::new(next)
        });

        if added {
            info!(
                target: "scoped_cooldown::registry",
                action = %action,
                limit = spec.limit(),
                dimension = %spec.dimension(),
                "cooldown registered"
            );
            return Ok(Registration::Added);
        }

        match previous.get(&action) {
            Some(existing) if **existing == *spec => Ok(Registration::Unchanged),
            _ => Err(ConfigError::ConflictingRegistration { action }),
        }
    }

    /// Look up the spec for `action`.
    pub fn get(&self, action: &str) -> Option<Arc<CooldownSpec>> {
        self.inner.load().get(action).cloned()
    }

    /// Whether `action` is registered.
    pub fn contains(&self, action: &str) -> bool {
        self.inner.load().contains_key(action)
    }

    /// Copies of all registered specs, sorted by action name.
    pub fn snapshot(&self) -> Vec<CooldownSpec> {
        let map = self.inner.load();
        let mut entries: Vec<CooldownSpec> = map.values().map(|s| CooldownSpec::clone(s)).collect();
        entries.sort_by(|a, b| a.action().cmp(b.action()));
        entries
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
