//! Cooldown facade: resolve scope, read the record, decide, write back conditionally.
//!
//! Every check round-trips to the store. The write is a compare-and-swap against the record
//! that was read, so two concurrent checks for the same key can never both take the last
//! usage: the loser re-reads and re-decides.
//!
//! Example
//! ```rust
//! use scoped_cooldown::{Cooldown, CooldownSpec, InMemoryCooldownStore, InvocationContext};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cooldown = Cooldown::builder(InMemoryCooldownStore::new())
//!         .register(
//!             CooldownSpec::builder("ping")
//!                 .rate(1)
//!                 .per(Duration::from_secs(30))
//!                 .build()
//!                 .unwrap(),
//!         )
//!         .build()
//!         .unwrap();
//!
//!     let ctx = InvocationContext::user(7);
//!     assert!(cooldown.check("ping", &ctx).await.unwrap().is_allowed());
//!     let denied = cooldown.check("ping", &ctx).await.unwrap();
//!     assert!(!denied.is_allowed());
//! }
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::{CooldownConfig, CooldownSpec, DEFAULT_MAX_CAS_ATTEMPTS};
use crate::engine;
use crate::error::{ConfigError, CooldownActive, CooldownError, StoreError};
use crate::record::{CooldownKey, CooldownRecord};
use crate::registry::{ActionRegistry, Registration};
use crate::scope::{self, InvocationContext};
use crate::store::CooldownStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The invocation may proceed.
    Allowed {
        /// Admissions left in the current window.
        remaining: u32,
        /// Record written for this admission; `None` when the dimension did not apply.
        record: Option<CooldownRecord>,
    },
    /// The action is on cooldown for this scope.
    Denied(CooldownActive),
}

impl Decision {
    /// Whether the invocation may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Remaining admissions on success, the denial otherwise.
    pub fn into_result(self) -> Result<u32, CooldownActive> {
        match self {
            Decision::Allowed { remaining, .. } => Ok(remaining),
            Decision::Denied(active) => Err(active),
        }
    }
}

/// What a reset did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// One usage was given back; `count` is what is left in the window.
    Decremented {
        /// Usages still counted.
        count: u32,
    },
    /// The record was removed.
    Cleared,
    /// There was nothing to reset.
    Absent,
    /// The action's dimension does not apply to this invocation.
    NotApplicable,
    /// No cooldown is registered for the action.
    Unregistered,
}

/// Cooldown enforcement over a [`CooldownStore`].
///
/// Clones share the store, the registry and the clock.
#[derive(Debug)]
pub struct Cooldown<S> {
    store: Arc<S>,
    registry: ActionRegistry,
    clock: Arc<dyn Clock>,
    max_cas_attempts: usize,
}

impl<S> Clone for Cooldown<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: self.registry.clone(),
            clock: Arc::clone(&self.clock),
            max_cas_attempts: self.max_cas_attempts,
        }
    }
}

impl<S> Cooldown<S>
where
    S: CooldownStore,
{
    /// Start building a facade over `store`.
    pub fn builder(store: S) -> CooldownBuilder<S> {
        CooldownBuilder::new(store)
    }

    /// Facade configured from a [`CooldownConfig`], with a system clock in the configured offset.
    pub fn from_config(store: S, config: &CooldownConfig) -> Result<Self, ConfigError> {
        let clock = SystemClock::from_offset_seconds(config.utc_offset_secs)?;
        config
            .specs()?
            .into_iter()
            .fold(
                Self::builder(store).clock(clock).max_cas_attempts(config.max_cas_attempts),
                CooldownBuilder::register,
            )
            .build()
    }

    /// Register a cooldown for its action.
    ///
    /// A rejected registration surfaces as [`CooldownError::Config`].
    pub fn register(&self, spec: CooldownSpec) -> Result<Registration, CooldownError> {
        Ok(self.registry.register(spec)?)
    }

    /// Snapshot of registered cooldowns, sorted by action name.
    pub fn registered(&self) -> Vec<CooldownSpec> {
        self.registry.snapshot()
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The clock decisions are made against.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Check, and if admitted consume, one usage of a registered action.
    pub async fn check(
        &self,
        action: &str,
        ctx: &InvocationContext,
    ) -> Result<Decision, CooldownError> {
        let spec = self
            .registry
            .get(action)
            .ok_or_else(|| CooldownError::UnknownAction {
                action: action.to_string(),
            })?;
        self.check_spec(&spec, ctx).await
    }

    /// Like [`check`](Self::check) with an explicit spec that need not be registered.
    pub async fn check_spec(
        &self,
        spec: &CooldownSpec,
        ctx: &InvocationContext,
    ) -> Result<Decision, CooldownError> {
        let Some(scope) = scope::resolve(spec.dimension(), spec.role_id(), ctx) else {
            debug!(
                target: "scoped_cooldown::cooldown",
                action = spec.action(),
                dimension = %spec.dimension(),
                user = ctx.user_id,
                "dimension not applicable, admitting"
            );
            return Ok(Decision::Allowed {
                remaining: spec.limit(),
                record: None,
            });
        };

        self.store.ensure_slot(scope.dimension, spec.action()).await?;
        self.store.ensure_scope_row(&scope).await?;
        let key = scope.action(spec.action());

        for attempt in 1..=self.max_cas_attempts {
            let current = self.read(&key).await?;
            let now = self.clock.now();
            let admission = engine::decide(spec.limit(), spec.window(), current.as_ref(), now);

            if !admission.admit {
                let active = CooldownActive {
                    action: spec.action().to_string(),
                    dimension: spec.dimension(),
                    limit: spec.limit(),
                    retry_after: admission.retry_after.unwrap_or_default(),
                };
                info!(
                    target: "scoped_cooldown::cooldown",
                    key = %key,
                    retry_after_secs = active.retry_after_secs(),
                    "cooldown active, denying"
                );
                return Ok(Decision::Denied(active));
            }

            if self.store.compare_and_swap(&key, current.as_ref(), Some(&admission.next)).await? {
                debug!(
                    target: "scoped_cooldown::cooldown",
                    key = %key,
                    count = admission.next.count,
                    limit = admission.next.limit,
                    "admitted"
                );
                return Ok(Decision::Allowed {
                    remaining: admission.next.remaining(),
                    record: Some(admission.next),
                });
            }

            debug!(
                target: "scoped_cooldown::cooldown",
                key = %key,
                attempt,
                "conditional write lost, retrying"
            );
        }

        Err(StoreError::Contention {
            attempts: self.max_cas_attempts,
        }
        .into())
    }

    /// Give back one usage of `action` for this invocation's scope.
    ///
    /// Unregistered actions and inapplicable scopes are no-ops, reported in the outcome.
    pub async fn reset(
        &self,
        action: &str,
        ctx: &InvocationContext,
    ) -> Result<ResetOutcome, CooldownError> {
        let key = match self.reset_key(action, ctx).await? {
            Ok(key) => key,
            Err(outcome) => return Ok(outcome),
        };

        for attempt in 1..=self.max_cas_attempts {
            let Some(current) = self.read(&key).await? else {
                return Ok(ResetOutcome::Absent);
            };
            let next = engine::refund(&current);
            if self.store.compare_and_swap(&key, Some(&current), next.as_ref()).await? {
                let outcome = match next {
                    Some(record) => ResetOutcome::Decremented { count: record.count },
                    None => ResetOutcome::Cleared,
                };
                debug!(target: "scoped_cooldown::cooldown", key = %key, ?outcome, "usage refunded");
                return Ok(outcome);
            }
            debug!(
                target: "scoped_cooldown::cooldown",
                key = %key,
                attempt,
                "conditional write lost, retrying"
            );
        }

        Err(StoreError::Contention {
            attempts: self.max_cas_attempts,
        }
        .into())
    }

    /// Remove the record for `action` in this invocation's scope, whatever its count.
    pub async fn force_remove(
        &self,
        action: &str,
        ctx: &InvocationContext,
    ) -> Result<ResetOutcome, CooldownError> {
        let key = match self.reset_key(action, ctx).await? {
            Ok(key) => key,
            Err(outcome) => return Ok(outcome),
        };
        self.store.clear(&key).await?;
        debug!(target: "scoped_cooldown::cooldown", key = %key, "cooldown removed");
        Ok(ResetOutcome::Cleared)
    }

    /// [`force_remove`](Self::force_remove) when `force`, otherwise [`reset`](Self::reset).
    pub async fn reset_with(
        &self,
        action: &str,
        ctx: &InvocationContext,
        force: bool,
    ) -> Result<ResetOutcome, CooldownError> {
        if force {
            self.force_remove(action, ctx).await
        } else {
            self.reset(action, ctx).await
        }
    }

    // Ok(Err(outcome)) short-circuits with a no-op outcome.
    async fn reset_key(
        &self,
        action: &str,
        ctx: &InvocationContext,
    ) -> Result<Result<CooldownKey, ResetOutcome>, CooldownError> {
        let Some(spec) = self.registry.get(action) else {
            return Ok(Err(ResetOutcome::Unregistered));
        };
        let Some(scope) = scope::resolve(spec.dimension(), spec.role_id(), ctx) else {
            return Ok(Err(ResetOutcome::NotApplicable));
        };
        self.store.ensure_slot(scope.dimension, spec.action()).await?;
        Ok(Ok(scope.action(spec.action())))
    }

    async fn read(&self, key: &CooldownKey) -> Result<Option<CooldownRecord>, StoreError> {
        match self.store.get(key).await {
            Err(StoreError::Malformed(err)) => {
                warn!(
                    target: "scoped_cooldown::cooldown",
                    key = %key,
                    reason = %err.reason,
                    "malformed cooldown record, treating as absent"
                );
                Ok(None)
            }
            other => other,
        }
    }
}

/// Builder for [`Cooldown`].
#[derive(Debug)]
pub struct CooldownBuilder<S> {
    store: S,
    clock: Option<Arc<dyn Clock>>,
    max_cas_attempts: usize,
    specs: Vec<CooldownSpec>,
}

impl<S> CooldownBuilder<S>
where
    S: CooldownStore,
{
    /// Builder with a UTC system clock and the default attempt budget.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: None,
            max_cas_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
            specs: Vec::new(),
        }
    }

    /// Clock to decide against.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Conditional-write attempts per call before giving up; at least one.
    pub fn max_cas_attempts(mut self, attempts: usize) -> Self {
        self.max_cas_attempts = attempts.max(1);
        self
    }

    /// Register a cooldown when the facade is built.
    pub fn register(mut self, spec: CooldownSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Build the facade, registering queued specs in order.
    pub fn build(self) -> Result<Cooldown<S>, ConfigError> {
        let registry = ActionRegistry::new();
        for spec in self.specs {
            registry.register(spec)?;
        }
        Ok(Cooldown {
            store: Arc::new(self.store),
            registry,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::utc())),
            max_cas_attempts: self.max_cas_attempts,
        })
    }
}
