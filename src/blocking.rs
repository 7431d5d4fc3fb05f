//! Synchronous entry point for hosts without an async runtime.
//!
//! Wraps a [`Cooldown`] together with a private current-thread runtime and blocks on each call.
//! Calling these methods from inside an async runtime panics; use the async facade there.

use crate::config::CooldownSpec;
use crate::cooldown::{Cooldown, Decision, ResetOutcome};
use crate::error::CooldownError;
use crate::registry::Registration;
use crate::scope::InvocationContext;
use crate::store::CooldownStore;
use tokio::runtime::{Builder, Runtime};

/// Blocking wrapper around [`Cooldown`].
#[derive(Debug)]
pub struct BlockingCooldown<S> {
    inner: Cooldown<S>,
    runtime: Runtime,
}

impl<S> BlockingCooldown<S>
where
    S: CooldownStore,
{
    /// Wrap `inner`, starting a current-thread runtime for it.
    pub fn new(inner: Cooldown<S>) -> Result<Self, CooldownError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { inner, runtime })
    }

    /// The async facade, sharing state with this wrapper.
    pub fn inner(&self) -> &Cooldown<S> {
        &self.inner
    }

    pub fn register(&self, spec: CooldownSpec) -> Result<Registration, CooldownError> {
        self.inner.register(spec)
    }

    pub fn registered(&self) -> Vec<CooldownSpec> {
        self.inner.registered()
    }

    /// See [`Cooldown::check`].
    pub fn check(&self, action: &str, ctx: &InvocationContext) -> Result<Decision, CooldownError> {
        self.runtime.block_on(self.inner.check(action, ctx))
    }

    /// See [`Cooldown::reset`].
    pub fn reset(
        &self,
        action: &str,
        ctx: &InvocationContext,
    ) -> Result<ResetOutcome, CooldownError> {
        self.runtime.block_on(self.inner.reset(action, ctx))
    }

    /// See [`Cooldown::force_remove`].
    pub fn force_remove(
        &self,
        action: &str,
        ctx: &InvocationContext,
    ) -> Result<ResetOutcome, CooldownError> {
        self.runtime.block_on(self.inner.force_remove(action, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCooldownStore;
    use std::time::Duration;

    #[test]
    fn blocks_through_the_async_facade() {
        let cooldown = Cooldown::builder(InMemoryCooldownStore::new()).build().unwrap();
        let blocking = BlockingCooldown::new(cooldown).unwrap();
        blocking
            .register(
                CooldownSpec::builder("ping")
                    .rate(1)
                    .per(Duration::from_secs(60))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let ctx = InvocationContext::user(3);
        assert!(blocking.check("ping", &ctx).unwrap().is_allowed());
        assert!(!blocking.check("ping", &ctx).unwrap().is_allowed());
        assert_eq!(blocking.reset("ping", &ctx).unwrap(), ResetOutcome::Cleared);
        assert!(blocking.check("ping", &ctx).unwrap().is_allowed());
        assert_eq!(blocking.force_remove("ping", &ctx).unwrap(), ResetOutcome::Cleared);
        assert_eq!(blocking.registered().len(), 1);
    }
}
