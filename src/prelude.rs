//! Convenient re-exports for common cooldown types.
pub use crate::{
    clock::{Clock, SystemClock},
    config::CooldownSpec,
    cooldown::{Cooldown, Decision, ResetOutcome},
    error::{CooldownActive, CooldownError, GuardError, StoreError},
    middleware::{CooldownLayer, Invocation},
    record::BucketDimension,
    scope::{ChannelKind, InvocationContext},
    store::CooldownStore,
};
