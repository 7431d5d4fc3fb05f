#![forbid(unsafe_code)]

//! # scoped-cooldown
//!
//! Persistent, scoped cooldowns for chat-bot style command handlers: limit how often an
//! action may be invoked per user, guild, channel, category or role, and keep that state
//! across restarts.
//!
//! ## Features
//!
//! - **Five bucket dimensions** resolved from an [`InvocationContext`]
//! - **Rolling and daily-reset windows**, with retry-after reporting on denial
//! - **Conditional writes** so concurrent checks never admit past the limit
//! - **Pluggable storage** via [`CooldownStore`] (in-memory here, SQLite in
//!   `scoped-cooldown-sqlite`)
//! - **Tower middleware** and a **blocking adapter** for hosts without async
//!
//! ## Quick Start
//!
//! ```rust
//! use scoped_cooldown::{
//!     BucketDimension, ChannelKind, Cooldown, CooldownSpec, Decision, InMemoryCooldownStore,
//!     InvocationContext,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cooldown = Cooldown::builder(InMemoryCooldownStore::new())
//!         .register(
//!             CooldownSpec::builder("roll")
//!                 .rate(2)
//!                 .per(Duration::from_secs(60))
//!                 .dimension(BucketDimension::Channel)
//!                 .build()
//!                 .unwrap(),
//!         )
//!         .build()
//!         .unwrap();
//!
//!     let ctx = InvocationContext::user(1).in_guild(10).in_channel(20, ChannelKind::Text, None);
//!     for _ in 0..2 {
//!         assert!(cooldown.check("roll", &ctx).await.unwrap().is_allowed());
//!     }
//!     match cooldown.check("roll", &ctx).await.unwrap() {
//!         Decision::Denied(active) => assert!(active.retry_after_secs() <= 60),
//!         Decision::Allowed { .. } => unreachable!(),
//!     }
//! }
//! ```

pub mod blocking;
pub mod clock;
pub mod config;
pub mod cooldown;
pub mod engine;
pub mod error;
pub mod middleware;
pub mod prelude;
pub mod record;
pub mod registry;
pub mod scope;
pub mod store;

// Re-exports
pub use blocking::BlockingCooldown;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ActionConfig, CooldownConfig, CooldownSpec, CooldownSpecBuilder};
pub use cooldown::{Cooldown, CooldownBuilder, Decision, ResetOutcome};
pub use engine::{Admission, WindowPolicy};
pub use error::{
    BoxError, ConfigError, CooldownActive, CooldownError, GuardError, MalformedRecord, StoreError,
};
pub use middleware::{ActionRequest, CooldownLayer, CooldownService, Invocation};
pub use record::{BucketDimension, CooldownKey, CooldownRecord, ScopeKey, WindowKind};
pub use registry::{ActionRegistry, Registration};
pub use scope::{ChannelInfo, ChannelKind, InvocationContext};
pub use store::{CooldownStore, InMemoryCooldownStore};
