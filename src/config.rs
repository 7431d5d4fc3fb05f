//! Per-action cooldown configuration.
//!
//! A [`CooldownSpec`] is validated once, at registration, so misconfiguration fails at setup
//! rather than on the first invocation. [`CooldownConfig`] is the serde-friendly form for
//! loading cooldowns from a file.
//!
//! Example
//! ```rust
//! use scoped_cooldown::{BucketDimension, CooldownSpec};
//! use std::time::Duration;
//!
//! let spec = CooldownSpec::builder("daily")
//!     .rate(1)
//!     .reset_daily()
//!     .dimension(BucketDimension::Guild)
//!     .build()
//!     .unwrap();
//! assert_eq!(spec.limit(), 1);
//!
//! let err = CooldownSpec::builder("vip")
//!     .rate(2)
//!     .per(Duration::from_secs(30))
//!     .dimension(BucketDimension::Role)
//!     .build()
//!     .unwrap_err();
//! assert!(err.to_string().contains("role id"));
//! ```

use crate::engine::WindowPolicy;
use crate::error::ConfigError;
use crate::record::BucketDimension;
use serde::Deserialize;
use std::time::Duration;

/// Default number of conditional-write attempts per check before reporting contention.
pub const DEFAULT_MAX_CAS_ATTEMPTS: usize = 16;

// Identity columns of the per-dimension tables; an action slot must not shadow them.
const RESERVED_NAMES: [&str; 5] = ["user_id", "guild_id", "channel_id", "category_id", "role_id"];

/// Validated cooldown configuration for one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownSpec {
    action: String,
    limit: u32,
    window: WindowPolicy,
    dimension: BucketDimension,
    role_id: Option<u64>,
}

impl CooldownSpec {
    /// Start building a spec for `action`.
    pub fn builder(action: impl Into<String>) -> CooldownSpecBuilder {
        CooldownSpecBuilder::new(action)
    }

    /// Action name.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Admissions per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Window policy.
    pub fn window(&self) -> WindowPolicy {
        self.window
    }

    /// Bucket dimension.
    pub fn dimension(&self) -> BucketDimension {
        self.dimension
    }

    /// Role the cooldown applies to, for role buckets.
    pub fn role_id(&self) -> Option<u64> {
        self.role_id
    }
}

/// Builder for [`CooldownSpec`].
#[derive(Debug, Clone)]
pub struct CooldownSpecBuilder {
    action: String,
    rate: Option<u32>,
    window: Option<WindowPolicy>,
    dimension: BucketDimension,
    role_id: Option<u64>,
}

impl CooldownSpecBuilder {
    /// Builder with a user bucket and no rate or window yet.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            rate: None,
            window: None,
            dimension: BucketDimension::User,
            role_id: None,
        }
    }

    /// Admissions allowed per window. Must be > 0.
    pub fn rate(mut self, rate: u32) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Rolling window of `period` from the first admission. Replaces any daily reset.
    pub fn per(mut self, period: Duration) -> Self {
        self.window = Some(WindowPolicy::Rolling(period));
        self
    }

    /// Window ending at the next midnight. Replaces any rolling period.
    pub fn reset_daily(mut self) -> Self {
        self.window = Some(WindowPolicy::DailyReset);
        self
    }

    /// Bucket dimension (defaults to user).
    pub fn dimension(mut self, dimension: BucketDimension) -> Self {
        self.dimension = dimension;
        self
    }

    /// Role for role buckets.
    pub fn role(mut self, role_id: u64) -> Self {
        self.role_id = Some(role_id);
        self
    }

    /// Build the spec, validating inputs.
    pub fn build(self) -> Result<CooldownSpec, ConfigError> {
        let action = self.action;
        if action.trim().is_empty() {
            return Err(ConfigError::InvalidActionName {
                name: action,
                reason: "empty",
            });
        }
        if action.contains('\0') {
            return Err(ConfigError::InvalidActionName {
                name: action,
                reason: "contains NUL",
            });
        }
        if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(&action)) {
            return Err(ConfigError::InvalidActionName {
                name: action,
                reason: "collides with an identity column",
            });
        }

        let limit = match self.rate {
            None => return Err(ConfigError::MissingRate { action }),
            Some(0) => return Err(ConfigError::InvalidRate { action }),
            Some(n) => n,
        };

        let window = match self.window {
            None => return Err(ConfigError::MissingWindow { action }),
            Some(WindowPolicy::Rolling(period)) if period.as_secs() == 0 => {
                return Err(ConfigError::InvalidWindow { action, period })
            }
            // persisted timestamps are whole seconds
            Some(WindowPolicy::Rolling(period)) => {
                WindowPolicy::Rolling(Duration::from_secs(period.as_secs()))
            }
            Some(WindowPolicy::DailyReset) => WindowPolicy::DailyReset,
        };

        if self.dimension == BucketDimension::Role && self.role_id.is_none() {
            return Err(ConfigError::MissingRoleId { action });
        }

        Ok(CooldownSpec {
            action,
            limit,
            window,
            dimension: self.dimension,
            role_id: self.role_id,
        })
    }
}

/// One action as written in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActionConfig {
    /// Action name.
    pub name: String,
    /// Admissions per window.
    pub rate: Option<u32>,
    /// Rolling period in seconds.
    #[serde(default)]
    pub per_secs: Option<u64>,
    /// Reset at midnight instead of a rolling period; wins over `per_secs`.
    #[serde(default)]
    pub reset_daily: bool,
    /// Bucket dimension.
    #[serde(default = "default_dimension")]
    pub dimension: BucketDimension,
    /// Role for role buckets.
    #[serde(default)]
    pub role_id: Option<u64>,
}

fn default_dimension() -> BucketDimension {
    BucketDimension::User
}

impl TryFrom<ActionConfig> for CooldownSpec {
    type Error = ConfigError;

    fn try_from(cfg: ActionConfig) -> Result<Self, Self::Error> {
        let mut builder = CooldownSpec::builder(cfg.name).dimension(cfg.dimension);
        if let Some(rate) = cfg.rate {
            builder = builder.rate(rate);
        }
        if let Some(secs) = cfg.per_secs {
            builder = builder.per(Duration::from_secs(secs));
        }
        if cfg.reset_daily {
            builder = builder.reset_daily();
        }
        if let Some(role) = cfg.role_id {
            builder = builder.role(role);
        }
        builder.build()
    }
}

/// Engine settings plus the actions to register at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Clock offset east of UTC in seconds; daily resets happen at midnight in this offset.
    pub utc_offset_secs: i32,
    /// Conditional-write attempts per check before giving up with contention.
    pub max_cas_attempts: usize,
    /// Actions to register.
    pub actions: Vec<ActionConfig>,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            utc_offset_secs: 0,
            max_cas_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
            actions: Vec::new(),
        }
    }
}

impl CooldownConfig {
    /// Parse a JSON document.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Validate every action.
    pub fn specs(&self) -> Result<Vec<CooldownSpec>, ConfigError> {
        self.actions.iter().cloned().map(CooldownSpec::try_from).collect()
    }
}
