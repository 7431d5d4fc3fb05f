//! Error types for cooldown registration, storage and enforcement.
use crate::record::BucketDimension;
use std::time::Duration;

/// Boxed backend error carried by [`StoreError::Backend`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Inconsistent cooldown configuration, raised at registration time.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// Action names become storage slots and must be non-empty and not shadow identity columns.
    #[error("action name {name:?} is not usable: {reason}")]
    InvalidActionName {
        /// Offending name.
        name: String,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// No rate supplied.
    #[error("cooldown for '{action}' needs a rate")]
    MissingRate {
        /// Action being configured.
        action: String,
    },
    /// Rate must be > 0.
    #[error("rate for '{action}' must be > 0")]
    InvalidRate {
        /// Action being configured.
        action: String,
    },
    /// Neither a rolling period nor a daily reset supplied.
    #[error("cooldown for '{action}' needs either a period or a daily reset")]
    MissingWindow {
        /// Action being configured.
        action: String,
    },
    /// Rolling period must be at least one second.
    #[error("period for '{action}' must be at least one second (got {period:?})")]
    InvalidWindow {
        /// Action being configured.
        action: String,
        /// Value provided by caller.
        period: Duration,
    },
    /// Role buckets need the role they apply to.
    #[error("role cooldown for '{action}' needs a role id")]
    MissingRoleId {
        /// Action being configured.
        action: String,
    },
    /// The action is already registered with different parameters.
    #[error("action '{action}' is already registered with a different cooldown")]
    ConflictingRegistration {
        /// Action being configured.
        action: String,
    },
    /// Clock offset must be strictly within one day of UTC.
    #[error("utc offset must be within +/-86399 seconds (got {seconds})")]
    InvalidOffset {
        /// Value provided by caller.
        seconds: i32,
    },
}

/// A stored payload that could not be parsed into a record.
///
/// Treated as "no record" by the engine but logged, since it points at tampering or a
/// format migration gap.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed cooldown record: {reason}")]
pub struct MalformedRecord {
    /// Why parsing failed.
    pub reason: String,
}

impl MalformedRecord {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Failure talking to the persistent store.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// Connectivity or statement failure in the backend.
    #[error("store backend failure: {0}")]
    Backend(#[source] BoxError),
    /// Stored payload could not be decoded.
    #[error(transparent)]
    Malformed(#[from] MalformedRecord),
    /// Conditional writes kept losing to concurrent writers.
    #[error("gave up after {attempts} conflicting writes")]
    Contention {
        /// Attempts made before giving up.
        attempts: usize,
    },
}

impl StoreError {
    /// Wrap any backend error.
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        StoreError::Backend(err.into())
    }

    /// Check if this error is a malformed payload.
    pub fn is_malformed(&self) -> bool {
        matches!(self, StoreError::Malformed(_))
    }

    /// Check if this error is CAS contention.
    pub fn is_contention(&self) -> bool {
        matches!(self, StoreError::Contention { .. })
    }
}

/// Denial signal: the action is on cooldown for this scope.
///
/// Not a failure of the engine; hosts map it to their own rejection message.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("'{action}' is on cooldown ({dimension} bucket, limit {limit}); retry in {}s", .retry_after.as_secs())]
pub struct CooldownActive {
    /// Action that was denied.
    pub action: String,
    /// Bucket the cooldown is scoped to.
    pub dimension: BucketDimension,
    /// Configured admissions per window.
    pub limit: u32,
    /// Time until the active window ends.
    pub retry_after: Duration,
}

impl CooldownActive {
    /// Whole seconds until the window ends.
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after.as_secs()
    }
}

/// Top-level error for facade operations.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum CooldownError {
    /// Registration was rejected.
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    /// The store failed; not retried.
    #[error("store: {0}")]
    Store(#[from] StoreError),
    /// `check` on an action that was never registered.
    #[error("no cooldown registered for action '{action}'")]
    UnknownAction {
        /// Requested action.
        action: String,
    },
    /// The blocking adapter could not start its runtime.
    #[error("runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl CooldownError {
    /// Borrow the store error if present.
    pub fn as_store(&self) -> Option<&StoreError> {
        match self {
            CooldownError::Store(e) => Some(e),
            _ => None,
        }
    }
}

/// Error returned by [`CooldownService`](crate::middleware::CooldownService).
#[derive(thiserror::Error, Debug)]
pub enum GuardError<E> {
    /// The request was denied by an active cooldown.
    #[error(transparent)]
    CooldownActive(CooldownActive),
    /// The cooldown engine itself failed (store outage, unknown action).
    #[error(transparent)]
    Cooldown(CooldownError),
    /// The inner service failed.
    #[error("{0}")]
    Inner(E),
}

impl<E> GuardError<E> {
    /// Check if this error is a cooldown denial.
    pub fn is_cooldown_active(&self) -> bool {
        matches!(self, GuardError::CooldownActive(_))
    }

    /// Get the inner error if this is an Inner variant.
    pub fn into_inner(self) -> Option<E> {
        match self {
            GuardError::Inner(e) => Some(e),
            _ => None,
        }
    }
}
