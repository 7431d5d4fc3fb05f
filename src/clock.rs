//! Clock abstractions used by the admission engine.
//!
//! Every timestamp the engine sees is a naive wall-clock instant in the configured
//! offset, truncated to whole seconds so that values compare the same before and
//! after a round-trip through the store's text format.

use crate::error::ConfigError;
use chrono::{FixedOffset, NaiveDateTime, Offset, SubsecRound, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Clock abstraction so timing can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current instant in the clock's offset, whole seconds.
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock backed by `Utc::now()` and shifted by a fixed offset.
///
/// The offset is a constant shift, not a time zone: there is no daylight-saving
/// handling, matching how daily resets have always been computed.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    /// Clock reporting UTC.
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Clock reporting wall time in `offset`.
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Clock shifted `seconds` east of UTC; errors if the shift is a day or more.
    pub fn from_offset_seconds(seconds: i32) -> Result<Self, ConfigError> {
        FixedOffset::east_opt(seconds)
            .map(Self::with_offset)
            .ok_or(ConfigError::InvalidOffset { seconds })
    }

    /// The configured offset.
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::utc()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local().trunc_subsecs(0)
    }
}

/// Test clock whose instant only moves when told to.
///
/// Clones share the same instant, so a handle kept by the test can drive a clock
/// that was moved into a [`Cooldown`](crate::Cooldown).
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl ManualClock {
    /// Start the clock at `start` (sub-seconds are dropped).
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start.trunc_subsecs(0))),
        }
    }

    /// Jump to `instant`.
    pub fn set(&self, instant: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = instant.trunc_subsecs(0);
    }

    /// Move forward by `by`, saturating at the largest representable instant.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard = crate::engine::saturating_add(*guard, by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
