//! Admission engine: the pure decision function behind every check.
//!
//! Semantics:
//! - No record, or a record whose window has ended (`now > expires_at`), admits and starts a
//!   fresh window measured from `now` with `count = 1`. Elapsed windows are replaced wholesale,
//!   never advanced incrementally.
//! - Inside an active window, `count < limit` admits and increments.
//! - Otherwise the call is denied with `retry_after = expires_at - now` and the record is left
//!   untouched.
//!
//! Invariants:
//! - A record produced by [`decide`] never has `count > limit`.
//! - The boundary instant (`now == expires_at`) belongs to the old window.
//!
//! The engine does no I/O; the facade reads the record, calls [`decide`] and persists
//! [`Admission::next`] with a conditional write.

use crate::record::{CooldownRecord, WindowKind};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use std::time::Duration;

/// Window policy as configured for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowPolicy {
    /// Window ends this long after its first admission.
    Rolling(Duration),
    /// Window ends at the next midnight in the clock's offset.
    DailyReset,
}

impl WindowPolicy {
    /// Persisted kind of this policy.
    pub fn kind(&self) -> WindowKind {
        match self {
            WindowPolicy::Rolling(_) => WindowKind::Rolling,
            WindowPolicy::DailyReset => WindowKind::DailyReset,
        }
    }
}

/// Outcome of one admission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Whether the invocation may proceed.
    pub admit: bool,
    /// Record to persist when admitted; the unchanged record when denied.
    pub next: CooldownRecord,
    /// Time until the active window ends; `Some` only when denied.
    pub retry_after: Option<Duration>,
}

/// Decide whether an invocation is admitted given the current record.
pub fn decide(
    limit: u32,
    window: WindowPolicy,
    record: Option<&CooldownRecord>,
    now: NaiveDateTime,
) -> Admission {
    match record {
        Some(current) if !current.is_elapsed(now) => {
            if current.count < limit {
                Admission {
                    admit: true,
                    next: CooldownRecord {
                        limit,
                        count: current.count + 1,
                        ..current.clone()
                    },
                    retry_after: None,
                }
            } else {
                Admission {
                    admit: false,
                    next: current.clone(),
                    retry_after: Some(retry_after(current.expires_at, now)),
                }
            }
        }
        // absent or rolled over
        _ => Admission {
            admit: true,
            next: fresh(limit, window, now),
            retry_after: None,
        },
    }
}

/// First record of a new window starting at `now`.
pub fn fresh(limit: u32, window: WindowPolicy, now: NaiveDateTime) -> CooldownRecord {
    CooldownRecord {
        limit,
        count: 1,
        expires_at: compute_expiry(now, window),
        window: window.kind(),
    }
}

/// End of a window that starts at `now`.
///
/// Daily windows end at the midnight strictly after `now`, so an action first used at
/// 23:59 still expires at the coming midnight rather than a day later.
pub fn compute_expiry(now: NaiveDateTime, window: WindowPolicy) -> NaiveDateTime {
    match window {
        WindowPolicy::Rolling(period) => saturating_add(now, period),
        WindowPolicy::DailyReset => {
            now.date().succ_opt().unwrap_or(NaiveDate::MAX).and_time(NaiveTime::MIN)
        }
    }
}

/// Give one usage back: `count - 1` while above one, otherwise clear the record.
pub fn refund(record: &CooldownRecord) -> Option<CooldownRecord> {
    if record.count > 1 {
        Some(CooldownRecord {
            count: record.count - 1,
            ..record.clone()
        })
    } else {
        None
    }
}

/// `expires_at - now`, clamped at zero and rounded to whole seconds.
pub fn retry_after(expires_at: NaiveDateTime, now: NaiveDateTime) -> Duration {
    let millis = (expires_at - now).num_milliseconds().max(0);
    Duration::from_secs(((millis + 500) / 1000) as u64)
}

pub(crate) fn saturating_add(ts: NaiveDateTime, by: Duration) -> NaiveDateTime {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| ts.checked_add_signed(delta))
        .unwrap_or(NaiveDateTime::MAX)
}
