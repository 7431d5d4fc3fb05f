//! Cooldown keys, records and the persisted payload format.
//!
//! Records are persisted as a versioned JSON object:
//!
//! ```text
//! {"v":1,"limit":2,"count":1,"expires_at":"2024-01-02 00:00:00","window":"daily_reset"}
//! ```
//!
//! The decoder also reads the two layouts older releases wrote: a JSON object with
//! `rate` instead of `limit` (no `v`, plus an ignored `type` member) and the
//! comma-joined triple `limit, count, expires_at`. Both decode as rolling windows.

use crate::error::MalformedRecord;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Text format of persisted timestamps; always whole seconds in the engine's offset.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current payload schema version.
pub const PAYLOAD_VERSION: u32 = 1;

/// Scoping axis a cooldown applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketDimension {
    /// One bucket per user.
    User,
    /// One bucket per user within a guild.
    Guild,
    /// One bucket per user within a text channel.
    Channel,
    /// One bucket per user within a channel category.
    Category,
    /// One bucket per user holding a given role.
    Role,
}

impl BucketDimension {
    /// All dimensions, in table-creation order.
    pub const ALL: [BucketDimension; 5] = [
        BucketDimension::User,
        BucketDimension::Guild,
        BucketDimension::Channel,
        BucketDimension::Category,
        BucketDimension::Role,
    ];

    /// Lowercase name, also used as the table suffix.
    pub fn as_str(self) -> &'static str {
        match self {
            BucketDimension::User => "user",
            BucketDimension::Guild => "guild",
            BucketDimension::Channel => "channel",
            BucketDimension::Category => "category",
            BucketDimension::Role => "role",
        }
    }

    /// Identity column holding the scope id, beside `user_id`. `None` for [`User`](Self::User).
    pub fn scope_column(self) -> Option<&'static str> {
        match self {
            BucketDimension::User => None,
            BucketDimension::Guild => Some("guild_id"),
            BucketDimension::Channel => Some("channel_id"),
            BucketDimension::Category => Some("category_id"),
            BucketDimension::Role => Some("role_id"),
        }
    }
}

impl fmt::Display for BucketDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete scope within a dimension: one row in that dimension's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    /// Bucket dimension.
    pub dimension: BucketDimension,
    /// Invoking user.
    pub user_id: u64,
    /// Guild, channel, category or role id; equals `user_id` for user buckets.
    pub scope_id: u64,
}

impl ScopeKey {
    /// User bucket.
    pub fn user(user_id: u64) -> Self {
        Self {
            dimension: BucketDimension::User,
            user_id,
            scope_id: user_id,
        }
    }

    /// Bucket for `user_id` within `scope_id` of `dimension`.
    pub fn new(dimension: BucketDimension, user_id: u64, scope_id: u64) -> Self {
        match dimension {
            BucketDimension::User => Self::user(user_id),
            _ => Self {
                dimension,
                user_id,
                scope_id,
            },
        }
    }

    /// Key for `action` within this scope.
    pub fn action(self, action: impl Into<String>) -> CooldownKey {
        CooldownKey {
            scope: self,
            action: action.into(),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dimension {
            BucketDimension::User => write!(f, "user:{}", self.user_id),
            d => write!(f, "{}:{}/user:{}", d, self.scope_id, self.user_id),
        }
    }
}

/// Identifies one record: a scope plus an action name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    /// Scope the record belongs to.
    pub scope: ScopeKey,
    /// Action (command) name.
    pub action: String,
}

impl CooldownKey {
    /// Dimension of the key's scope.
    pub fn dimension(&self) -> BucketDimension {
        self.scope.dimension
    }
}

impl fmt::Display for CooldownKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.scope, self.action)
    }
}

/// How a window's end is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// Ends a fixed duration after the first admission.
    #[default]
    Rolling,
    /// Ends at the next local midnight.
    DailyReset,
}

/// Persisted state for one [`CooldownKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownRecord {
    /// Max admissions per window (configuration echoed into the record).
    pub limit: u32,
    /// Admissions granted in the current window.
    pub count: u32,
    /// End of the current window.
    pub expires_at: NaiveDateTime,
    /// Window policy that produced `expires_at`.
    pub window: WindowKind,
}

impl CooldownRecord {
    /// Whether the window has ended at `now`. The boundary instant still belongs to the window.
    pub fn is_elapsed(&self, now: NaiveDateTime) -> bool {
        now > self.expires_at
    }

    /// Admissions left in the window, saturating at zero.
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }

    /// Encode as the current payload version.
    pub fn encode(&self) -> Result<String, MalformedRecord> {
        let payload = Payload {
            v: PAYLOAD_VERSION,
            limit: self.limit,
            count: self.count,
            expires_at: format_timestamp(self.expires_at),
            window: self.window,
        };
        serde_json::to_string(&payload).map_err(|e| MalformedRecord::new(e.to_string()))
    }

    /// Decode any payload layout this crate has ever written.
    pub fn decode(raw: &str) -> Result<Self, MalformedRecord> {
        let raw = raw.trim();
        if raw.starts_with('{') {
            Self::decode_json(raw)
        } else {
            Self::decode_triple(raw)
        }
    }

    fn decode_json(raw: &str) -> Result<Self, MalformedRecord> {
        let payload: Payload =
            serde_json::from_str(raw).map_err(|e| MalformedRecord::new(e.to_string()))?;
        if payload.v > PAYLOAD_VERSION {
            return Err(MalformedRecord::new(format!(
                "unsupported payload version {} (newest known is {})",
                payload.v, PAYLOAD_VERSION
            )));
        }
        Ok(Self {
            limit: payload.limit,
            count: payload.count,
            expires_at: parse_timestamp(&payload.expires_at)?,
            window: payload.window,
        })
    }

    fn decode_triple(raw: &str) -> Result<Self, MalformedRecord> {
        let parts: Vec<&str> = raw.splitn(3, ',').map(str::trim).collect();
        let [limit, count, expires_at] = parts.as_slice() else {
            return Err(MalformedRecord::new(format!(
                "expected 3 comma-separated fields in {raw:?}"
            )));
        };
        let number = |field: &str, name: &str| {
            field
                .parse::<u32>()
                .map_err(|e| MalformedRecord::new(format!("{name} {field:?}: {e}")))
        };
        Ok(Self {
            limit: number(*limit, "limit")?,
            count: number(*count, "count")?,
            expires_at: parse_timestamp(*expires_at)?,
            window: WindowKind::Rolling,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct Payload {
    // absent in payloads written before versioning
    #[serde(default)]
    v: u32,
    #[serde(alias = "rate")]
    limit: u32,
    count: u32,
    expires_at: String,
    #[serde(default)]
    window: WindowKind,
}

/// Render a timestamp in [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp written in [`TIMESTAMP_FORMAT`].
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, MalformedRecord> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|e| MalformedRecord::new(format!("timestamp {raw:?}: {e}")))
}
