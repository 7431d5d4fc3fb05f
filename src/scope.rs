//! Scope resolution: which bucket an invocation falls into.
//!
//! This is the only dimension-specific code in the crate. When a dimension does not apply to
//! an invocation (a guild cooldown used in a direct message, a channel cooldown in a voice
//! channel, ...) the resolver returns `None` and the facade admits without touching the store.

use crate::record::{BucketDimension, ScopeKey};

/// Kind of channel an invocation happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Guild text channel.
    Text,
    /// Guild announcement (news) channel.
    Announcement,
    /// Guild voice or stage channel.
    Voice,
    /// Direct or group message.
    Direct,
    /// Thread inside a guild channel.
    Thread,
    /// Anything else.
    Other,
}

impl ChannelKind {
    /// Text-capable guild channels carry channel cooldowns.
    pub fn is_text_capable(self) -> bool {
        matches!(self, ChannelKind::Text | ChannelKind::Announcement)
    }
}

/// Channel an invocation happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelInfo {
    /// Channel id.
    pub id: u64,
    /// Channel type.
    pub kind: ChannelKind,
    /// Parent category, if any.
    pub category_id: Option<u64>,
}

/// What the host knows about one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvocationContext {
    /// Invoking actor.
    pub user_id: u64,
    /// Enclosing guild; `None` for direct interactions.
    pub guild_id: Option<u64>,
    /// Channel of the invocation.
    pub channel: Option<ChannelInfo>,
    /// Roles the actor currently holds.
    pub role_ids: Vec<u64>,
}

impl InvocationContext {
    /// Context for `user_id` with nothing else known.
    pub fn user(user_id: u64) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }

    /// Set the enclosing guild.
    pub fn in_guild(mut self, guild_id: u64) -> Self {
        self.guild_id = Some(guild_id);
        self
    }

    /// Set the channel.
    pub fn in_channel(mut self, id: u64, kind: ChannelKind, category_id: Option<u64>) -> Self {
        self.channel = Some(ChannelInfo {
            id,
            kind,
            category_id,
        });
        self
    }

    /// Set the actor's roles.
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = u64>) -> Self {
        self.role_ids = roles.into_iter().collect();
        self
    }

    /// Whether the actor holds `role_id`.
    pub fn has_role(&self, role_id: u64) -> bool {
        self.role_ids.contains(&role_id)
    }
}

/// Map an invocation to its scope within `dimension`.
///
/// `role_id` is only consulted for [`BucketDimension::Role`]; registration guarantees it is
/// present for role cooldowns.
pub fn resolve(
    dimension: BucketDimension,
    role_id: Option<u64>,
    ctx: &InvocationContext,
) -> Option<ScopeKey> {
    let user = ctx.user_id;
    let scope_id = match dimension {
        BucketDimension::User => return Some(ScopeKey::user(user)),
        BucketDimension::Guild => ctx.guild_id?,
        BucketDimension::Channel => ctx.channel.filter(|c| c.kind.is_text_capable())?.id,
        BucketDimension::Category => ctx.channel?.category_id?,
        BucketDimension::Role => {
            let role = role_id?;
            // roles only exist inside a guild
            ctx.guild_id?;
            if !ctx.has_role(role) {
                return None;
            }
            role
        }
    };
    Some(ScopeKey::new(dimension, user, scope_id))
}
