//! Platform abstraction.
//!
//! Everything the core flows need from the chat platform sits behind this
//! trait: a production Discord REST backend lives in [`crate::discord::api`],
//! and integration tests substitute a recording mock. Keeping the seam here
//! means registration, reconciliation, and verification never touch HTTP
//! directly.

use crate::discord::types::{
    ChannelId, CreateMessage, GuildId, Member, Message, MessageId, Permissions, Role, RoleId,
    UserId,
};
use async_trait::async_trait;
use thiserror::Error;

/// Platform-side failures.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform rejected the call for lack of permission.
    #[error("permission denied: {0}")]
    Denied(String),

    /// The referenced entity does not exist (member left, role deleted,
    /// unknown emoji).
    #[error("not found: {0}")]
    NotFound(String),

    /// The API rejected the request for another reason.
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure (connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed payload in either direction.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl PlatformError {
    /// Static code for metrics labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Denied(_) => "denied",
            Self::NotFound(_) => "not_found",
            Self::Api { .. } => "api",
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Chat-platform operations consumed by the core flows.
///
/// Grant/revoke carry platform-level set semantics: granting a role the
/// member already holds, or revoking one they don't hold, succeeds without
/// changing anything. The reconciler leans on that for idempotence.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Effective permissions the bot holds on a channel.
    async fn bot_permissions(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlatformResult<Permissions>;

    /// Post a message and return it.
    async fn create_message(
        &self,
        channel_id: ChannelId,
        message: &CreateMessage,
    ) -> PlatformResult<Message>;

    /// Attach one reaction to a message. `emoji` is the URL path form
    /// (`name:id` for custom emoji, the glyph for unicode).
    async fn create_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> PlatformResult<()>;

    /// Grant a role to a member.
    async fn add_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> PlatformResult<()>;

    /// Revoke a role from a member.
    async fn remove_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> PlatformResult<()>;

    /// All roles of a guild.
    async fn guild_roles(&self, guild_id: GuildId) -> PlatformResult<Vec<Role>>;

    /// Live member state, `NotFound` if they left.
    async fn guild_member(&self, guild_id: GuildId, user_id: UserId) -> PlatformResult<Member>;

    /// Ephemeral-style reply to the interaction's invoker.
    async fn interaction_reply(
        &self,
        interaction_id: u64,
        token: &str,
        content: &str,
        ephemeral: bool,
    ) -> PlatformResult<()>;
}

#[cfg(test)]
pub mod test_support {
    //! Test doubles for the platform seam.

    use super::*;
    use crate::discord::types::User;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// One recorded platform call, in invocation order.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        CreateMessage {
            channel_id: ChannelId,
            content: Option<String>,
            embed_lines: Vec<String>,
        },
        CreateReaction {
            message_id: MessageId,
            emoji: String,
        },
        AddRole {
            guild_id: GuildId,
            user_id: UserId,
            role_id: RoleId,
        },
        RemoveRole {
            guild_id: GuildId,
            user_id: UserId,
            role_id: RoleId,
        },
        InteractionReply {
            content: String,
            ephemeral: bool,
        },
    }

    /// Scriptable platform that records every call it receives.
    pub struct RecordingPlatform {
        pub permissions: Permissions,
        pub roles: Vec<Role>,
        /// Whether member lookups succeed.
        pub member_exists: bool,
        /// Role grants and revokes fail with `Denied`.
        pub deny_role_mutations: bool,
        /// Reaction seeds for these emoji path forms fail.
        pub failing_reactions: Vec<String>,
        /// Role listing fails with a transient API error.
        pub fail_role_list: bool,
        pub calls: Mutex<Vec<Call>>,
        pub next_message_id: AtomicU64,
    }

    impl Default for RecordingPlatform {
        fn default() -> Self {
            Self {
                permissions: Permissions::all(),
                roles: Vec::new(),
                member_exists: true,
                deny_role_mutations: false,
                failing_reactions: Vec::new(),
                fail_role_list: false,
                calls: Mutex::new(Vec::new()),
                next_message_id: AtomicU64::new(9000),
            }
        }
    }

    impl RecordingPlatform {
        pub fn with_roles(roles: Vec<Role>) -> Self {
            Self {
                roles,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().push(call);
        }
    }

    #[async_trait]
    impl Platform for RecordingPlatform {
        async fn bot_permissions(
            &self,
            _guild_id: GuildId,
            _channel_id: ChannelId,
        ) -> PlatformResult<Permissions> {
            Ok(self.permissions)
        }

        async fn create_message(
            &self,
            channel_id: ChannelId,
            message: &CreateMessage,
        ) -> PlatformResult<Message> {
            let embed_lines = message
                .embeds
                .iter()
                .flat_map(|e| e.fields.iter())
                .flat_map(|f| f.value.lines().map(str::to_string))
                .collect();
            self.record(Call::CreateMessage {
                channel_id,
                content: message.content.clone(),
                embed_lines,
            });
            Ok(Message {
                id: self.next_message_id.fetch_add(1, Ordering::Relaxed),
                channel_id,
            })
        }

        async fn create_reaction(
            &self,
            _channel_id: ChannelId,
            message_id: MessageId,
            emoji: &str,
        ) -> PlatformResult<()> {
            self.record(Call::CreateReaction {
                message_id,
                emoji: emoji.to_string(),
            });
            if self.failing_reactions.iter().any(|e| e == emoji) {
                return Err(PlatformError::NotFound("unknown emoji".into()));
            }
            Ok(())
        }

        async fn add_member_role(
            &self,
            guild_id: GuildId,
            user_id: UserId,
            role_id: RoleId,
            _reason: &str,
        ) -> PlatformResult<()> {
            self.record(Call::AddRole {
                guild_id,
                user_id,
                role_id,
            });
            if self.deny_role_mutations {
                return Err(PlatformError::Denied("role hierarchy".into()));
            }
            Ok(())
        }

        async fn remove_member_role(
            &self,
            guild_id: GuildId,
            user_id: UserId,
            role_id: RoleId,
            _reason: &str,
        ) -> PlatformResult<()> {
            self.record(Call::RemoveRole {
                guild_id,
                user_id,
                role_id,
            });
            if self.deny_role_mutations {
                return Err(PlatformError::Denied("role hierarchy".into()));
            }
            Ok(())
        }

        async fn guild_roles(&self, _guild_id: GuildId) -> PlatformResult<Vec<Role>> {
            if self.fail_role_list {
                return Err(PlatformError::Api {
                    status: 500,
                    message: "temporarily unavailable".into(),
                });
            }
            Ok(self.roles.clone())
        }

        async fn guild_member(
            &self,
            _guild_id: GuildId,
            user_id: UserId,
        ) -> PlatformResult<Member> {
            if !self.member_exists {
                return Err(PlatformError::NotFound("unknown member".into()));
            }
            Ok(Member {
                user: Some(User {
                    id: user_id,
                    username: "member".to_string(),
                    bot: false,
                }),
                roles: Vec::new(),
            })
        }

        async fn interaction_reply(
            &self,
            _interaction_id: u64,
            _token: &str,
            content: &str,
            ephemeral: bool,
        ) -> PlatformResult<()> {
            self.record(Call::InteractionReply {
                content: content.to_string(),
                ephemeral,
            });
            Ok(())
        }
    }

    pub struct NullPlatform;

    #[async_trait]
    impl Platform for NullPlatform {
        async fn bot_permissions(
            &self,
            _guild_id: GuildId,
            _channel_id: ChannelId,
        ) -> PlatformResult<Permissions> {
            Ok(Permissions::empty())
        }

        async fn create_message(
            &self,
            _channel_id: ChannelId,
            _message: &CreateMessage,
        ) -> PlatformResult<Message> {
            Err(PlatformError::Transport("null platform".into()))
        }

        async fn create_reaction(
            &self,
            _channel_id: ChannelId,
            _message_id: MessageId,
            _emoji: &str,
        ) -> PlatformResult<()> {
            Ok(())
        }

        async fn add_member_role(
            &self,
            _guild_id: GuildId,
            _user_id: UserId,
            _role_id: RoleId,
            _reason: &str,
        ) -> PlatformResult<()> {
            Ok(())
        }

        async fn remove_member_role(
            &self,
            _guild_id: GuildId,
            _user_id: UserId,
            _role_id: RoleId,
            _reason: &str,
        ) -> PlatformResult<()> {
            Ok(())
        }

        async fn guild_roles(&self, _guild_id: GuildId) -> PlatformResult<Vec<Role>> {
            Ok(Vec::new())
        }

        async fn guild_member(
            &self,
            _guild_id: GuildId,
            _user_id: UserId,
        ) -> PlatformResult<Member> {
            Err(PlatformError::NotFound("null platform".into()))
        }

        async fn interaction_reply(
            &self,
            _interaction_id: u64,
            _token: &str,
            _content: &str,
            _ephemeral: bool,
        ) -> PlatformResult<()> {
            Ok(())
        }
    }
}
