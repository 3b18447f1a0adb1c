//! Verification flow.
//!
//! Setup posts a message with a persistent button and records the guild's
//! config (one per guild, newest wins). Activation grants the configured
//! role to whoever pressed the button and drops an audit line into the
//! configured log channel, best-effort.

use crate::discord::types::{
    ActionRow, ChannelId, CreateMessage, Embed, GuildId, Interaction, MessageId, Permissions,
    RoleId,
};
use crate::error::{CommandError, CommandResult};
use crate::state::Bot;
use crate::store::VerifyConfigRecord;
use chrono::Utc;
use tracing::{debug, info, warn};

/// Component custom id for the verification button.
pub const VERIFY_BUTTON_ID: &str = "rolecall_verify";

/// Capabilities verification setup needs on the target channel.
const SETUP_PERMISSIONS: Permissions = Permissions::MANAGE_ROLES
    .union(Permissions::SEND_MESSAGES)
    .union(Permissions::EMBED_LINKS)
    .union(Permissions::VIEW_CHANNEL);

/// Operator request to set up verification.
#[derive(Debug, Clone)]
pub struct SetupVerification {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub role_id: RoleId,
    pub log_channel: Option<ChannelId>,
}

/// Post the button message and persist the config, replacing any previous
/// one for this guild. The superseded button message is left in place.
pub async fn setup(bot: &Bot, req: SetupVerification) -> CommandResult<MessageId> {
    let held = bot
        .platform
        .bot_permissions(req.guild_id, req.channel_id)
        .await?;
    let missing = held.missing_names(SETUP_PERMISSIONS);
    if !missing.is_empty() {
        return Err(CommandError::InsufficientPermissions(missing));
    }

    let embed = Embed {
        title: Some("Verification".to_string()),
        description: Some(format!(
            "Press **{}** below to verify and unlock the server.",
            bot.config.verify.button_label
        )),
        ..Default::default()
    };
    let message = bot
        .platform
        .create_message(
            req.channel_id,
            &CreateMessage {
                embeds: vec![embed],
                components: vec![ActionRow::button(
                    &bot.config.verify.button_label,
                    VERIFY_BUTTON_ID,
                )],
                ..Default::default()
            },
        )
        .await?;

    let record = VerifyConfigRecord {
        role_id: req.role_id,
        log_channel: req.log_channel,
        message_id: message.id,
        channel_id: req.channel_id,
    };
    bot.verify
        .insert(req.guild_id, record)
        .map_err(|e| CommandError::Internal(format!("store write failed: {e}")))?;

    info!(
        guild_id = req.guild_id,
        message_id = message.id,
        role_id = req.role_id,
        "Verification configured"
    );
    Ok(message.id)
}

/// Handle a verification button press. Replies to the interaction itself;
/// never returns an error because the only audience is the button presser.
pub async fn grant(bot: &Bot, interaction: &Interaction) {
    let reply = |content: String| async move {
        if let Err(e) = bot
            .platform
            .interaction_reply(interaction.id, &interaction.token, &content, true)
            .await
        {
            warn!(error = %e, "Failed to answer verification interaction");
        }
    };

    let (Some(guild_id), Some(user_id)) = (interaction.guild_id, interaction.user_id()) else {
        debug!("Verification press outside a guild, ignoring");
        return;
    };

    let Some(config) = bot.verify.get(guild_id) else {
        reply("Verification isn't configured on this server.".to_string()).await;
        return;
    };

    // The configured role must still exist. A failure to list roles is a
    // transient condition, not a missing role, and reads as retryable.
    let roles = match bot.platform.guild_roles(guild_id).await {
        Ok(roles) => roles,
        Err(e) => {
            warn!(guild_id, error = %e, "Role list unavailable during verification");
            reply("Something went wrong, try again in a moment.".to_string()).await;
            return;
        }
    };
    if !roles.iter().any(|r| r.id == config.role_id) {
        reply("The verification role no longer exists. Tell an admin.".to_string()).await;
        return;
    }

    match bot
        .platform
        .add_member_role(guild_id, user_id, config.role_id, "Verification button")
        .await
    {
        Ok(()) => {
            crate::metrics::role_mutation("grant");
            if let Some(counter) = crate::metrics::VERIFY_GRANTS.get() {
                counter.inc();
            }
            reply("You're verified. Welcome!".to_string()).await;
            audit(bot, guild_id, user_id, config.role_id, &config).await;
        }
        Err(e) if e.is_denied() => {
            reply(
                "I couldn't assign the role: my role is probably below it. Tell an admin."
                    .to_string(),
            )
            .await;
        }
        Err(e) => {
            warn!(guild_id, user_id, error = %e, "Verification grant failed");
            reply("Something went wrong, try again in a moment.".to_string()).await;
        }
    }
}

/// One line to the log channel if configured. Failures are logged and
/// forgotten; auditing never blocks a grant.
async fn audit(
    bot: &Bot,
    guild_id: GuildId,
    user_id: u64,
    role_id: RoleId,
    config: &VerifyConfigRecord,
) {
    let Some(log_channel) = config.log_channel else {
        return;
    };
    let line = format!(
        "`{}` <@{}> verified and received <@&{}>",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        user_id,
        role_id
    );
    if let Err(e) = bot
        .platform
        .create_message(
            log_channel,
            &CreateMessage {
                content: Some(line),
                ..Default::default()
            },
        )
        .await
    {
        debug!(guild_id, log_channel, error = %e, "Audit line failed, ignoring");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::types::Role;
    use crate::error::CommandError;
    use crate::platform::test_support::{Call, RecordingPlatform};
    use crate::state::test_support::bot_with;
    use serde_json::json;
    use std::sync::Arc;

    const GUILD: u64 = 1;
    const ROLE: u64 = 11;
    const USER: u64 = 77;

    fn verified_role() -> Vec<Role> {
        vec![Role {
            id: ROLE,
            name: "Member".to_string(),
            permissions: Permissions::empty(),
        }]
    }

    fn setup_request(log_channel: Option<ChannelId>) -> SetupVerification {
        SetupVerification {
            guild_id: GUILD,
            channel_id: 2,
            role_id: ROLE,
            log_channel,
        }
    }

    fn button_press() -> Interaction {
        serde_json::from_value(json!({
            "id": "900",
            "token": "tok",
            "type": 3,
            "guild_id": GUILD.to_string(),
            "data": { "custom_id": VERIFY_BUTTON_ID },
            "member": { "user": { "id": USER.to_string(), "username": "sam" }, "roles": [] }
        }))
        .unwrap()
    }

    async fn configured_bot(
        platform: Arc<RecordingPlatform>,
        log_channel: Option<ChannelId>,
    ) -> (crate::state::Bot, tempfile::TempDir) {
        let (bot, dir) = bot_with(platform);
        setup(&bot, setup_request(log_channel)).await.unwrap();
        (bot, dir)
    }

    #[tokio::test]
    async fn setup_posts_button_and_persists_config() {
        let platform = Arc::new(RecordingPlatform::with_roles(verified_role()));
        let (bot, _dir) = bot_with(platform.clone());

        let message_id = setup(&bot, setup_request(Some(9))).await.unwrap();

        let config = bot.verify.get(GUILD).expect("config persisted");
        assert_eq!(config.role_id, ROLE);
        assert_eq!(config.log_channel, Some(9));
        assert_eq!(config.message_id, message_id);
        assert!(matches!(
            platform.calls()[0],
            Call::CreateMessage { channel_id: 2, .. }
        ));
    }

    #[tokio::test]
    async fn second_setup_replaces_the_first() {
        let platform = Arc::new(RecordingPlatform::with_roles(verified_role()));
        let (bot, _dir) = configured_bot(platform.clone(), Some(9)).await;

        let mut second = setup_request(None);
        second.role_id = 99;
        setup(&bot, second).await.unwrap();

        let config = bot.verify.get(GUILD).unwrap();
        assert_eq!(config.role_id, 99);
        assert_eq!(config.log_channel, None);
    }

    #[tokio::test]
    async fn setup_requires_channel_permissions() {
        let platform = Arc::new(RecordingPlatform {
            permissions: Permissions::SEND_MESSAGES,
            ..RecordingPlatform::default()
        });
        let (bot, _dir) = bot_with(platform.clone());

        let err = setup(&bot, setup_request(None)).await.unwrap_err();
        assert!(matches!(err, CommandError::InsufficientPermissions(_)));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn press_grants_role_replies_and_audits() {
        let platform = Arc::new(RecordingPlatform::with_roles(verified_role()));
        let (bot, _dir) = configured_bot(platform.clone(), Some(9)).await;

        grant(&bot, &button_press()).await;

        let calls = platform.calls();
        // Skip the setup message, then: grant, welcome reply, audit line.
        assert_eq!(
            calls[1],
            Call::AddRole {
                guild_id: GUILD,
                user_id: USER,
                role_id: ROLE
            }
        );
        assert!(matches!(
            &calls[2],
            Call::InteractionReply { content, ephemeral: true } if content.contains("verified")
        ));
        match &calls[3] {
            Call::CreateMessage {
                channel_id: 9,
                content: Some(line),
                ..
            } => {
                assert!(line.contains(&format!("<@{USER}>")));
                assert!(line.contains(&format!("<@&{ROLE}>")));
            }
            other => panic!("expected audit line, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn press_without_config_gets_a_reply_and_no_grant() {
        let platform = Arc::new(RecordingPlatform::with_roles(verified_role()));
        let (bot, _dir) = bot_with(platform.clone());

        grant(&bot, &button_press()).await;

        assert!(matches!(
            &platform.calls()[..],
            [Call::InteractionReply { content, .. }] if content.contains("isn't configured")
        ));
    }

    #[tokio::test]
    async fn press_with_deleted_role_gets_a_reply_and_no_grant() {
        // Configure against a live role list, then forget the roles.
        let platform = Arc::new(RecordingPlatform::default());
        let (bot, _dir) = configured_bot(platform.clone(), None).await;

        grant(&bot, &button_press()).await;

        let calls = platform.calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::AddRole { .. })));
        assert!(matches!(
            &calls[1],
            Call::InteractionReply { content, .. } if content.contains("no longer exists")
        ));
    }

    #[tokio::test]
    async fn role_list_outage_reads_as_retryable_not_missing_role() {
        let setup_platform = Arc::new(RecordingPlatform::with_roles(verified_role()));
        let (bot, _dir) = configured_bot(setup_platform, None).await;

        let flaky = Arc::new(RecordingPlatform {
            roles: verified_role(),
            fail_role_list: true,
            ..RecordingPlatform::default()
        });
        let bot = crate::state::Bot::new(bot.config.clone(), flaky.clone());

        grant(&bot, &button_press()).await;

        let calls = flaky.calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::AddRole { .. })));
        assert!(matches!(
            &calls[..],
            [Call::InteractionReply { content, .. }]
                if content.contains("try again") && !content.contains("no longer exists")
        ));
    }

    #[tokio::test]
    async fn denied_grant_reports_hierarchy_problem() {
        let platform = Arc::new(RecordingPlatform {
            roles: verified_role(),
            deny_role_mutations: true,
            ..RecordingPlatform::default()
        });
        let (bot, _dir) = configured_bot(platform.clone(), None).await;

        grant(&bot, &button_press()).await;

        let calls = platform.calls();
        assert!(matches!(
            &calls[2],
            Call::InteractionReply { content, .. } if content.contains("below it")
        ));
    }

    #[tokio::test]
    async fn no_log_channel_means_no_audit_message() {
        let platform = Arc::new(RecordingPlatform::with_roles(verified_role()));
        let (bot, _dir) = configured_bot(platform.clone(), None).await;

        grant(&bot, &button_press()).await;

        let audits = platform
            .calls()
            .iter()
            .skip(1) // the setup post
            .filter(|c| matches!(c, Call::CreateMessage { .. }))
            .count();
        assert_eq!(audits, 0);
    }
}
