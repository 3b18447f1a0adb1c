//! Reaction-post registration.
//!
//! The one flow that creates persistent state. Ordering is deliberate:
//! everything that can be validated (permissions, syntax, role resolution)
//! happens before the first remote write, so validation failures have zero
//! side effects. After the announcement is posted there is no rollback:
//! a record-write failure leaves the message orphaned and is only logged.

use crate::discord::types::{
    ChannelId, CreateMessage, Embed, EmbedField, EmbedFooter, EmbedImage, GuildId, MessageId,
    Permissions,
};
use crate::emoji;
use crate::error::{CommandError, CommandResult};
use crate::pairs;
use crate::state::Bot;
use crate::store::ReactionMessageRecord;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pause between reaction seeds, to stay under the per-channel rate limit.
pub const SEED_DELAY: Duration = Duration::from_millis(300);

/// Operator request to create a reaction post.
#[derive(Debug, Clone)]
pub struct CreateReactionPost {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub title: String,
    pub description: String,
    pub pairs: String,
    pub image_url: Option<String>,
}

/// Create a reaction post: preflight, parse, resolve, announce, persist,
/// seed. Returns the announcement's message id.
pub async fn create_reaction_post(bot: &Bot, req: CreateReactionPost) -> CommandResult<MessageId> {
    // Preflight: every capability the rest of the flow will need.
    let held = bot
        .platform
        .bot_permissions(req.guild_id, req.channel_id)
        .await?;
    let missing = held.missing_names(Permissions::REACTION_POST);
    if !missing.is_empty() {
        return Err(CommandError::InsufficientPermissions(missing));
    }

    // Validate input before any side effect.
    let bindings = pairs::parse(&req.pairs)?;
    let roles = bot.platform.guild_roles(req.guild_id).await?;
    let resolved = pairs::resolve(bindings, &roles)?;

    // Announce. Every binding renders a line, duplicates included; the map
    // below is where last-write-wins kicks in.
    let mut embed = Embed {
        title: Some(req.title),
        description: Some(req.description),
        footer: Some(EmbedFooter {
            text: "Remove your reaction to drop the role".to_string(),
        }),
        image: req.image_url.map(|url| EmbedImage { url }),
        ..Default::default()
    };
    if !resolved.is_empty() {
        let lines: Vec<String> = resolved
            .iter()
            .map(|b| format!("{}  →  <@&{}>", b.display, b.role_id))
            .collect();
        embed.fields.push(EmbedField {
            name: "React to get a role".to_string(),
            value: lines.join("\n"),
            inline: false,
        });
    }
    let message = bot
        .platform
        .create_message(
            req.channel_id,
            &CreateMessage {
                embeds: vec![embed],
                ..Default::default()
            },
        )
        .await?;

    // Persist. From here on the announcement exists; failures get logged
    // against it instead of undoing it.
    let mut emoji_map = HashMap::new();
    for b in &resolved {
        emoji_map.insert(b.emoji_key.clone(), b.role_id);
    }
    let record = ReactionMessageRecord {
        emoji_map,
        guild_id: req.guild_id,
        channel_id: req.channel_id,
    };
    if let Err(e) = bot.reactions.insert(message.id, record) {
        warn!(
            message_id = message.id,
            error = %e,
            "Record write failed; announcement left orphaned and unmanaged"
        );
        return Err(CommandError::Internal(format!("store write failed: {e}")));
    }
    if let Some(gauge) = crate::metrics::MANAGED_POSTS.get() {
        gauge.set(bot.reactions.len() as i64);
    }
    info!(
        message_id = message.id,
        channel_id = req.channel_id,
        bindings = resolved.len(),
        "Reaction post registered"
    );

    // Seed one reaction per distinct emoji key, best-effort.
    let mut seeded = HashSet::new();
    for b in &resolved {
        if !seeded.insert(&b.emoji_key) {
            continue;
        }
        let form = emoji::reaction_form(&b.display);
        match bot
            .platform
            .create_reaction(req.channel_id, message.id, &form)
            .await
        {
            Ok(()) => tokio::time::sleep(SEED_DELAY).await,
            Err(e) => {
                debug!(
                    message_id = message.id,
                    emoji = %b.emoji_key,
                    error = %e,
                    "Reaction seed failed, skipping"
                );
            }
        }
    }

    Ok(message.id)
}
