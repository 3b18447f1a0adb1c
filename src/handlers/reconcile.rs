//! Reaction reconciliation.
//!
//! The event-driven core: every raw reaction edge is projected onto the
//! member's role set. Each invocation is a stateless lookup-and-act; the
//! grant/revoke endpoints are set-semantic, so duplicated or reordered
//! events converge on the same role state without any sequencing here.
//!
//! Nothing in this module returns an error. There is no synchronous caller
//! to tell, so every failure is a logged no-op by policy.

use crate::discord::types::{GuildId, ReactionEvent, RoleId, UserId};
use crate::emoji::{self, EmojiKey};
use crate::state::Bot;
use tracing::{debug, warn};

enum Direction {
    Grant,
    Revoke,
}

/// Handle a raw reaction-added event.
pub async fn reaction_added(bot: &Bot, ev: &ReactionEvent) {
    // Our own seeding reactions must not grant us anything.
    if bot.is_self(ev.user_id) {
        crate::metrics::reaction_event("add", "ignored");
        return;
    }
    reconcile(bot, ev, Direction::Grant).await;
}

/// Handle a raw reaction-removed event.
///
/// No self-check: removal of a seeding reaction resolves to a revoke of a
/// role the bot never held through this path, which is a no-op anyway.
pub async fn reaction_removed(bot: &Bot, ev: &ReactionEvent) {
    reconcile(bot, ev, Direction::Revoke).await;
}

async fn reconcile(bot: &Bot, ev: &ReactionEvent, direction: Direction) {
    let action = match direction {
        Direction::Grant => "add",
        Direction::Revoke => "remove",
    };

    // Not one of our announcement messages.
    let Some(record) = bot.reactions.get(ev.message_id) else {
        crate::metrics::reaction_event(action, "ignored");
        return;
    };

    // This emoji carries no role on this message.
    let key = emoji::normalize_from_event(&ev.emoji);
    let Some(&role_id) = record.emoji_map.get(&key) else {
        crate::metrics::reaction_event(action, "ignored");
        return;
    };

    let guild_id = ev.guild_id.unwrap_or(record.guild_id);
    apply(bot, guild_id, ev.user_id, role_id, &key, direction).await;
}

/// Resolve live state and mutate, swallowing every failure mode: the
/// member may have left, the role may be deleted, the bot may have lost
/// Manage Roles since registration. None of those abort anything.
async fn apply(
    bot: &Bot,
    guild_id: GuildId,
    user_id: UserId,
    role_id: RoleId,
    key: &EmojiKey,
    direction: Direction,
) {
    let action = match direction {
        Direction::Grant => "add",
        Direction::Revoke => "remove",
    };

    // Member gone: stale event, nothing to reconcile.
    if let Err(e) = bot.platform.guild_member(guild_id, user_id).await {
        debug!(guild_id, user_id, error = %e, "Member unresolvable, skipping");
        crate::metrics::reaction_event(action, "ignored");
        return;
    }

    // Role deleted since registration: the mapping is a dangling edge.
    match bot.platform.guild_roles(guild_id).await {
        Ok(roles) if roles.iter().any(|r| r.id == role_id) => {}
        Ok(_) => {
            debug!(guild_id, role_id, "Bound role no longer exists, skipping");
            crate::metrics::reaction_event(action, "ignored");
            return;
        }
        Err(e) => {
            warn!(guild_id, error = %e, "Role list unavailable, skipping");
            crate::metrics::reaction_event(action, "swallowed");
            return;
        }
    }

    let result = match direction {
        Direction::Grant => {
            let reason = format!("Reaction role via {key}");
            bot.platform
                .add_member_role(guild_id, user_id, role_id, &reason)
                .await
        }
        Direction::Revoke => {
            let reason = format!("Reaction role removed via {key}");
            bot.platform
                .remove_member_role(guild_id, user_id, role_id, &reason)
                .await
        }
    };

    match result {
        Ok(()) => {
            let (direction_label, outcome) = match direction {
                Direction::Grant => ("grant", "granted"),
                Direction::Revoke => ("revoke", "revoked"),
            };
            crate::metrics::role_mutation(direction_label);
            crate::metrics::reaction_event(action, outcome);
            debug!(guild_id, user_id, role_id, action, "Role reconciled");
        }
        Err(e) if e.is_denied() => {
            // Expected when the bot's role sits below the bound role.
            debug!(guild_id, user_id, role_id, error = %e, "Role mutation denied, swallowed");
            crate::metrics::reaction_event(action, "swallowed");
        }
        Err(e) => {
            warn!(guild_id, user_id, role_id, error = %e, "Role mutation failed, swallowed");
            crate::metrics::reaction_event(action, "swallowed");
        }
    }
}
