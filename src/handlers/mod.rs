//! Event handlers.

pub mod commands;
pub mod reconcile;
pub mod register;
pub mod verify;

use crate::discord::Event;
use crate::state::Bot;
use std::sync::Arc;
use tracing::info;

/// Route one gateway event. Handlers never return errors; anything that
/// goes wrong is logged and counted where it happens.
pub async fn dispatch(bot: &Arc<Bot>, event: Event) {
    match event {
        Event::Ready(user) => {
            bot.set_user_id(user.id);
            info!(user_id = user.id, username = %user.username, "Gateway ready");
        }
        Event::ReactionAdd(ev) => reconcile::reaction_added(bot, &ev).await,
        Event::ReactionRemove(ev) => reconcile::reaction_removed(bot, &ev).await,
        Event::Interaction(interaction) => commands::dispatch(bot, interaction).await,
    }
}
