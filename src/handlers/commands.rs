//! Slash-command plumbing.
//!
//! Definitions for the two operator commands, option extraction, and the
//! ephemeral replies that carry either a success line or the error
//! taxonomy's user message. The flows themselves live in
//! [`super::register`] and [`super::verify`].

use crate::discord::types::{
    INTERACTION_APPLICATION_COMMAND, INTERACTION_MESSAGE_COMPONENT, Interaction, InteractionData,
};
use crate::error::CommandError;
use crate::handlers::{register, verify};
use crate::state::Bot;
use serde_json::{Value, json};
use tracing::{debug, warn};

/// Option type tags from the interactions API.
const OPTION_STRING: u8 = 3;
const OPTION_CHANNEL: u8 = 7;
const OPTION_ROLE: u8 = 8;

/// Global command definitions, in bulk-overwrite form.
pub fn definitions() -> Value {
    json!([
        {
            "name": "createrole",
            "description": "Post a reaction-role message",
            "default_member_permissions": "268435456", // Manage Roles
            "options": [
                { "type": OPTION_CHANNEL, "name": "channel", "description": "Channel to post in", "required": true },
                { "type": OPTION_STRING, "name": "title", "description": "Embed title", "required": true },
                { "type": OPTION_STRING, "name": "description", "description": "Embed description", "required": true },
                { "type": OPTION_STRING, "name": "pairs", "description": "EMOJI=ROLE entries, comma or newline separated", "required": true },
                { "type": OPTION_STRING, "name": "image_url", "description": "Optional image or gif URL", "required": false },
            ]
        },
        {
            "name": "verifysetup",
            "description": "Post the verification button",
            "default_member_permissions": "268435456",
            "options": [
                { "type": OPTION_CHANNEL, "name": "channel", "description": "Channel for the button", "required": true },
                { "type": OPTION_ROLE, "name": "role", "description": "Role to grant on verify", "required": true },
                { "type": OPTION_CHANNEL, "name": "log_channel", "description": "Channel for audit lines", "required": false },
            ]
        }
    ])
}

/// Route an INTERACTION_CREATE event.
pub async fn dispatch(bot: &Bot, interaction: Interaction) {
    match interaction.kind {
        INTERACTION_APPLICATION_COMMAND => {
            let name = interaction
                .data
                .as_ref()
                .and_then(|d| d.name.as_deref())
                .unwrap_or("")
                .to_string();
            match name.as_str() {
                "createrole" => handle_createrole(bot, &interaction).await,
                "verifysetup" => handle_verifysetup(bot, &interaction).await,
                other => debug!(command = other, "Unknown command interaction"),
            }
        }
        INTERACTION_MESSAGE_COMPONENT => {
            let custom_id = interaction
                .data
                .as_ref()
                .and_then(|d| d.custom_id.as_deref())
                .unwrap_or("");
            if custom_id == verify::VERIFY_BUTTON_ID {
                verify::grant(bot, &interaction).await;
            } else {
                debug!(custom_id, "Unknown component interaction");
            }
        }
        kind => debug!(kind, "Unhandled interaction kind"),
    }
}

async fn handle_createrole(bot: &Bot, interaction: &Interaction) {
    let command = "createrole";
    let Some(guild_id) = interaction.guild_id else {
        reply(bot, interaction, "This command only works in a server.").await;
        crate::metrics::command(command, "no_guild");
        return;
    };
    let Some(data) = interaction.data.as_ref() else {
        return;
    };

    let request = match build_create_request(guild_id, data) {
        Some(request) => request,
        None => {
            reply(bot, interaction, "Missing a required option.").await;
            crate::metrics::command(command, "bad_options");
            return;
        }
    };
    let channel_id = request.channel_id;

    match register::create_reaction_post(bot, request).await {
        Ok(message_id) => {
            crate::metrics::command(command, "ok");
            reply(
                bot,
                interaction,
                &format!("Reaction post created in <#{channel_id}> (message id: {message_id})"),
            )
            .await;
        }
        Err(e) => {
            crate::metrics::command(command, e.error_code());
            report_error(bot, interaction, command, &e).await;
        }
    }
}

async fn handle_verifysetup(bot: &Bot, interaction: &Interaction) {
    let command = "verifysetup";
    let Some(guild_id) = interaction.guild_id else {
        reply(bot, interaction, "This command only works in a server.").await;
        crate::metrics::command(command, "no_guild");
        return;
    };
    let Some(data) = interaction.data.as_ref() else {
        return;
    };

    let (Some(channel_id), Some(role_id)) = (data.option_id("channel"), data.option_id("role"))
    else {
        reply(bot, interaction, "Missing a required option.").await;
        crate::metrics::command(command, "bad_options");
        return;
    };

    let request = verify::SetupVerification {
        guild_id,
        channel_id,
        role_id,
        log_channel: data.option_id("log_channel"),
    };

    match verify::setup(bot, request).await {
        Ok(message_id) => {
            crate::metrics::command(command, "ok");
            reply(
                bot,
                interaction,
                &format!("Verification button posted in <#{channel_id}> (message id: {message_id})"),
            )
            .await;
        }
        Err(e) => {
            crate::metrics::command(command, e.error_code());
            report_error(bot, interaction, command, &e).await;
        }
    }
}

fn build_create_request(
    guild_id: u64,
    data: &InteractionData,
) -> Option<register::CreateReactionPost> {
    Some(register::CreateReactionPost {
        guild_id,
        channel_id: data.option_id("channel")?,
        title: data.option_str("title")?.to_string(),
        description: data.option_str("description")?.to_string(),
        pairs: data.option_str("pairs")?.to_string(),
        image_url: data.option_str("image_url").map(str::to_string),
    })
}

async fn reply(bot: &Bot, interaction: &Interaction, content: &str) {
    if let Err(e) = bot
        .platform
        .interaction_reply(interaction.id, &interaction.token, content, true)
        .await
    {
        warn!(error = %e, "Failed to answer interaction");
    }
}

async fn report_error(bot: &Bot, interaction: &Interaction, command: &str, e: &CommandError) {
    warn!(command, code = e.error_code(), error = %e, "Command failed");
    reply(bot, interaction, &e.user_message()).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_cover_both_commands_with_required_options() {
        let defs = definitions();
        let names: Vec<&str> = defs
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["createrole", "verifysetup"]);

        let createrole = &defs[0];
        let required: Vec<&str> = createrole["options"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|o| o["required"] == true)
            .map(|o| o["name"].as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["channel", "title", "description", "pairs"]);
    }

    #[test]
    fn build_create_request_requires_all_mandatory_options() {
        let data: InteractionData = serde_json::from_value(json!({
            "name": "createrole",
            "options": [
                {"name": "channel", "value": "123"},
                {"name": "title", "value": "T"},
                {"name": "description", "value": "D"},
                {"name": "pairs", "value": "😀=<@&1>"},
            ]
        }))
        .unwrap();
        let request = build_create_request(9, &data).unwrap();
        assert_eq!(request.channel_id, 123);
        assert_eq!(request.image_url, None);

        let incomplete: InteractionData = serde_json::from_value(json!({
            "name": "createrole",
            "options": [{"name": "channel", "value": "123"}]
        }))
        .unwrap();
        assert!(build_create_request(9, &incomplete).is_none());
    }
}
