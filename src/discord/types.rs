//! Discord wire types.
//!
//! Only the slices of the API surface this daemon touches: roles, members,
//! messages with embeds/components, reaction events, interactions, and the
//! gateway envelope. Snowflake IDs travel as decimal strings on the wire and
//! are held as `u64` in memory.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub type GuildId = u64;
pub type ChannelId = u64;
pub type MessageId = u64;
pub type UserId = u64;
pub type RoleId = u64;
pub type EmojiId = u64;

/// Serde adapter for a required snowflake field (string on the wire).
pub mod snowflake {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Serde adapter for an optional snowflake field (string or null).
pub mod snowflake_opt {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(id: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match id {
            Some(id) => serializer.serialize_some(&id.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => s.parse().map(Some).map_err(D::Error::custom),
            None => Ok(None),
        }
    }
}

/// Serde adapter for a list of snowflakes (member role lists).
pub mod snowflake_vec {
    use serde::{Deserialize, Deserializer, Serializer, de::Error, ser::SerializeSeq};

    pub fn serialize<S: Serializer>(ids: &[u64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(ids.len()))?;
        for id in ids {
            seq.serialize_element(&id.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u64>, D::Error> {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| s.parse().map_err(D::Error::custom))
            .collect()
    }
}

bitflags! {
    /// Discord permission bits (the subset this daemon checks).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Permissions: u64 {
        const ADMINISTRATOR = 1 << 3;
        const ADD_REACTIONS = 1 << 6;
        const VIEW_CHANNEL = 1 << 10;
        const SEND_MESSAGES = 1 << 11;
        const EMBED_LINKS = 1 << 14;
        const READ_MESSAGE_HISTORY = 1 << 16;
        const MANAGE_ROLES = 1 << 28;
    }
}

impl Permissions {
    /// Everything `create_reaction_post` needs on the target channel.
    pub const REACTION_POST: Permissions = Permissions::MANAGE_ROLES
        .union(Permissions::ADD_REACTIONS)
        .union(Permissions::READ_MESSAGE_HISTORY)
        .union(Permissions::SEND_MESSAGES)
        .union(Permissions::EMBED_LINKS)
        .union(Permissions::VIEW_CHANNEL);

    /// Human-readable names of the bits in `required` that are absent here.
    pub fn missing_names(self, required: Permissions) -> Vec<&'static str> {
        const NAMED: [(Permissions, &str); 6] = [
            (Permissions::MANAGE_ROLES, "Manage Roles"),
            (Permissions::ADD_REACTIONS, "Add Reactions"),
            (Permissions::READ_MESSAGE_HISTORY, "Read Message History"),
            (Permissions::SEND_MESSAGES, "Send Messages"),
            (Permissions::EMBED_LINKS, "Embed Links"),
            (Permissions::VIEW_CHANNEL, "View Channel"),
        ];
        NAMED
            .iter()
            .filter(|(bit, _)| required.contains(*bit) && !self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

/// Serde adapter: Discord serializes permission sets as decimal strings.
pub mod perms_string {
    use super::Permissions;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(p: &Permissions, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&p.bits().to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Permissions, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bits: u64 = s.parse().map_err(D::Error::custom)?;
        Ok(Permissions::from_bits_truncate(bits))
    }
}

/// Guild role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    #[serde(with = "snowflake")]
    pub id: RoleId,
    pub name: String,
    #[serde(with = "perms_string", default)]
    pub permissions: Permissions,
}

/// Discord user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(with = "snowflake")]
    pub id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

/// Guild member. Only the role list matters to us; `user` is absent in
/// some interaction payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(with = "snowflake_vec", default)]
    pub roles: Vec<RoleId>,
}

/// Channel permission overwrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionOverwrite {
    #[serde(with = "snowflake")]
    pub id: u64,
    /// 0 = role, 1 = member.
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(with = "perms_string", default)]
    pub allow: Permissions,
    #[serde(with = "perms_string", default)]
    pub deny: Permissions,
}

/// Guild channel (the fields permission computation needs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    #[serde(with = "snowflake")]
    pub id: ChannelId,
    #[serde(with = "snowflake_opt", default)]
    pub guild_id: Option<GuildId>,
    #[serde(default)]
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

/// Posted message (only the identifiers we read back).
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(with = "snowflake")]
    pub id: MessageId,
    #[serde(with = "snowflake")]
    pub channel_id: ChannelId,
}

/// Rich embed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

/// Message component: an action row holding buttons.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRow {
    /// Always 1.
    #[serde(rename = "type")]
    pub kind: u8,
    pub components: Vec<Button>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Button {
    /// Always 2.
    #[serde(rename = "type")]
    pub kind: u8,
    /// 1 = primary (blurple).
    pub style: u8,
    pub label: String,
    pub custom_id: String,
}

impl ActionRow {
    /// Single primary button row.
    pub fn button(label: &str, custom_id: &str) -> Self {
        Self {
            kind: 1,
            components: vec![Button {
                kind: 2,
                style: 1,
                label: label.to_string(),
                custom_id: custom_id.to_string(),
            }],
        }
    }
}

/// Outgoing message body.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub components: Vec<ActionRow>,
}

/// Reaction-event emoji descriptor: custom emoji carry an `id`, unicode
/// emoji carry only `name` (the glyph itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmojiDescriptor {
    #[serde(with = "snowflake_opt", default)]
    pub id: Option<EmojiId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub animated: bool,
}

/// Raw `MESSAGE_REACTION_ADD` / `MESSAGE_REACTION_REMOVE` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ReactionEvent {
    #[serde(with = "snowflake")]
    pub user_id: UserId,
    #[serde(with = "snowflake")]
    pub channel_id: ChannelId,
    #[serde(with = "snowflake")]
    pub message_id: MessageId,
    #[serde(with = "snowflake_opt", default)]
    pub guild_id: Option<GuildId>,
    pub emoji: EmojiDescriptor,
}

/// Interaction kinds we dispatch on.
pub const INTERACTION_APPLICATION_COMMAND: u8 = 2;
pub const INTERACTION_MESSAGE_COMPONENT: u8 = 3;

/// Incoming `INTERACTION_CREATE` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    #[serde(with = "snowflake")]
    pub id: u64,
    pub token: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub data: Option<InteractionData>,
    #[serde(with = "snowflake_opt", default)]
    pub guild_id: Option<GuildId>,
    #[serde(with = "snowflake_opt", default)]
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub member: Option<Member>,
    #[serde(default)]
    pub user: Option<User>,
}

impl Interaction {
    /// The acting user, whether the interaction arrived from a guild
    /// (`member.user`) or a DM (`user`).
    pub fn user_id(&self) -> Option<UserId> {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
            .map(|u| u.id)
    }
}

/// Command or component payload attached to an interaction.
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

/// One slash-command option value.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl InteractionData {
    /// String option by name.
    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| o.value.as_str())
    }

    /// Snowflake option by name (channel/role options arrive as id strings).
    pub fn option_id(&self, name: &str) -> Option<u64> {
        self.option_str(name).and_then(|s| s.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowflakes_round_trip_as_strings() {
        let role: Role = serde_json::from_str(
            r#"{"id":"1234567890","name":"Gamer","permissions":"268435456"}"#,
        )
        .unwrap();
        assert_eq!(role.id, 1_234_567_890);
        assert!(role.permissions.contains(Permissions::MANAGE_ROLES));

        let out = serde_json::to_value(&role).unwrap();
        assert_eq!(out["id"], "1234567890");
        assert_eq!(out["permissions"], "268435456");
    }

    #[test]
    fn emoji_descriptor_unicode_has_no_id() {
        let e: EmojiDescriptor = serde_json::from_str(r#"{"id":null,"name":"😀"}"#).unwrap();
        assert_eq!(e.id, None);
        assert_eq!(e.name.as_deref(), Some("😀"));
    }

    #[test]
    fn reaction_event_parses_custom_emoji() {
        let ev: ReactionEvent = serde_json::from_str(
            r#"{
                "user_id": "5",
                "channel_id": "6",
                "message_id": "7",
                "guild_id": "8",
                "emoji": {"id": "42", "name": "cool", "animated": true}
            }"#,
        )
        .unwrap();
        assert_eq!(ev.guild_id, Some(8));
        assert_eq!(ev.emoji.id, Some(42));
        assert!(ev.emoji.animated);
    }

    #[test]
    fn missing_names_reports_only_required_absent_bits() {
        let held = Permissions::SEND_MESSAGES | Permissions::VIEW_CHANNEL;
        let missing = held.missing_names(Permissions::REACTION_POST);
        assert_eq!(
            missing,
            vec![
                "Manage Roles",
                "Add Reactions",
                "Read Message History",
                "Embed Links"
            ]
        );
        assert!(
            Permissions::REACTION_POST
                .missing_names(Permissions::REACTION_POST)
                .is_empty()
        );
    }

    #[test]
    fn interaction_options_extract_ids() {
        let data: InteractionData = serde_json::from_str(
            r#"{"name":"createrole","options":[
                {"name":"channel","value":"123"},
                {"name":"title","value":"Pick a role"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(data.option_id("channel"), Some(123));
        assert_eq!(data.option_str("title"), Some("Pick a role"));
        assert_eq!(data.option_id("missing"), None);
    }
}
