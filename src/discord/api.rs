//! Discord REST client.
//!
//! Thin wrapper over `reqwest` implementing the [`Platform`] trait. Error
//! mapping is the interesting part: HTTP 403 (and the Discord error codes
//! for missing access/permissions) become [`PlatformError::Denied`] so the
//! reconciler can swallow them by policy, 404 becomes `NotFound` so missing
//! members and messages read as ordinary races.

use crate::config::DiscordConfig;
use crate::discord::types::{
    Channel, ChannelId, CreateMessage, GuildId, Member, Message, MessageId, Permissions, Role,
    RoleId, User, UserId,
};
use crate::platform::{Platform, PlatformError, PlatformResult};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Discord error codes that mean "you can't do that" rather than "that broke".
const CODE_MISSING_ACCESS: i64 = 50001;
const CODE_MISSING_PERMISSIONS: i64 = 50013;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// REST API client. Cheap to clone.
#[derive(Clone)]
pub struct Rest {
    client: Client,
    base_url: String,
    token: String,
}

impl Rest {
    /// Build a client from configuration.
    pub fn new(config: &DiscordConfig, token: &str) -> PlatformResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("rolecall/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        // Accept tokens pasted with the "Bot " prefix already on them.
        let token = token.strip_prefix("Bot ").unwrap_or(token).to_string();

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> PlatformResult<Response> {
        let response = req
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        Self::check_status(response).await
    }

    /// Map non-success statuses into the platform error taxonomy.
    async fn check_status(response: Response) -> PlatformResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(v) => (
                v.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
                v.get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string(),
            ),
            Err(_) => (0, body),
        };

        if status == StatusCode::FORBIDDEN
            || code == CODE_MISSING_ACCESS
            || code == CODE_MISSING_PERMISSIONS
        {
            return Err(PlatformError::Denied(message));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(PlatformError::NotFound(message));
        }
        Err(PlatformError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> PlatformResult<T> {
        debug!(path, "GET");
        let response = self.send(self.client.get(self.url(path))).await?;
        response
            .json()
            .await
            .map_err(|e| PlatformError::Protocol(e.to_string()))
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl serde::Serialize,
    ) -> PlatformResult<T> {
        debug!(path, "POST");
        let response = self
            .send(self.client.post(self.url(path)).json(body))
            .await?;
        response
            .json()
            .await
            .map_err(|e| PlatformError::Protocol(e.to_string()))
    }

    /// The gateway WebSocket URL for this bot.
    pub async fn gateway_url(&self) -> PlatformResult<String> {
        #[derive(serde::Deserialize)]
        struct GatewayResponse {
            url: String,
        }
        let resp: GatewayResponse = self.get_json("/gateway/bot").await?;
        Ok(resp.url)
    }

    /// The application id, needed for slash-command registration.
    pub async fn application_id(&self) -> PlatformResult<u64> {
        #[derive(serde::Deserialize)]
        struct Application {
            #[serde(with = "crate::discord::types::snowflake")]
            id: u64,
        }
        let app: Application = self.get_json("/applications/@me").await?;
        Ok(app.id)
    }

    /// Bulk-overwrite global slash commands.
    pub async fn register_commands(
        &self,
        application_id: u64,
        commands: &serde_json::Value,
    ) -> PlatformResult<()> {
        let path = format!("/applications/{application_id}/commands");
        debug!(path = %path, "PUT commands");
        self.send(self.client.put(self.url(&path)).json(commands))
            .await?;
        Ok(())
    }

    /// The bot's own member record in a guild.
    async fn own_member(&self, guild_id: GuildId) -> PlatformResult<Member> {
        self.get_json(&format!("/users/@me/guilds/{guild_id}/member"))
            .await
    }

    /// The bot's own user.
    pub async fn current_user(&self) -> PlatformResult<User> {
        self.get_json("/users/@me").await
    }
}

/// Compute effective permissions for a member on a channel, Discord's
/// documented algorithm: base role permissions, administrator shortcut,
/// then everyone / role / member overwrites in that order.
pub fn effective_permissions(
    guild_id: GuildId,
    roles: &[Role],
    member_roles: &[RoleId],
    member_id: UserId,
    channel: &Channel,
) -> Permissions {
    // Base: @everyone (role id == guild id) plus every role the member holds.
    let mut perms = roles
        .iter()
        .filter(|r| r.id == guild_id || member_roles.contains(&r.id))
        .fold(Permissions::empty(), |acc, r| acc | r.permissions);

    if perms.contains(Permissions::ADMINISTRATOR) {
        return Permissions::all();
    }

    // @everyone overwrite.
    if let Some(ow) = channel
        .permission_overwrites
        .iter()
        .find(|ow| ow.kind == 0 && ow.id == guild_id)
    {
        perms = (perms - ow.deny) | ow.allow;
    }

    // Role overwrites, aggregated before application.
    let mut allow = Permissions::empty();
    let mut deny = Permissions::empty();
    for ow in channel
        .permission_overwrites
        .iter()
        .filter(|ow| ow.kind == 0 && ow.id != guild_id && member_roles.contains(&ow.id))
    {
        allow |= ow.allow;
        deny |= ow.deny;
    }
    perms = (perms - deny) | allow;

    // Member overwrite.
    if let Some(ow) = channel
        .permission_overwrites
        .iter()
        .find(|ow| ow.kind == 1 && ow.id == member_id)
    {
        perms = (perms - ow.deny) | ow.allow;
    }

    perms
}

#[async_trait]
impl Platform for Rest {
    async fn bot_permissions(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlatformResult<Permissions> {
        let channel: Channel = self.get_json(&format!("/channels/{channel_id}")).await?;
        let roles = self.guild_roles(guild_id).await?;
        let member = self.own_member(guild_id).await?;
        let me = self.current_user().await?;
        Ok(effective_permissions(
            guild_id,
            &roles,
            &member.roles,
            me.id,
            &channel,
        ))
    }

    async fn create_message(
        &self,
        channel_id: ChannelId,
        message: &CreateMessage,
    ) -> PlatformResult<Message> {
        self.post_json(&format!("/channels/{channel_id}/messages"), message)
            .await
    }

    async fn create_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> PlatformResult<()> {
        // reqwest's Url parsing percent-encodes the glyph for us; custom
        // emoji arrive here already in name:id form.
        let path = format!("/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me");
        self.send(self.client.put(self.url(&path))).await?;
        Ok(())
    }

    async fn add_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> PlatformResult<()> {
        let path = format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}");
        self.send(
            self.client
                .put(self.url(&path))
                .header("X-Audit-Log-Reason", reason),
        )
        .await?;
        Ok(())
    }

    async fn remove_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> PlatformResult<()> {
        let path = format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}");
        self.send(
            self.client
                .delete(self.url(&path))
                .header("X-Audit-Log-Reason", reason),
        )
        .await?;
        Ok(())
    }

    async fn guild_roles(&self, guild_id: GuildId) -> PlatformResult<Vec<Role>> {
        self.get_json(&format!("/guilds/{guild_id}/roles")).await
    }

    async fn guild_member(&self, guild_id: GuildId, user_id: UserId) -> PlatformResult<Member> {
        self.get_json(&format!("/guilds/{guild_id}/members/{user_id}"))
            .await
    }

    async fn interaction_reply(
        &self,
        interaction_id: u64,
        token: &str,
        content: &str,
        ephemeral: bool,
    ) -> PlatformResult<()> {
        // Type 4: channel message with source. Flag 64: ephemeral.
        let body = json!({
            "type": 4,
            "data": {
                "content": content,
                "flags": if ephemeral { 64 } else { 0 },
            }
        });
        let path = format!("/interactions/{interaction_id}/{token}/callback");
        self.send(self.client.post(self.url(&path)).json(&body))
            .await?;
        Ok(())
    }
}
