//! rolecall - reaction-role daemon
//!
//! A single-binary Discord bot that turns reactions on registered messages
//! into role grants, plus a one-button verification flow.

mod config;
mod discord;
mod emoji;
mod error;
mod handlers;
mod http;
mod metrics;
mod pairs;
mod platform;
mod state;
mod store;

use crate::config::Config;
use crate::discord::{Gateway, Rest};
use crate::state::Bot;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    let token = config.token().to_string();
    let rest = Rest::new(&config.discord, &token).map_err(|e| anyhow::anyhow!("{e}"))?;

    let bot = Arc::new(Bot::new(config, Arc::new(rest.clone())));
    info!(
        reaction_posts = bot.reactions.len(),
        verify_guilds = bot.verify.len(),
        "Starting rolecall"
    );

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = bot.config.bot.metrics_port.unwrap_or(9090);
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }
    if let Some(gauge) = metrics::MANAGED_POSTS.get() {
        gauge.set(bot.reactions.len() as i64);
    }

    // Slash commands are re-registered on every boot; the endpoint is a
    // bulk overwrite, so this is idempotent. A failure here leaves stale
    // definitions behind but the bot still runs.
    match rest.application_id().await {
        Ok(app_id) => {
            match rest
                .register_commands(app_id, &handlers::commands::definitions())
                .await
            {
                Ok(()) => info!("Slash commands registered"),
                Err(e) => warn!(error = %e, "Slash command registration failed"),
            }
        }
        Err(e) => warn!(error = %e, "Could not resolve application id, commands not registered"),
    }

    // Start the gateway and run the dispatch loop. Events are handled
    // sequentially; the per-seed delay in registration is the only long
    // pause, and ordering within a session matters more than throughput.
    let gateway = Gateway::new(
        token,
        bot.config.discord.intents,
        bot.config.discord.gateway_url.clone(),
    );
    let mut events = gateway.spawn(rest);

    while let Some(event) = events.recv().await {
        handlers::dispatch(&bot, event).await;
    }

    info!("Gateway channel closed, shutting down");
    Ok(())
}
