//! Discord gateway (WebSocket) client.
//!
//! Maintains one identified session and forwards the events this daemon
//! cares about into an mpsc stream. Session loss is handled by the outer
//! reconnect loop with capped exponential backoff and a fresh identify;
//! reaction handling is idempotent, so replayed or dropped edges during a
//! reconnect are harmless.

use crate::discord::Rest;
use crate::discord::types::{Interaction, ReactionEvent, User};
use crate::platform::{PlatformError, PlatformResult};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, error, info, warn};

/// Gateway opcodes (the subset we speak).
const OP_DISPATCH: i64 = 0;
const OP_HEARTBEAT: i64 = 1;
const OP_IDENTIFY: i64 = 2;
const OP_RECONNECT: i64 = 7;
const OP_INVALID_SESSION: i64 = 9;
const OP_HELLO: i64 = 10;
const OP_HEARTBEAT_ACK: i64 = 11;

const RECONNECT_MIN: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(60);

/// Gateway envelope.
#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    op: i64,
    #[serde(default)]
    d: Option<serde_json::Value>,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Hello {
    heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
struct Ready {
    user: User,
}

/// Events delivered to the dispatch loop.
#[derive(Debug)]
pub enum Event {
    /// Session identified; carries the bot's own user.
    Ready(User),
    ReactionAdd(ReactionEvent),
    ReactionRemove(ReactionEvent),
    Interaction(Interaction),
}

/// Gateway connection manager.
pub struct Gateway {
    token: String,
    intents: u64,
    url_override: Option<String>,
}

impl Gateway {
    pub fn new(token: String, intents: u64, url_override: Option<String>) -> Self {
        Self {
            token,
            intents,
            url_override,
        }
    }

    /// Spawn the reconnect loop; events arrive on the returned receiver.
    /// The loop ends only when the receiver is dropped.
    pub fn spawn(self, rest: Rest) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(256);

        tokio::spawn(async move {
            let mut backoff = RECONNECT_MIN;
            loop {
                if let Some(counter) = crate::metrics::GATEWAY_CONNECTS.get() {
                    counter.inc();
                }

                let url = match &self.url_override {
                    Some(url) => Ok(url.clone()),
                    None => rest.gateway_url().await,
                };

                let session = match url {
                    Ok(url) => run_session(&url, &self.token, self.intents, &tx).await,
                    Err(e) => Err(e),
                };

                match session {
                    Ok(SessionEnd::ReceiverDropped) => {
                        info!("Event receiver dropped, gateway shutting down");
                        return;
                    }
                    Ok(SessionEnd::Disconnected) => {
                        // The handshake completed, so the outage is fresh.
                        backoff = RECONNECT_MIN;
                        warn!("Gateway session ended, reconnecting");
                    }
                    Err(e) => {
                        error!(error = %e, "Gateway session failed");
                    }
                }

                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(RECONNECT_MAX);
            }
        });

        rx
    }
}

enum SessionEnd {
    /// Remote closed or errored; reconnect.
    Disconnected,
    /// Our consumer went away; stop entirely.
    ReceiverDropped,
}

/// Run one identified session until it ends.
async fn run_session(
    url: &str,
    token: &str,
    intents: u64,
    tx: &mpsc::Sender<Event>,
) -> PlatformResult<SessionEnd> {
    let ws_url = format!("{}/?v=10&encoding=json", url.trim_end_matches('/'));
    info!(url = %ws_url, "Connecting to gateway");

    let (ws_stream, _) = connect_async(&ws_url)
        .await
        .map_err(|e| PlatformError::Transport(format!("gateway connect: {e}")))?;
    let (mut write, mut read) = ws_stream.split();

    // Hello must come first.
    let hello = match read.next().await {
        Some(Ok(WsMessage::Text(text))) => {
            let payload: Payload = serde_json::from_str(&text)
                .map_err(|e| PlatformError::Protocol(e.to_string()))?;
            if payload.op != OP_HELLO {
                return Err(PlatformError::Protocol(format!(
                    "expected Hello, got op {}",
                    payload.op
                )));
            }
            serde_json::from_value::<Hello>(payload.d.unwrap_or_default())
                .map_err(|e| PlatformError::Protocol(e.to_string()))?
        }
        other => {
            return Err(PlatformError::Protocol(format!(
                "no Hello from gateway: {other:?}"
            )));
        }
    };
    debug!(interval_ms = hello.heartbeat_interval, "Received Hello");

    // Identify.
    let identify = json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "rolecall",
                "device": "rolecall",
            }
        }
    });
    write
        .send(WsMessage::Text(identify.to_string()))
        .await
        .map_err(|e| PlatformError::Transport(format!("identify: {e}")))?;

    let mut sequence: Option<u64> = None;
    let mut heartbeat_acked = true;
    let mut heartbeat = tokio::time::interval(Duration::from_millis(hello.heartbeat_interval));
    // The first tick fires immediately; skip it.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if !heartbeat_acked {
                    warn!("Heartbeat not acknowledged, reconnecting");
                    return Ok(SessionEnd::Disconnected);
                }
                let beat = json!({ "op": OP_HEARTBEAT, "d": sequence });
                if write.send(WsMessage::Text(beat.to_string())).await.is_err() {
                    return Ok(SessionEnd::Disconnected);
                }
                heartbeat_acked = false;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let payload: Payload = match serde_json::from_str(&text) {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(error = %e, "Unparseable gateway payload");
                                continue;
                            }
                        };
                        if let Some(s) = payload.s {
                            sequence = Some(s);
                        }

                        match payload.op {
                            OP_DISPATCH => {
                                let name = payload.t.unwrap_or_default();
                                let data = payload.d.unwrap_or_default();
                                if let Some(event) = parse_dispatch(&name, data)
                                    && tx.send(event).await.is_err()
                                {
                                    return Ok(SessionEnd::ReceiverDropped);
                                }
                            }
                            OP_HEARTBEAT_ACK => {
                                heartbeat_acked = true;
                            }
                            OP_HEARTBEAT => {
                                // Server asked for an immediate beat.
                                let beat = json!({ "op": OP_HEARTBEAT, "d": sequence });
                                if write.send(WsMessage::Text(beat.to_string())).await.is_err() {
                                    return Ok(SessionEnd::Disconnected);
                                }
                            }
                            OP_RECONNECT | OP_INVALID_SESSION => {
                                info!(op = payload.op, "Gateway requested reconnect");
                                return Ok(SessionEnd::Disconnected);
                            }
                            op => {
                                debug!(op, "Unhandled gateway opcode");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(frame = ?frame, "Gateway closed the connection");
                        return Ok(SessionEnd::Disconnected);
                    }
                    Some(Ok(_)) => {
                        // Ping/pong/binary: nothing to do.
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Gateway read error");
                        return Ok(SessionEnd::Disconnected);
                    }
                    None => {
                        return Ok(SessionEnd::Disconnected);
                    }
                }
            }
        }
    }
}

/// Decode the dispatch events this daemon consumes; everything else is
/// dropped here so the dispatch loop only ever sees typed events.
fn parse_dispatch(name: &str, data: serde_json::Value) -> Option<Event> {
    let parsed = match name {
        "READY" => serde_json::from_value::<Ready>(data).map(|r| Event::Ready(r.user)),
        "MESSAGE_REACTION_ADD" => serde_json::from_value(data).map(Event::ReactionAdd),
        "MESSAGE_REACTION_REMOVE" => serde_json::from_value(data).map(Event::ReactionRemove),
        "INTERACTION_CREATE" => serde_json::from_value(data).map(Event::Interaction),
        _ => return None,
    };
    match parsed {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(event = name, error = %e, "Dropping undecodable dispatch event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dispatch_decodes_reaction_add() {
        let data = json!({
            "user_id": "1", "channel_id": "2", "message_id": "3",
            "guild_id": "4", "emoji": {"id": null, "name": "😀"}
        });
        match parse_dispatch("MESSAGE_REACTION_ADD", data) {
            Some(Event::ReactionAdd(ev)) => {
                assert_eq!(ev.message_id, 3);
                assert_eq!(ev.emoji.name.as_deref(), Some("😀"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parse_dispatch_ignores_unknown_events() {
        assert!(parse_dispatch("TYPING_START", json!({})).is_none());
    }

    #[test]
    fn parse_dispatch_drops_malformed_payloads() {
        assert!(parse_dispatch("MESSAGE_REACTION_ADD", json!({"nope": 1})).is_none());
    }
}
