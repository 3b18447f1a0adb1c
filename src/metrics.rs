//! Prometheus metrics collection for rolecall.
//!
//! Tracks the daemon's observable work: reaction events handled, role
//! mutations performed, operator commands by outcome, and gateway health.
//! Exposed on an HTTP endpoint by [`crate::http`].

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Reaction events handled, by action (`add`/`remove`) and outcome
/// (`granted`/`revoked`/`ignored`/`swallowed`).
pub static REACTION_EVENTS: OnceLock<IntCounterVec> = OnceLock::new();

/// Role mutations performed, by direction (`grant`/`revoke`).
pub static ROLE_MUTATIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Operator commands processed, by command and result code.
pub static COMMANDS: OnceLock<IntCounterVec> = OnceLock::new();

/// Verification grants completed.
pub static VERIFY_GRANTS: OnceLock<IntCounter> = OnceLock::new();

/// Gateway (re)connect attempts.
pub static GATEWAY_CONNECTS: OnceLock<IntCounter> = OnceLock::new();

/// Managed reaction posts currently in the store.
pub static MANAGED_POSTS: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(
        REACTION_EVENTS,
        IntCounterVec::new(
            Opts::new("rolecall_reaction_events_total", "Reaction events handled"),
            &["action", "outcome"]
        )
    );
    register!(
        ROLE_MUTATIONS,
        IntCounterVec::new(
            Opts::new("rolecall_role_mutations_total", "Role grants and revokes"),
            &["direction"]
        )
    );
    register!(
        COMMANDS,
        IntCounterVec::new(
            Opts::new("rolecall_commands_total", "Operator commands by result"),
            &["command", "result"]
        )
    );
    register!(
        VERIFY_GRANTS,
        IntCounter::new("rolecall_verify_grants_total", "Verification grants completed")
    );
    register!(
        GATEWAY_CONNECTS,
        IntCounter::new("rolecall_gateway_connects_total", "Gateway connect attempts")
    );
    register!(
        MANAGED_POSTS,
        IntGauge::new("rolecall_managed_posts", "Reaction posts in the store")
    );
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record a reaction event outcome.
pub fn reaction_event(action: &str, outcome: &str) {
    if let Some(vec) = REACTION_EVENTS.get() {
        vec.with_label_values(&[action, outcome]).inc();
    }
}

/// Record a role mutation.
pub fn role_mutation(direction: &str) {
    if let Some(vec) = ROLE_MUTATIONS.get() {
        vec.with_label_values(&[direction]).inc();
    }
}

/// Record an operator command result.
pub fn command(command: &str, result: &str) {
    if let Some(vec) = COMMANDS.get() {
        vec.with_label_values(&[command, result]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_init_is_a_noop() {
        // Helpers must not panic before init() has run (unit tests, early
        // startup paths).
        reaction_event("add", "granted");
        role_mutation("grant");
        command("createrole", "ok");
    }
}
