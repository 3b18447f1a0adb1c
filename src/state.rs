//! Shared daemon state.
//!
//! The [`Bot`] is built once in `main` and shared via `Arc` with every
//! event handler. Stores are mutated only by registration and verification
//! setup; the reconciler just reads.

use crate::config::Config;
use crate::platform::Platform;
use crate::store::{ReactionStore, VerifyStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide state.
pub struct Bot {
    pub config: Config,
    pub platform: Arc<dyn Platform>,
    pub reactions: ReactionStore,
    pub verify: VerifyStore,
    /// Our own user id, learned from the gateway READY event. Zero until
    /// then; reaction events are ignored while unknown (the bot cannot act
    /// on behalf of members before it finished identifying anyway).
    user_id: AtomicU64,
}

impl Bot {
    pub fn new(config: Config, platform: Arc<dyn Platform>) -> Self {
        let reactions = ReactionStore::open(&config.storage.reaction_roles);
        let verify = VerifyStore::open(&config.storage.verify);
        Self {
            config,
            platform,
            reactions,
            verify,
            user_id: AtomicU64::new(0),
        }
    }

    /// Record our own user id from READY.
    pub fn set_user_id(&self, id: u64) {
        self.user_id.store(id, Ordering::Relaxed);
    }

    /// Whether an event was triggered by the bot itself (its own reaction
    /// seeding must not loop back into grants).
    pub fn is_self(&self, user_id: u64) -> bool {
        let own = self.user_id.load(Ordering::Relaxed);
        own != 0 && own == user_id
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// A `Bot` over the given platform with stores in a fresh tempdir.
    /// Keep the returned guard alive for the duration of the test.
    pub fn bot_with(platform: Arc<dyn Platform>) -> (Bot, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config: Config =
            toml::from_str("[bot]\ntoken = \"test-token\"").expect("test config");
        config.storage.reaction_roles = dir
            .path()
            .join("reaction_roles.json")
            .to_string_lossy()
            .into_owned();
        config.storage.verify = dir.path().join("verify.json").to_string_lossy().into_owned();
        (Bot::new(config, platform), dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_check_requires_a_known_user_id() {
        let platform: Arc<dyn Platform> = Arc::new(crate::platform::test_support::NullPlatform);
        let (bot, _dir) = test_support::bot_with(platform);

        assert!(!bot.is_self(0));
        assert!(!bot.is_self(42));
        bot.set_user_id(42);
        assert!(bot.is_self(42));
        assert!(!bot.is_self(43));
    }
}
