//! Persistent mapping stores.
//!
//! Two independent JSON files: message-id → reaction-role record, and
//! guild-id → verification config. Each is loaded once at startup and
//! rewritten in full after every mutation. Loading is crash-tolerant by
//! policy: a missing or corrupt file is an empty store, never a startup
//! failure (availability over durability).

use crate::discord::types::{ChannelId, GuildId, MessageId, RoleId};
use crate::emoji::EmojiKey;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One managed announcement message. Written exactly once, when
/// registration completes; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionMessageRecord {
    /// Emoji key → role to grant. Unique keys per record; when an operator
    /// repeats an emoji the later entry wins at insertion time.
    pub emoji_map: HashMap<EmojiKey, RoleId>,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Per-guild verification config. At most one per guild; a second setup
/// call silently replaces it and orphans the previous button message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyConfigRecord {
    pub role_id: RoleId,
    pub log_channel: Option<ChannelId>,
    pub message_id: MessageId,
    pub channel_id: ChannelId,
}

/// A JSON-file-backed map with string keys.
///
/// Reads are lock-cheap clones; writers mutate under the lock and then
/// flush synchronously before reporting success. Single-process use only.
pub struct JsonStore<V> {
    path: PathBuf,
    map: RwLock<HashMap<String, V>>,
}

impl<V: Serialize + DeserializeOwned + Clone> JsonStore<V> {
    /// Open a store, treating a missing or unreadable file as empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let map = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Store file corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Store file unreadable, starting empty");
                HashMap::new()
            }
        };
        info!(path = %path.display(), entries = map.len(), "Store loaded");
        Self {
            path,
            map: RwLock::new(map),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.map.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Insert and flush. The entry is in memory either way; an I/O failure
    /// is reported so the caller can warn about the orphaned announcement.
    pub fn insert(&self, key: String, value: V) -> io::Result<()> {
        let snapshot = {
            let mut map = self.map.write();
            map.insert(key, value);
            map.clone()
        };
        self.flush(&snapshot)
    }

    fn flush(&self, map: &HashMap<String, V>) -> io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(map)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&self.path, json)
    }
}

/// Reaction-role records keyed by message id.
pub struct ReactionStore(JsonStore<ReactionMessageRecord>);

impl ReactionStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self(JsonStore::open(path))
    }

    pub fn get(&self, message_id: MessageId) -> Option<ReactionMessageRecord> {
        self.0.get(&message_id.to_string())
    }

    pub fn insert(&self, message_id: MessageId, record: ReactionMessageRecord) -> io::Result<()> {
        self.0.insert(message_id.to_string(), record)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Verification configs keyed by guild id.
pub struct VerifyStore(JsonStore<VerifyConfigRecord>);

impl VerifyStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self(JsonStore::open(path))
    }

    pub fn get(&self, guild_id: GuildId) -> Option<VerifyConfigRecord> {
        self.0.get(&guild_id.to_string())
    }

    pub fn insert(&self, guild_id: GuildId, record: VerifyConfigRecord) -> io::Result<()> {
        self.0.insert(guild_id.to_string(), record)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
