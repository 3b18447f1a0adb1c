//! Pair parsing and role resolution.
//!
//! Operators describe a reaction post as a free-form blob of `EMOJI=ROLE`
//! entries separated by commas or newlines:
//!
//! ```text
//! 😀=@Member, 🎮=@Gamer
//! <:cool:123456789012345678>=Cool Kids
//! ```
//!
//! Parsing is purely syntactic and keeps role references in whatever form
//! the operator used; resolution against the guild's live role list happens
//! as a second pass so nothing unresolved can reach persistence.

use crate::discord::types::{Role, RoleId};
use crate::emoji::{self, EmojiKey};
use crate::error::{CommandError, CommandResult};
use regex::Regex;
use std::sync::LazyLock;

/// Role mention token: `<@&id>`.
static ROLE_MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<@&(\d+)>$").expect("static regex"));

/// A role reference as parsed from operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRef {
    /// Already an identifier (mention token or bare digits).
    Id(RoleId),
    /// A display name, to be resolved against the guild's role list.
    Name(String),
}

/// One parsed `EMOJI=ROLE` entry. `display` keeps the operator's original
/// emoji text for rendering; lookups only ever use `emoji_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBinding {
    pub emoji_key: EmojiKey,
    pub role: RoleRef,
    pub display: String,
}

/// A binding whose role reference has been resolved to an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinding {
    pub emoji_key: EmojiKey,
    pub role_id: RoleId,
    pub display: String,
}

/// Parse a pairs blob into bindings, preserving input order.
///
/// Blank entries are skipped; duplicates are NOT collapsed here (the store
/// applies last-write-wins when the map is built, but the announcement still
/// renders every line). An empty blob parses to an empty list.
pub fn parse(input: &str) -> CommandResult<Vec<RoleBinding>> {
    let mut bindings = Vec::new();

    for raw in input.split(['\n', ',']) {
        let entry = raw.trim();
        if entry.is_empty() {
            continue;
        }

        let Some((emoji_part, role_part)) = entry.split_once('=') else {
            return Err(CommandError::MalformedPair(entry.to_string()));
        };
        let emoji_part = emoji_part.trim();
        let role_part = role_part.trim();

        bindings.push(RoleBinding {
            emoji_key: emoji::normalize_from_text(emoji_part),
            role: parse_role_ref(role_part),
            display: emoji_part.to_string(),
        });
    }

    Ok(bindings)
}

/// Mention token first, then bare digits, else a name to resolve later.
fn parse_role_ref(role_part: &str) -> RoleRef {
    if let Some(caps) = ROLE_MENTION_RE.captures(role_part)
        && let Ok(id) = caps[1].parse()
    {
        return RoleRef::Id(id);
    }
    if !role_part.is_empty()
        && role_part.bytes().all(|b| b.is_ascii_digit())
        && let Ok(id) = role_part.parse()
    {
        return RoleRef::Id(id);
    }
    RoleRef::Name(role_part.to_string())
}

/// Resolve every name reference against the guild's role list.
///
/// Exact match wins; a case-insensitive match is the fallback. Identifier
/// references pass through untouched (a later grant against a since-deleted
/// role id is the reconciler's problem, not the parser's).
pub fn resolve(bindings: Vec<RoleBinding>, roles: &[Role]) -> CommandResult<Vec<ResolvedBinding>> {
    bindings
        .into_iter()
        .map(|b| {
            let role_id = match b.role {
                RoleRef::Id(id) => id,
                RoleRef::Name(ref name) => lookup_role(roles, name)
                    .ok_or_else(|| CommandError::UnknownRole(name.clone()))?,
            };
            Ok(ResolvedBinding {
                emoji_key: b.emoji_key,
                role_id,
                display: b.display,
            })
        })
        .collect()
}

fn lookup_role(roles: &[Role], name: &str) -> Option<RoleId> {
    // Operators often paste "@Name" for roles without meaning a mention.
    let name = name.strip_prefix('@').unwrap_or(name);
    if let Some(role) = roles.iter().find(|r| r.name == name) {
        return Some(role.id);
    }
    roles
        .iter()
        .find(|r| r.name.eq_ignore_ascii_case(name))
        .map(|r| r.id)
}
