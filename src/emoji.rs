//! Emoji key normalization.
//!
//! Reaction-role mappings are keyed by a canonical string form of the emoji:
//! `e:<id>` for custom emoji, the raw grapheme cluster for unicode emoji.
//! Registration derives keys from operator text (`<a:name:id>` or a glyph);
//! the reconciler derives them from gateway event descriptors. Both paths
//! MUST agree for the same logical emoji, otherwise registered mappings can
//! never match live reactions.

use crate::discord::types::EmojiDescriptor;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Custom emoji textual form: `<:name:id>` or animated `<a:name:id>`.
static CUSTOM_EMOJI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<a?:([A-Za-z0-9_~]+):(\d+)>$").expect("static regex"));

/// Canonical comparable key for one emoji.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmojiKey(String);

impl EmojiKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmojiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize operator-supplied emoji text into a key.
///
/// Total over any input: text that merely looks custom-ish but does not
/// match the `<a:name:id>` pattern is returned verbatim and will simply
/// never match a live reaction.
pub fn normalize_from_text(s: &str) -> EmojiKey {
    let s = s.trim();
    if let Some(caps) = CUSTOM_EMOJI_RE.captures(s) {
        return EmojiKey(format!("e:{}", &caps[2]));
    }
    EmojiKey(s.to_string())
}

/// Convert operator emoji text into the `name:id` / glyph form the reaction
/// endpoints expect in their URL path.
pub fn reaction_form(display: &str) -> String {
    let display = display.trim();
    if let Some(caps) = CUSTOM_EMOJI_RE.captures(display) {
        return format!("{}:{}", &caps[1], &caps[2]);
    }
    display.to_string()
}

/// Normalize a gateway reaction-event descriptor into a key.
///
/// Must produce output identical to [`normalize_from_text`] for the same
/// logical emoji; that equivalence is what connects registration-time keys
/// to event-time keys.
pub fn normalize_from_event(emoji: &EmojiDescriptor) -> EmojiKey {
    match emoji.id {
        Some(id) if id != 0 => EmojiKey(format!("e:{id}")),
        _ => EmojiKey(emoji.name.clone().unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: Option<u64>, name: &str) -> EmojiDescriptor {
        EmojiDescriptor {
            id,
            name: Some(name.to_string()),
            animated: false,
        }
    }

    #[test]
    fn custom_text_form_becomes_id_key() {
        assert_eq!(
            normalize_from_text("<:cool:123456789012345678>").as_str(),
            "e:123456789012345678"
        );
        assert_eq!(normalize_from_text("<a:party:42>").as_str(), "e:42");
    }

    #[test]
    fn unicode_text_passes_through_trimmed() {
        assert_eq!(normalize_from_text("  😀 ").as_str(), "😀");
        assert_eq!(normalize_from_text("🇹🇭").as_str(), "🇹🇭");
    }

    #[test]
    fn malformed_custom_text_is_returned_verbatim() {
        // Not a crash, just a key that will never match anything.
        assert_eq!(normalize_from_text("<:broken:abc>").as_str(), "<:broken:abc>");
        assert_eq!(normalize_from_text("<@&55>").as_str(), "<@&55>");
    }

    #[test]
    fn text_and_event_forms_agree() {
        // Custom emoji: textual reference vs. event descriptor with the id.
        assert_eq!(
            normalize_from_text("<:cool:987654321>"),
            normalize_from_event(&descriptor(Some(987_654_321), "cool"))
        );
        // Unicode emoji: same glyph in both contexts.
        assert_eq!(
            normalize_from_text("🎮"),
            normalize_from_event(&descriptor(None, "🎮"))
        );
    }

    #[test]
    fn zero_id_falls_back_to_name() {
        assert_eq!(normalize_from_event(&descriptor(Some(0), "😀")).as_str(), "😀");
    }

    #[test]
    fn distinct_emoji_get_distinct_keys() {
        assert_ne!(normalize_from_text("😀"), normalize_from_text("🎮"));
        assert_ne!(
            normalize_from_event(&descriptor(Some(1), "a")),
            normalize_from_event(&descriptor(Some(2), "a"))
        );
    }

    #[test]
    fn reaction_form_strips_brackets_from_custom_emoji() {
        assert_eq!(reaction_form("<a:party:42>"), "party:42");
        assert_eq!(reaction_form("<:cool:9>"), "cool:9");
        assert_eq!(reaction_form(" 😀 "), "😀");
    }
}
