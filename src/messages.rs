//! User-facing warnings go through a key → string lookup owned by the host
//! application. The engine only knows the keys and an English fallback.

pub const FONT_NOT_FOUND: &str = "font_not_found";
pub const FONT_EMBED_RETRY: &str = "font_embed_retry";
pub const TEXT_RASTERIZED: &str = "text_rasterized";
pub const SAVE_FAILED: &str = "save_failed";
pub const UNDO_FAILED: &str = "undo_failed";

pub trait MessageLookup {
    /// Template for `key`, with `{name}`-style placeholders, or `None` when
    /// the host has no translation.
    fn message(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMessages;

impl MessageLookup for DefaultMessages {
    fn message(&self, key: &str) -> Option<String> {
        let text = match key {
            FONT_NOT_FOUND => "Font '{name}' is not installed; a default font is used instead.",
            FONT_EMBED_RETRY => "Font '{name}' could not be embedded; retrying.",
            TEXT_RASTERIZED => "Text '{name}' was saved as an image because its font could not be embedded.",
            SAVE_FAILED => "Could not save to {name}. Choose another location.",
            UNDO_FAILED => "The previous state could not be restored.",
            _ => return None,
        };
        Some(text.to_string())
    }
}

/// Looks `key` up in `lookup`, falling back to English, and fills in the
/// placeholders.
pub fn render(lookup: &dyn MessageLookup, key: &str, args: &[(&str, &str)]) -> String {
    let mut text = lookup
        .message(key)
        .or_else(|| DefaultMessages.message(key))
        .unwrap_or_else(|| key.to_string());
    for (name, value) in args {
        text = text.replace(&format!("{{{}}}", name), value);
    }
    text
}
