//! Key parsing for the `press` action.
//!
//! Turns key names and combos into DOM key values plus modifier flags.

use serde::{Deserialize, Serialize};

/// One key press: a DOM `key` value and the modifiers held with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPress {
    pub key: String,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl KeyPress {
    fn plain(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: false,
            alt: false,
            shift: false,
            meta: false,
        }
    }

    /// Whether this press produces a character (and so a `keypress` event).
    pub fn is_printable(&self) -> bool {
        !self.ctrl && !self.alt && !self.meta && self.key.chars().count() == 1
    }

    /// Combo notation, e.g. `Ctrl+Shift+A`.
    pub fn combo(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if self.ctrl {
            parts.push("Ctrl");
        }
        if self.alt {
            parts.push("Alt");
        }
        if self.shift {
            parts.push("Shift");
        }
        if self.meta {
            parts.push("Meta");
        }
        parts.push(&self.key);
        parts.join("+")
    }
}

/// DOM key value for a named key, or None if not recognized.
///
/// Names are case insensitive and accept common aliases.
fn named_key(key: &str) -> Option<&'static str> {
    let key_lower = key.to_lowercase();
    let name = match key_lower.as_str() {
        "enter" | "return" => "Enter",
        "tab" => "Tab",
        "escape" | "esc" => "Escape",
        "backspace" => "Backspace",
        "delete" | "del" => "Delete",
        "space" => " ",
        "plus" => "+", // literal + (since + is the combo separator)

        "up" | "arrowup" => "ArrowUp",
        "down" | "arrowdown" => "ArrowDown",
        "left" | "arrowleft" => "ArrowLeft",
        "right" | "arrowright" => "ArrowRight",

        "home" => "Home",
        "end" => "End",
        "pageup" | "pgup" => "PageUp",
        "pagedown" | "pgdn" => "PageDown",
        "insert" | "ins" => "Insert",

        "f1" => "F1",
        "f2" => "F2",
        "f3" => "F3",
        "f4" => "F4",
        "f5" => "F5",
        "f6" => "F6",
        "f7" => "F7",
        "f8" => "F8",
        "f9" => "F9",
        "f10" => "F10",
        "f11" => "F11",
        "f12" => "F12",

        _ => return None,
    };
    Some(name)
}

/// Parse a key or combo like `Enter`, `a`, `Ctrl+C` or `Ctrl+Shift+ArrowUp`.
///
/// - Modifiers: `Ctrl`/`Control`, `Alt`/`Option`, `Shift`, `Meta`/`Cmd`
/// - Shift uppercases a single letter
/// - Unknown multi-character key names are rejected
pub fn parse_key_combo(combo: &str) -> Option<KeyPress> {
    let parts: Vec<&str> = combo.split('+').collect();

    let mut press = KeyPress::plain("");
    let mut key_part = "";

    for part in &parts {
        let lower = part.to_lowercase();
        match lower.as_str() {
            "ctrl" | "control" => press.ctrl = true,
            "alt" | "option" => press.alt = true,
            "shift" => press.shift = true,
            "meta" | "cmd" | "command" | "super" => press.meta = true,
            _ => key_part = part,
        }
    }

    if key_part.is_empty() {
        return None;
    }

    if let Some(name) = named_key(key_part) {
        press.key = name.to_string();
        return Some(press);
    }

    // Single character
    let mut chars = key_part.chars();
    let (Some(mut c), None) = (chars.next(), chars.next()) else {
        return None;
    };
    if press.shift && c.is_ascii_lowercase() {
        c = c.to_ascii_uppercase();
    }
    press.key = c.to_string();
    Some(press)
}

/// Parse a space-separated key sequence like `Ctrl+X m` into presses.
///
/// Returns None if the sequence is empty or any key is not recognized.
pub fn parse_key_sequence(sequence: &str) -> Option<Vec<KeyPress>> {
    let parts: Vec<&str> = sequence.split_whitespace().collect();

    if parts.is_empty() {
        // A lone space is the space key.
        return (sequence == " ").then(|| vec![KeyPress::plain(" ")]);
    }

    parts.into_iter().map(parse_key_combo).collect()
}
