//! Image positions of the secure keypad's keys.

use super::plan::{KeySequenceStep, KeyToken, Layout};

/// Keys of the base (and shift) panel; the first sits at image 2
const BASE_KEYS: &[&str] = &[
    "close", "1", "2", "3", "4", "5", "6", "7", "8", "9", "0", "q", "w", "e", "r", "t", "y", "u",
    "i", "o", "p", "a", "s", "d", "f", "g", "h", "j", "k", "l", "z", "x", "c", "v", "b", "n", "m",
    "enter", "shift", "symbol", "space", "backspace", "clear", "refresh",
];
const BASE_OFFSET: usize = 2;

/// Keys of the symbol panel; the first sits at image 3. Some characters
/// appear twice and the later image is the one used.
const SYMBOL_KEYS: &[char] = &[
    '!', '@', '#', '$', '%', '^', '&', '*', '(', ')', '-', '_', '=', '+', '\\', '|', '{', '}', '[',
    ']', ';', ':', '\'', '"', ',', '.', '<', '>', '$', '~', '`', '!', '@', '#', '/', '?',
];
const SYMBOL_OFFSET: usize = 3;

/// Default path of the element holding the three layout panels
pub const DEFAULT_CONTAINER: &str = r#"id("nppfs-keypad-certselect_tek_input1")/DIV[1]"#;

pub fn is_symbol(c: char) -> bool {
    SYMBOL_KEYS.contains(&c)
}

fn base_position(name: &str) -> Option<usize> {
    BASE_KEYS.iter().position(|k| *k == name).map(|i| i + BASE_OFFSET)
}

fn symbol_position(c: char) -> Option<usize> {
    SYMBOL_KEYS.iter().rposition(|k| *k == c).map(|i| i + SYMBOL_OFFSET)
}

/// 1-based image index of the step's key inside its layout panel
pub fn key_position(step: &KeySequenceStep) -> Option<usize> {
    match step.token {
        KeyToken::Char(c) if step.layout == Layout::Symbol && is_symbol(c) => symbol_position(c),
        KeyToken::Char(' ') => base_position("space"),
        KeyToken::Char(c) => base_position(&c.to_string()),
        KeyToken::Shift => base_position("shift"),
        KeyToken::Symbol => base_position("symbol"),
        KeyToken::Enter => base_position("enter"),
    }
}

/// Positional path of the key image: `<container>/DIV[layout]/IMG[position]`
pub fn key_path(container: &str, step: &KeySequenceStep) -> Option<String> {
    let position = key_position(step)?;
    Some(format!(
        "{}/DIV[{}]/IMG[{}]",
        container.trim_end_matches('/'),
        step.layout.ordinal(),
        position
    ))
}
