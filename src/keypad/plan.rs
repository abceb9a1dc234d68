use serde::Serialize;
use std::fmt;

/// One press on the keypad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyToken {
    Char(char),
    Shift,
    Symbol,
    Enter,
}

impl fmt::Display for KeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyToken::Char(' ') => write!(f, "space"),
            KeyToken::Char(c) => write!(f, "{}", c),
            KeyToken::Shift => write!(f, "shift"),
            KeyToken::Symbol => write!(f, "symbol"),
            KeyToken::Enter => write!(f, "enter"),
        }
    }
}

/// Key set shown by the keypad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    Base,
    Shift,
    Symbol,
}

impl Layout {
    /// 1-based panel index inside the keypad container
    pub fn ordinal(&self) -> usize {
        match self {
            Layout::Base => 1,
            Layout::Shift => 2,
            Layout::Symbol => 3,
        }
    }

    /// Layout shown after pressing `token` on this one
    fn after(self, token: KeyToken) -> Layout {
        match (self, token) {
            (Layout::Base, KeyToken::Shift) => Layout::Shift,
            (Layout::Base, KeyToken::Symbol) => Layout::Symbol,
            (Layout::Shift, KeyToken::Shift) => Layout::Base,
            (Layout::Shift, KeyToken::Symbol) => Layout::Symbol,
            (Layout::Symbol, KeyToken::Symbol) => Layout::Base,
            (Layout::Symbol, KeyToken::Shift) => Layout::Shift,
            (layout, _) => layout,
        }
    }
}

/// A key press and the layout visible while it is pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeySequenceStep {
    pub token: KeyToken,
    pub layout: Layout,
}

impl KeySequenceStep {
    pub fn new(token: KeyToken, layout: Layout) -> Self {
        Self { token, layout }
    }
}

/// Keys to press, in order, to type `password` and submit it.
///
/// Toggles are closed before characters that need neither of them and at
/// the end, so the keypad is back on its base layout before `enter`
/// unless an uppercase letter followed a symbol.
pub fn plan_key_sequence(password: &str) -> Vec<KeySequenceStep> {
    let mut tokens = Vec::with_capacity(password.len() + 2);
    let mut shift_active = false;
    let mut symbol_active = false;

    for c in password.chars() {
        if c.is_ascii_uppercase() {
            if !shift_active {
                tokens.push(KeyToken::Shift);
                shift_active = true;
            }
            tokens.push(KeyToken::Char(c.to_ascii_lowercase()));
        } else if c.is_ascii_lowercase() {
            if shift_active {
                tokens.push(KeyToken::Shift);
                shift_active = false;
            }
            tokens.push(KeyToken::Char(c));
        } else if super::layout::is_symbol(c) {
            if !symbol_active {
                tokens.push(KeyToken::Symbol);
                symbol_active = true;
            }
            tokens.push(KeyToken::Char(c));
        } else {
            if shift_active {
                tokens.push(KeyToken::Shift);
                shift_active = false;
            }
            if symbol_active {
                tokens.push(KeyToken::Symbol);
                symbol_active = false;
            }
            tokens.push(KeyToken::Char(c));
        }
    }

    if shift_active {
        tokens.push(KeyToken::Shift);
    }
    if symbol_active {
        tokens.push(KeyToken::Symbol);
    }
    tokens.push(KeyToken::Enter);

    let plan = tag_layouts(&tokens);
    let misplaced = off_layout_presses(&plan);
    if !misplaced.is_empty() {
        // positions only, the characters are part of a password
        tracing::warn!(
            "Keypad plan presses {} key(s) on the symbol layout that are not symbols (steps {:?}); \
             the keypad will type different characters",
            misplaced.len(),
            misplaced
        );
    }
    plan
}

/// Indices of character presses on the symbol layout that are not symbols.
/// They hit whatever symbol sits at the character's base position.
pub fn off_layout_presses(plan: &[KeySequenceStep]) -> Vec<usize> {
    plan.iter()
        .enumerate()
        .filter(|(_, step)| {
            step.layout == Layout::Symbol
                && matches!(step.token, KeyToken::Char(c) if !super::layout::is_symbol(c))
        })
        .map(|(i, _)| i)
        .collect()
}

/// Pair each token with the layout active when it is pressed, starting
/// from the base layout
pub fn tag_layouts(tokens: &[KeyToken]) -> Vec<KeySequenceStep> {
    let mut layout = Layout::Base;
    tokens
        .iter()
        .map(|token| {
            let step = KeySequenceStep::new(*token, layout);
            layout = layout.after(*token);
            step
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use KeyToken::*;

    fn steps(spec: &[(KeyToken, Layout)]) -> Vec<KeySequenceStep> {
        spec.iter().map(|(t, l)| KeySequenceStep::new(*t, *l)).collect()
    }

    #[test]
    fn test_mixed_case_and_digit() {
        assert_eq!(
            plan_key_sequence("Ab1"),
            steps(&[
                (Shift, Layout::Base),
                (Char('a'), Layout::Shift),
                (Shift, Layout::Shift),
                (Char('b'), Layout::Base),
                (Char('1'), Layout::Base),
                (Enter, Layout::Base),
            ])
        );
    }

    #[test]
    fn test_symbols_close_before_digits() {
        let tokens: Vec<KeyToken> = plan_key_sequence("!@9").into_iter().map(|s| s.token).collect();
        assert_eq!(tokens, vec![Symbol, Char('!'), Char('@'), Symbol, Char('9'), Enter]);
    }

    #[test]
    fn test_open_toggles_closed_at_end() {
        let plan = plan_key_sequence("aB");
        assert_eq!(plan.last(), Some(&KeySequenceStep::new(Enter, Layout::Base)));
        assert_eq!(plan[plan.len() - 2], KeySequenceStep::new(Shift, Layout::Shift));
        assert_eq!(plan_key_sequence(""), steps(&[(Enter, Layout::Base)]));
    }

    #[test]
    fn test_layout_changes_only_at_toggles() {
        let plan = plan_key_sequence("Pa$$w0rd!X");
        for pair in plan.windows(2) {
            if pair[0].layout != pair[1].layout {
                assert!(matches!(pair[0].token, Shift | Symbol), "layout changed after {:?}", pair[0]);
            }
        }
    }

    #[test]
    fn test_letter_after_symbol_is_flagged() {
        let plan = plan_key_sequence("p@ss");
        // p, symbol, @, s, s on the symbol layout
        assert_eq!(plan[3], KeySequenceStep::new(Char('s'), Layout::Symbol));
        assert_eq!(off_layout_presses(&plan), vec![3, 4]);
        assert!(off_layout_presses(&plan_key_sequence("Ab1!9")).is_empty());
    }

    #[test]
    fn test_toggle_jumps_between_shift_and_symbol() {
        assert_eq!(
            tag_layouts(&[Shift, Symbol, Shift, Shift]),
            steps(&[
                (Shift, Layout::Base),
                (Symbol, Layout::Shift),
                (Shift, Layout::Symbol),
                (Shift, Layout::Shift),
            ])
        );
    }
}
