//! Keybindings.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// What a key asks the console to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Unbound key.
    None,
    Quit,
    Explain,
    Kill,
}

/// Maps a key press to its action.
pub fn key_action(key: KeyEvent) -> KeyAction {
    match key.code {
        // Raw mode swallows SIGINT, so Ctrl-C arrives as a key.
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
        KeyCode::Char('q') | KeyCode::Char('Q') => KeyAction::Quit,
        KeyCode::Char('e') | KeyCode::Char('E') => KeyAction::Explain,
        KeyCode::Char('k') | KeyCode::Char('K') => KeyAction::Kill,
        _ => KeyAction::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    #[test]
    fn test_bindings() {
        assert_eq!(key_action(key('q')), KeyAction::Quit);
        assert_eq!(key_action(key('e')), KeyAction::Explain);
        assert_eq!(key_action(key('K')), KeyAction::Kill);
        assert_eq!(key_action(key('x')), KeyAction::None);
        assert_eq!(key_action(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)), KeyAction::None);
    }

    #[test]
    fn test_ctrl_c_quits() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(key_action(ctrl_c), KeyAction::Quit);
        assert_eq!(key_action(key('c')), KeyAction::None);
    }
}
