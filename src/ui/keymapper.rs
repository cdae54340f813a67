//! Key mapping for terminal input
//!
//! Converts crossterm events into application shortcuts or line-editor keys.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

use crate::core::line_editor::{KeyInput, Modifiers};

/// Rows moved per Shift+PageUp/PageDown
pub const PAGE_SCROLL: usize = 10;

/// Rows moved per mouse wheel notch
pub const WHEEL_SCROLL: usize = 3;

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        if mods.intersects(KeyModifiers::SUPER | KeyModifiers::META) {
            result |= Modifiers::META;
        }
        result
    }
}

/// Shortcuts handled by the application rather than the line editor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppAction {
    /// Ctrl+E
    ToggleExpand,
    /// Ctrl+T
    CycleTheme,
    /// Ctrl+K
    ClearTerminal,
    /// Ctrl+Q
    Quit,
    /// Scroll the terminal view back by this many rows
    ScrollUp(usize),
    /// Scroll the terminal view towards the live rows
    ScrollDown(usize),
}

/// Key mapper for converting crossterm events
pub struct KeyMapper;

impl KeyMapper {
    /// Application shortcut bound to this key, if any
    pub fn action(event: &KeyEvent) -> Option<AppAction> {
        let mods = event.modifiers;
        let ctrl_only = mods == KeyModifiers::CONTROL;

        match event.code {
            KeyCode::Char(ch) if ctrl_only => match ch.to_ascii_lowercase() {
                'e' => Some(AppAction::ToggleExpand),
                't' => Some(AppAction::CycleTheme),
                'k' => Some(AppAction::ClearTerminal),
                'q' => Some(AppAction::Quit),
                _ => None,
            },
            KeyCode::PageUp if mods.contains(KeyModifiers::SHIFT) => {
                Some(AppAction::ScrollUp(PAGE_SCROLL))
            }
            KeyCode::PageDown if mods.contains(KeyModifiers::SHIFT) => {
                Some(AppAction::ScrollDown(PAGE_SCROLL))
            }
            _ => None,
        }
    }

    /// Map a key to line-editor input
    pub fn map(event: &KeyEvent) -> KeyInput {
        let mods = Modifiers::from(event.modifiers);

        match event.code {
            KeyCode::Char(ch) => KeyInput::Char(ch, mods),
            KeyCode::Enter => KeyInput::Enter,
            KeyCode::Backspace => KeyInput::Backspace,
            KeyCode::Up => KeyInput::Up,
            KeyCode::Down => KeyInput::Down,
            _ => KeyInput::Other,
        }
    }

    /// Mouse wheel scrolling of the terminal view
    pub fn mouse_action(event: &MouseEvent) -> Option<AppAction> {
        match event.kind {
            MouseEventKind::ScrollUp => Some(AppAction::ScrollUp(WHEEL_SCROLL)),
            MouseEventKind::ScrollDown => Some(AppAction::ScrollDown(WHEEL_SCROLL)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_event(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    #[test]
    fn test_char_keys() {
        let event = key_event(KeyCode::Char('a'), KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&event), KeyInput::char('a'));

        let event = key_event(KeyCode::Char('A'), KeyModifiers::SHIFT);
        assert_eq!(KeyMapper::map(&event), KeyInput::Char('A', Modifiers::SHIFT));

        let event = key_event(KeyCode::Char('x'), KeyModifiers::ALT);
        assert_eq!(KeyMapper::map(&event), KeyInput::Char('x', Modifiers::ALT));
    }

    #[test]
    fn test_super_counts_as_meta() {
        let event = key_event(KeyCode::Char('v'), KeyModifiers::SUPER);
        let KeyInput::Char(_, mods) = KeyMapper::map(&event) else {
            panic!("expected a char key");
        };
        assert!(mods.is_chord());
    }

    #[test]
    fn test_editing_keys() {
        let none = KeyModifiers::NONE;
        assert_eq!(KeyMapper::map(&key_event(KeyCode::Enter, none)), KeyInput::Enter);
        assert_eq!(KeyMapper::map(&key_event(KeyCode::Backspace, none)), KeyInput::Backspace);
        assert_eq!(KeyMapper::map(&key_event(KeyCode::Up, none)), KeyInput::Up);
        assert_eq!(KeyMapper::map(&key_event(KeyCode::Down, none)), KeyInput::Down);
        assert_eq!(KeyMapper::map(&key_event(KeyCode::Left, none)), KeyInput::Other);
        assert_eq!(KeyMapper::map(&key_event(KeyCode::F(1), none)), KeyInput::Other);
    }

    #[test]
    fn test_app_shortcuts() {
        let ctrl = KeyModifiers::CONTROL;
        assert_eq!(
            KeyMapper::action(&key_event(KeyCode::Char('e'), ctrl)),
            Some(AppAction::ToggleExpand)
        );
        assert_eq!(
            KeyMapper::action(&key_event(KeyCode::Char('q'), ctrl)),
            Some(AppAction::Quit)
        );
        assert_eq!(
            KeyMapper::action(&key_event(KeyCode::PageUp, KeyModifiers::SHIFT)),
            Some(AppAction::ScrollUp(PAGE_SCROLL))
        );

        // Unbound chords and plain letters go to the editor
        assert_eq!(KeyMapper::action(&key_event(KeyCode::Char('c'), ctrl)), None);
        assert_eq!(
            KeyMapper::action(&key_event(KeyCode::Char('e'), KeyModifiers::NONE)),
            None
        );
        assert_eq!(
            KeyMapper::action(&key_event(KeyCode::Char('e'), ctrl | KeyModifiers::ALT)),
            None
        );
    }

    #[test]
    fn test_mouse_wheel() {
        let event = MouseEvent {
            kind: MouseEventKind::ScrollUp,
            column: 5,
            row: 5,
            modifiers: KeyModifiers::NONE,
        };
        assert_eq!(
            KeyMapper::mouse_action(&event),
            Some(AppAction::ScrollUp(WHEEL_SCROLL))
        );

        let event = MouseEvent {
            kind: MouseEventKind::Moved,
            ..event
        };
        assert_eq!(KeyMapper::mouse_action(&event), None);
    }
}
