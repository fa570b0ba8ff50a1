//! Keyboard control surface
//!
//! Pure mapping from terminal key events to player commands; the binary
//! executes the commands against the facade.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// A user intent addressed to the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    TogglePlay,
    NextTrack,
    PrevTrack,
    VolumeUp,
    VolumeDown,
    CycleMode,
    Quit,
}

/// Volume step per arrow key press.
pub const VOLUME_STEP: f32 = 0.1;

pub fn map_key(key: KeyEvent) -> Option<Command> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char(' ') => Some(Command::TogglePlay),
        KeyCode::Right => Some(Command::NextTrack),
        KeyCode::Left => Some(Command::PrevTrack),
        KeyCode::Up => Some(Command::VolumeUp),
        KeyCode::Down => Some(Command::VolumeDown),
        KeyCode::Char('m') | KeyCode::Char('M') => Some(Command::CycleMode),
        KeyCode::Char('q') | KeyCode::Char('Q') => Some(Command::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Command::Quit)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn transport_keys_map_to_commands() {
        assert_eq!(map_key(press(KeyCode::Char(' '))), Some(Command::TogglePlay));
        assert_eq!(map_key(press(KeyCode::Right)), Some(Command::NextTrack));
        assert_eq!(map_key(press(KeyCode::Left)), Some(Command::PrevTrack));
        assert_eq!(map_key(press(KeyCode::Up)), Some(Command::VolumeUp));
        assert_eq!(map_key(press(KeyCode::Down)), Some(Command::VolumeDown));
        assert_eq!(map_key(press(KeyCode::Char('m'))), Some(Command::CycleMode));
        assert_eq!(map_key(press(KeyCode::Char('q'))), Some(Command::Quit));
    }

    #[test]
    fn ctrl_c_quits() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(map_key(key), Some(Command::Quit));
    }

    #[test]
    fn unrelated_keys_are_ignored() {
        assert_eq!(map_key(press(KeyCode::Char('z'))), None);
        assert_eq!(map_key(press(KeyCode::Enter)), None);
    }

    #[test]
    fn key_release_is_ignored() {
        let mut key = KeyEvent::new(KeyCode::Char(' '), KeyModifiers::NONE);
        key.kind = KeyEventKind::Release;
        assert_eq!(map_key(key), None);
    }
}
