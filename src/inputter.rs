use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::trace;

/// How an edit session was left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditEnd {
    Accepted,
    Canceled,
}

/// Snapshot of the line being edited, as the UI draws it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EditState {
    pub text: String,
    pub cursor: usize,
    pub end: Option<EditEnd>,
}

/// Single line editor behind the free-text filter controls. Positions are
/// counted in chars so multibyte input edits cleanly.
#[derive(Default)]
pub struct Inputter {
    chars: Vec<char>,
    cursor: usize,
    end: Option<EditEnd>,
}

impl Inputter {
    /// Begins a session on an existing value with the cursor at the end.
    pub fn start(&mut self, value: &str) {
        self.chars = value.chars().collect();
        self.cursor = self.chars.len();
        self.end = None;
    }

    pub fn read(&mut self, key: KeyEvent) -> EditState {
        self.apply(key);
        let state = self.state();
        trace!("Input: {state:?}");
        state
    }

    pub fn state(&self) -> EditState {
        EditState {
            text: self.chars.iter().collect(),
            cursor: self.cursor,
            end: self.end,
        }
    }

    fn apply(&mut self, key: KeyEvent) {
        let len = self.chars.len();
        match key.code {
            KeyCode::Enter => self.end = Some(EditEnd::Accepted),
            KeyCode::Esc => self.end = Some(EditEnd::Canceled),
            KeyCode::Backspace if self.cursor > 0 => {
                self.cursor -= 1;
                self.chars.remove(self.cursor);
            }
            KeyCode::Delete if self.cursor < len => {
                self.chars.remove(self.cursor);
            }
            KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Right => self.cursor = (self.cursor + 1).min(len),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = len,
            KeyCode::Char(c)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                self.chars.insert(self.cursor, c);
                self.cursor += 1;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(inputter: &mut Inputter, code: KeyCode) -> EditState {
        inputter.read(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_str(inputter: &mut Inputter, s: &str) {
        for c in s.chars() {
            press(inputter, KeyCode::Char(c));
        }
    }

    #[test]
    fn typing_and_enter() {
        let mut inputter = Inputter::default();
        type_str(&mut inputter, "data");
        let state = press(&mut inputter, KeyCode::Enter);
        assert_eq!(state.text, "data");
        assert_eq!(state.end, Some(EditEnd::Accepted));
    }

    #[test]
    fn edits_in_the_middle_with_multibyte_chars() {
        let mut inputter = Inputter::default();
        type_str(&mut inputter, "инжнер");
        for _ in 0..3 {
            press(&mut inputter, KeyCode::Left);
        }
        type_str(&mut inputter, "е");
        assert_eq!(inputter.state().text, "инженер");
        press(&mut inputter, KeyCode::Backspace);
        press(&mut inputter, KeyCode::Home);
        press(&mut inputter, KeyCode::Delete);
        assert_eq!(inputter.state().text, "нжнер");
        assert_eq!(inputter.state().cursor, 0);
    }

    #[test]
    fn cursor_stays_in_bounds() {
        let mut inputter = Inputter::default();
        inputter.start("ab");
        press(&mut inputter, KeyCode::Right);
        assert_eq!(inputter.state().cursor, 2);
        press(&mut inputter, KeyCode::Delete);
        press(&mut inputter, KeyCode::Home);
        press(&mut inputter, KeyCode::Left);
        press(&mut inputter, KeyCode::Backspace);
        assert_eq!(inputter.state().cursor, 0);
        assert_eq!(inputter.state().text, "ab");
    }

    #[test]
    fn escape_cancels_and_restart_clears_the_outcome() {
        let mut inputter = Inputter::default();
        inputter.start("sql");
        let state = press(&mut inputter, KeyCode::Esc);
        assert_eq!(state.end, Some(EditEnd::Canceled));
        assert_eq!(state.cursor, 3);
        inputter.start("");
        assert_eq!(inputter.state(), EditState::default());
    }

    #[test]
    fn control_chords_are_ignored() {
        let mut inputter = Inputter::default();
        inputter.read(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert_eq!(inputter.state().text, "");
    }
}
