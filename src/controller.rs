use std::time::Duration;
use tracing::trace;

use crate::config::DashConfig;
use crate::domain::{DashError, Message};
use crate::model::Model;
use crate::router::Tab;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &DashConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, DashError> {
        if event::poll(Duration::from_millis(self.event_poll_time))? {
            match event::read()? {
                Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                    if model.raw_keyevents() {
                        return Ok(Some(Message::RawKey(key)));
                    }
                    return Ok(self.handle_key(key));
                }
                Event::Resize(_, height) => {
                    return Ok(Some(Message::Resize(height as usize)));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn handle_key(&self, key: KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Tab, _) => Some(Message::NextTab),
            (KeyCode::BackTab, _) => Some(Message::PrevTab),
            (KeyCode::Char('1'), _) => Some(Message::SelectTab(Tab::Home)),
            (KeyCode::Char('2'), _) => Some(Message::SelectTab(Tab::Boards)),
            (KeyCode::Char('3'), _) => Some(Message::SelectTab(Tab::Jobs)),
            (KeyCode::Char('4'), _) => Some(Message::SelectTab(Tab::Companies)),
            (KeyCode::Right, _) => Some(Message::NextOption),
            (KeyCode::Left, _) => Some(Message::PrevOption),
            (KeyCode::Char('/'), _) | (KeyCode::Char('i'), _) => Some(Message::EditFilter),
            (KeyCode::Enter, _) => Some(Message::Submit),
            (KeyCode::Esc, _) => Some(Message::Cancel),
            (KeyCode::Up, _) | (KeyCode::Char('k'), _) => Some(Message::MoveUp),
            (KeyCode::Down, _) | (KeyCode::Char('j'), _) => Some(Message::MoveDown),
            (KeyCode::PageUp, _) => Some(Message::MovePageUp),
            (KeyCode::PageDown, _) => Some(Message::MovePageDown),
            (KeyCode::Char('y'), _) => Some(Message::CopyLink),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
