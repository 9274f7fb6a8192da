//! Keyboard Input
//!
//! Maps terminal key events to editing actions and reads them off a
//! dedicated thread so the session loop never blocks on the keyboard.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// What a key press asks the session to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Insert(char),
    Backspace,
    Left,
    Right,
    Home,
    End,
    /// Send the line
    Submit,
    /// Send the image whose path is the current line
    AttachImage,
    Quit,
}

/// Map a key event to an action
pub fn map_key(key: KeyEvent) -> Option<InputAction> {
    if key.kind == KeyEventKind::Release {
        return None;
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let action = match key.code {
        KeyCode::Char('c') | KeyCode::Char('d') if ctrl => InputAction::Quit,
        KeyCode::Char('a') if ctrl => InputAction::AttachImage,
        KeyCode::Char(_) if ctrl => return None,
        KeyCode::Char(c) => InputAction::Insert(c),
        KeyCode::Tab => InputAction::Insert(' '),
        KeyCode::Enter => InputAction::Submit,
        KeyCode::Backspace => InputAction::Backspace,
        KeyCode::Left => InputAction::Left,
        KeyCode::Right => InputAction::Right,
        KeyCode::Home => InputAction::Home,
        KeyCode::End => InputAction::End,
        _ => return None,
    };
    Some(action)
}

/// Read terminal events on a background thread until the receiver goes away
pub fn spawn_terminal_reader(tick: Duration) -> mpsc::UnboundedReceiver<InputAction> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        while !tx.is_closed() {
            match event::poll(tick) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    debug!("Terminal poll failed: {}", e);
                    break;
                }
            }

            let action = match event::read() {
                Ok(Event::Key(key)) => map_key(key),
                Ok(_) => None,
                Err(e) => {
                    debug!("Terminal read failed: {}", e);
                    break;
                }
            };

            if let Some(action) = action {
                if tx.send(action).is_err() {
                    break;
                }
            }
        }
    });

    rx
}
