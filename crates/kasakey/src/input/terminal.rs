//! Key events from the controlling terminal.

use std::io;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use crossterm::event;
use crossterm::event::Event;
use crossterm::event::KeyCode;
use crossterm::event::KeyEvent;
use crossterm::event::KeyEventKind;
use crossterm::event::KeyModifiers;
use crossterm::terminal;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::warn;

use super::InputEvent;
use super::KeyId;
use super::KeySource;

/// Capacity for the reader thread → dispatcher channel
const EVENT_CHANNEL_SIZE: usize = 64;

/// How often the reader thread checks whether the source was dropped
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Reads key presses from the terminal in raw mode.
///
/// crossterm's reader blocks, so it runs on its own thread and forwards
/// translated events over a channel. Raw mode is restored on drop.
pub struct TerminalKeySource {
    rx: mpsc::Receiver<InputEvent>,
}

impl TerminalKeySource {
    pub fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let spawned = thread::Builder::new()
            .name("key-reader".to_string())
            .spawn(move || read_events(tx));

        if let Err(e) = spawned {
            let _ = terminal::disable_raw_mode();
            return Err(e);
        }

        Ok(Self { rx })
    }
}

impl Drop for TerminalKeySource {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            warn!("Failed to restore terminal mode: {}", e);
        }
    }
}

#[async_trait]
impl KeySource for TerminalKeySource {
    async fn next_event(&mut self) -> Option<InputEvent> {
        self.rx.recv().await
    }
}

fn read_events(tx: mpsc::Sender<InputEvent>) {
    while !tx.is_closed() {
        match event::poll(POLL_INTERVAL) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!("Failed to poll terminal events: {}", e);
                break;
            }
        }

        let event = match event::read() {
            Ok(event) => translate_event(&event),
            Err(e) => {
                warn!("Failed to read terminal event: {}", e);
                break;
            }
        };

        if tx.blocking_send(event).is_err() {
            break;
        }
    }

    debug!("Key reader thread exiting");
}

/// Map a crossterm event onto an [`InputEvent`].
pub fn translate_event(event: &Event) -> InputEvent {
    match event {
        Event::Key(key) => translate_key(key),
        _ => InputEvent::Other,
    }
}

fn translate_key(key: &KeyEvent) -> InputEvent {
    if key.kind != KeyEventKind::Press {
        return InputEvent::Other;
    }

    let id = match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if !c.is_ascii_alphabetic() {
                return InputEvent::Other;
            }
            // Ctrl+A..Ctrl+Z are the control codes 0x01..0x1A
            let code = u32::from(c.to_ascii_lowercase()) & 0x1F;
            if code == 0x03 {
                return InputEvent::Interrupt;
            }
            KeyId(code)
        }
        KeyCode::Char(c) => KeyId(u32::from(c)),
        KeyCode::Enter => KeyId::ENTER,
        KeyCode::Tab => KeyId::TAB,
        KeyCode::Esc => KeyId::ESC,
        KeyCode::Backspace => KeyId::BACKSPACE,
        KeyCode::F(n) => match KeyId::function(n) {
            Some(id) => id,
            None => return InputEvent::Other,
        },
        KeyCode::Insert => KeyId::INSERT,
        KeyCode::Delete => KeyId::DELETE,
        KeyCode::Home => KeyId::HOME,
        KeyCode::End => KeyId::END,
        KeyCode::PageUp => KeyId::PAGE_UP,
        KeyCode::PageDown => KeyId::PAGE_DOWN,
        KeyCode::Up => KeyId::ARROW_UP,
        KeyCode::Down => KeyId::ARROW_DOWN,
        KeyCode::Left => KeyId::ARROW_LEFT,
        KeyCode::Right => KeyId::ARROW_RIGHT,
        _ => return InputEvent::Other,
    };

    InputEvent::Key(id)
}
