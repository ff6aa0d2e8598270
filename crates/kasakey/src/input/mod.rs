//! Key input and the dispatch loop that turns key presses into toggles.

mod terminal;

use std::fmt;
use std::ops::ControlFlow;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::DispatchMode;
use crate::kasa::Plug;
use crate::registry::Registry;

pub use terminal::TerminalKeySource;
pub use terminal::translate_event;

/// Identifier of a key on the input device.
///
/// Printable characters use their Unicode scalar value; special keys use
/// the constants on this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub u32);

impl KeyId {
    pub const TAB: KeyId = KeyId(0x09);
    pub const ENTER: KeyId = KeyId(0x0D);
    pub const ESC: KeyId = KeyId(0x1B);
    pub const BACKSPACE: KeyId = KeyId(0x7F);
    pub const F1: KeyId = KeyId(0xFFFF);
    pub const INSERT: KeyId = KeyId(0xFFFF - 12);
    pub const DELETE: KeyId = KeyId(0xFFFF - 13);
    pub const HOME: KeyId = KeyId(0xFFFF - 14);
    pub const END: KeyId = KeyId(0xFFFF - 15);
    pub const PAGE_UP: KeyId = KeyId(0xFFFF - 16);
    pub const PAGE_DOWN: KeyId = KeyId(0xFFFF - 17);
    pub const ARROW_UP: KeyId = KeyId(0xFFFF - 18);
    pub const ARROW_DOWN: KeyId = KeyId(0xFFFF - 19);
    pub const ARROW_LEFT: KeyId = KeyId(0xFFFF - 20);
    pub const ARROW_RIGHT: KeyId = KeyId(0xFFFF - 21);

    /// Function key `F<n>`, for `n` in `1..=12`
    pub fn function(n: u8) -> Option<KeyId> {
        (1..=12)
            .contains(&n)
            .then(|| KeyId(Self::F1.0 - u32::from(n - 1)))
    }
}

impl FromStr for KeyId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(KeyId)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event from the input device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// A key was pressed
    Key(KeyId),

    /// The user asked to quit (Ctrl+C)
    Interrupt,

    /// Anything else: releases, resizes, mouse, focus
    Other,
}

/// Trait for sources of input events
///
/// This trait allows for scripting input for testing purposes
#[async_trait]
pub trait KeySource: Send {
    /// Wait for the next event
    ///
    /// Returns None once the source is exhausted
    async fn next_event(&mut self) -> Option<InputEvent>;
}

/// Routes key presses to the plugs bound to them
pub struct Dispatcher {
    registry: Arc<Registry>,
    mode: DispatchMode,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, mode: DispatchMode) -> Self {
        Self { registry, mode }
    }

    /// Run the dispatch loop until an interrupt arrives or the source ends.
    pub async fn run<S: KeySource + ?Sized>(&self, source: &mut S) {
        info!("Listening for input");

        while let Some(event) = source.next_event().await {
            if self.handle_event(event).await.is_break() {
                info!("Received interrupt, stopping dispatcher");
                return;
            }
        }

        info!("Input source closed, stopping dispatcher");
    }

    /// Handle a single event
    ///
    /// Returns `Break` when the loop should stop.
    pub async fn handle_event(&self, event: InputEvent) -> ControlFlow<()> {
        let key = match event {
            InputEvent::Interrupt => return ControlFlow::Break(()),
            InputEvent::Other => return ControlFlow::Continue(()),
            InputEvent::Key(key) => key,
        };

        let mut matched = false;
        for plug in self.registry.plugs_for_key(key) {
            matched = true;
            match self.mode {
                DispatchMode::Inline => toggle(plug).await,
                DispatchMode::Spawn => {
                    let plug = plug.clone();
                    tokio::spawn(async move { toggle(&plug).await });
                }
            }
        }

        if !matched {
            debug!(%key, "Ignoring unbound key");
        }

        ControlFlow::Continue(())
    }
}

async fn toggle(plug: &Plug) {
    if let Err(e) = plug.toggle().await {
        warn!(
            address = plug.address(),
            key = %plug.trigger_key(),
            error = %e,
            "Could not toggle plug"
        );
    }
}
