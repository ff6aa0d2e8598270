use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;

use super::codec;
use super::protocol::Command;
use super::protocol::DeviceError;
use super::protocol::SysInfo;
use super::transport::Transport;
use crate::input::KeyId;

/// Minimum spacing between two commands to the same plug.
pub const MIN_COMMAND_INTERVAL: Duration = Duration::from_millis(500);

/// A smart plug bound to a trigger key.
///
/// All commands go through `state`, so at most one command is in flight per
/// plug and consecutive commands are spaced by [`MIN_COMMAND_INTERVAL`].
/// Plugs share nothing with each other.
pub struct Plug {
    address: String,
    trigger_key: KeyId,
    transport: Arc<dyn Transport>,
    state: Mutex<PlugState>,
}

/// Cached view of the plug, guarded by the plug's lock
#[derive(Debug, Default)]
struct PlugState {
    name: String,
    model: String,
    /// Last state we asked for, not confirmed by the device
    on: bool,
    last_command_at: Option<Instant>,
}

/// Point-in-time copy of a plug's cached identity and relay state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlugSnapshot {
    pub address: String,
    pub trigger_key: KeyId,
    pub name: String,
    pub model: String,
    pub on: bool,
}

impl Plug {
    pub fn new(address: String, trigger_key: KeyId, transport: Arc<dyn Transport>) -> Self {
        Self {
            address,
            trigger_key,
            transport,
            state: Mutex::new(PlugState::default()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn trigger_key(&self) -> KeyId {
        self.trigger_key
    }

    pub async fn snapshot(&self) -> PlugSnapshot {
        let state = self.state.lock().await;
        PlugSnapshot {
            address: self.address.clone(),
            trigger_key: self.trigger_key,
            name: state.name.clone(),
            model: state.model.clone(),
            on: state.on,
        }
    }

    /// Ask the plug for its system information and cache name, model and relay state.
    pub async fn query_system_info(&self) -> Result<SysInfo, DeviceError> {
        let mut state = self.state.lock().await;
        let response = self.send_command(&mut state, Command::GetSysInfo).await?;

        let info =
            SysInfo::from_response(&response).map_err(|source| DeviceError::ProtocolDecode {
                address: self.address.clone(),
                source,
            })?;

        state.name = info.alias.clone();
        state.model = info.model.clone();
        state.on = info.is_on();

        Ok(info)
    }

    pub async fn turn_on(&self) -> Result<(), DeviceError> {
        self.set_relay_state(true).await
    }

    pub async fn turn_off(&self) -> Result<(), DeviceError> {
        self.set_relay_state(false).await
    }

    /// Switch the relay to the opposite of the cached state.
    ///
    /// The cached state flips even if the command fails; the failure is
    /// returned but not rolled back. Returns the new cached state.
    pub async fn toggle(&self) -> Result<bool, DeviceError> {
        let mut state = self.state.lock().await;
        let target = !state.on;

        let result = self.send_command(&mut state, Command::SetRelayState(target)).await;
        state.on = target;

        info!(
            address = %self.address,
            name = %state.name,
            on = target,
            "Toggled plug"
        );

        result.map(|_| target)
    }

    async fn set_relay_state(&self, on: bool) -> Result<(), DeviceError> {
        let mut state = self.state.lock().await;
        self.send_command(&mut state, Command::SetRelayState(on)).await?;
        state.on = on;
        Ok(())
    }

    /// Send one command and return the decoded response.
    ///
    /// Must be called with the plug's lock held; `state` is the guarded value.
    async fn send_command(
        &self,
        state: &mut PlugState,
        command: Command,
    ) -> Result<Vec<u8>, DeviceError> {
        if let Some(last) = state.last_command_at {
            let elapsed = last.elapsed();
            if elapsed < MIN_COMMAND_INTERVAL {
                let wait = MIN_COMMAND_INTERVAL - elapsed;
                debug!(
                    address = %self.address,
                    wait_ms = wait.as_millis() as u64,
                    "Delaying command to plug"
                );
                tokio::time::sleep(wait).await;
            }
        }

        debug!(address = %self.address, ?command, "Sending command to plug");
        let request = codec::encode(command.payload().as_bytes());
        let result = self.transport.exchange(&self.address, &request).await;
        state.last_command_at = Some(Instant::now());

        result.map(|response| codec::decode(&response))
    }
}

impl std::fmt::Debug for Plug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plug")
            .field("address", &self.address)
            .field("trigger_key", &self.trigger_key)
            .field("transport", &"<transport>")
            .finish()
    }
}
