//! Command vocabulary and response types for the Kasa plug protocol.
//!
//! Requests and responses are JSON documents, ciphered and framed by
//! [`super::codec`] and carried over TCP port 9999.

use serde::Deserialize;
use serde::Serialize;

/// Default TCP port Kasa plugs listen on.
pub const DEFAULT_PORT: u16 = 9999;

/// Commands understood by the plug firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetSysInfo,
    SetRelayState(bool),
}

impl Command {
    /// Plaintext JSON sent to the device for this command.
    pub fn payload(self) -> &'static str {
        match self {
            Command::GetSysInfo => r#"{"system":{"get_sysinfo":{}}}"#,
            Command::SetRelayState(true) => r#"{"system":{"set_relay_state":{"state":1}}}"#,
            Command::SetRelayState(false) => r#"{"system":{"set_relay_state":{"state":0}}}"#,
        }
    }
}

/// System information reported by `get_sysinfo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SysInfo {
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub model: String,
    /// 1 = on, 0 = off
    #[serde(default)]
    pub relay_state: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_ver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hw_ver: Option<String>,
    #[serde(default, rename = "deviceId", skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub led_off: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_code: Option<i64>,
}

impl SysInfo {
    pub fn is_on(&self) -> bool {
        self.relay_state == 1
    }

    /// Parse a decoded `{"system":{"get_sysinfo":{...}}}` response.
    pub fn from_response(plaintext: &[u8]) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Envelope {
            system: SystemSection,
        }

        #[derive(Deserialize)]
        struct SystemSection {
            get_sysinfo: SysInfo,
        }

        let envelope: Envelope = serde_json::from_slice(plaintext)?;
        Ok(envelope.system.get_sysinfo)
    }
}

/// Failures of a single command exchange with a plug.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("plug {address} is unreachable: {source}")]
    Unreachable {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to send command to plug {address}: {source}")]
    CommandSendFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read response from plug {address}: {source}")]
    ResponseReadFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("plug {address} sent an undecodable response: {source}")]
    ProtocolDecode {
        address: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DeviceError {
    /// Address of the plug the failed exchange was aimed at.
    pub fn address(&self) -> &str {
        match self {
            DeviceError::Unreachable { address, .. }
            | DeviceError::CommandSendFailed { address, .. }
            | DeviceError::ResponseReadFailed { address, .. }
            | DeviceError::ProtocolDecode { address, .. } => address,
        }
    }
}
