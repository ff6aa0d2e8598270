//! Kasa smart plug protocol: cipher, transport and per-plug command surface.

pub mod codec;
mod plug;
pub mod protocol;
pub mod transport;

pub use plug::Plug;
pub use plug::PlugSnapshot;
pub use plug::MIN_COMMAND_INTERVAL;
pub use protocol::Command;
pub use protocol::DeviceError;
pub use protocol::SysInfo;
pub use transport::TcpTransport;
pub use transport::Transport;
