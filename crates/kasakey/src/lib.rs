pub mod api;
pub mod config;
pub mod input;
pub mod kasa;
pub mod logging;
pub mod registry;

pub use config::Config;
pub use config::ConfigError;
pub use config::DispatchMode;
pub use config::LogLevel;
pub use config::format_mapping_error;
pub use input::Dispatcher;
pub use input::InputEvent;
pub use input::KeyId;
pub use input::KeySource;
pub use kasa::DeviceError;
pub use kasa::Plug;
pub use registry::Registry;
