pub mod config;
pub mod types;

pub use config::{validate_session, CliArgs, Config};
pub use types::{
    CaptureSettings, ControllerSettings, OutputFormat, OutputMode, SessionConfig,
    StorageSettings,
};
