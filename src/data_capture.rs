pub mod capture_process;
pub mod command;
pub mod exporter;
pub mod output_decoder;
pub mod types;

pub use capture_process::CaptureProcess;
pub use command::{capture_command, export_command, CommandTemplate, Platform, Termination};
pub use exporter::export_capture;
pub use output_decoder::OutputDecoder;
pub use types::{CaptureArtifacts, SignalMarkers};
