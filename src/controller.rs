pub mod controller_handler;

pub use controller_handler::{write_report, Controller, RunSummary};
