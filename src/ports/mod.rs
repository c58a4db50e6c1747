//! Port traits decoupling the simulation core from storage and output.

pub mod config_port;
pub mod data_port;
pub mod report_port;

pub use config_port::ConfigPort;
pub use data_port::DataPort;
pub use report_port::ReportPort;
