//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_report_adapter;
pub mod csv_score_adapter;
pub mod file_config_adapter;
#[cfg(feature = "http")]
pub mod http_score_adapter;
pub mod indicator_signal_adapter;
