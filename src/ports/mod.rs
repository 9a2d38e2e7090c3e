//! Port traits for the simulation's external collaborators.

pub mod config_port;
pub mod instrument_port;
pub mod price_port;
pub mod report_port;
pub mod score_port;
pub mod signal_port;
