//! rebalancer: weekly portfolio-rebalancing backtester.
//!
//! Hexagonal architecture: simulation engine in [`domain`], collaborator
//! traits in [`ports`], file and HTTP implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
