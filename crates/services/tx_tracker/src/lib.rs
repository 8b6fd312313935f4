//! This crate provides a service for tracking the statuses of submitted transactions.
//!
//! Transactions are registered under a client-generated tracking id. The service keeps a
//! connection to the backend event stream and moves every registered transaction through
//! its stages as correlated events arrive. Final statuses are dropped after a retention
//! period.

#![deny(clippy::cast_possible_truncation)]
#![deny(unused_crate_dependencies)]
#![deny(warnings)]

pub mod config;
mod error;
mod event_stream;
mod manager;
pub mod ports;
mod pruner;
pub mod service;
mod shared_state;
mod update_sender;
pub mod websocket;

pub use config::{
    Config,
    TransitionTable,
};
pub use error::Error;
pub use event_stream::ConnectionState;
pub use manager::TxStatusManager;
pub use service::{
    new_service,
    Task,
    TransactionService,
};
pub use shared_state::SharedState;
pub use update_sender::Listener;

#[cfg(test)]
mod tests;
#[cfg(test)]
meeray_trace::enable_tracing!();
