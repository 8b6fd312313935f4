//! Types for specific services

pub mod events;
pub mod transaction_status;
