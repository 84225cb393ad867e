//! Core domain types and logic.

pub mod account;
pub mod admission;
pub mod clock;
pub mod emotional_gate;
pub mod error;
pub mod rules;
pub mod session_stats;
pub mod submission;
pub mod trade;
pub mod violation;
