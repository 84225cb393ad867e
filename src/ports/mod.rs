//! Port traits: the seams between the domain and its collaborators.

pub mod config_port;
pub mod market_data_port;
pub mod trade_store;
