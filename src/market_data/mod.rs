//! Market data module - upstream REST client and wire types

pub mod messages;
pub mod rest;

pub use messages::MarketCoin;
pub use rest::{MarketDataRestClient, MAX_PER_REQUEST};
