//! Per-user watchlists of tracked assets

pub mod manager;
pub mod types;

pub use manager::WatchlistManager;
pub use types::{WatchEntry, WatchedAsset};
