//! Shared types, errors, traits and channel helpers

pub mod channels;
pub mod errors;
pub mod traits;
pub mod types;
