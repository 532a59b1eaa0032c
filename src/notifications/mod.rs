//! Notification delivery pipeline
//!
//! Committed triggers are published on a partitioned bus keyed by user id,
//! drained by the relay and pushed to the user's live WebSocket sessions.

pub mod bus;
pub mod events;
pub mod gateway;
pub mod publisher;
pub mod relay;
pub mod sessions;

pub use bus::EventBus;
pub use events::TriggeredAlertEvent;
pub use gateway::AlertGateway;
pub use publisher::NotificationPublisher;
pub use relay::{NotificationRelay, RelayHandle};
pub use sessions::SessionRegistry;
