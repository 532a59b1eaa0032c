//! Channel type definitions for inter-task communication

use tokio::sync::mpsc;

use crate::notifications::events::TriggeredAlertEvent;

/// Sender half carrying triggered-alert events
pub type EventSender = mpsc::Sender<TriggeredAlertEvent>;

/// Receiver half carrying triggered-alert events
pub type EventReceiver = mpsc::Receiver<TriggeredAlertEvent>;

/// Create a new alert event channel with a custom buffer size
pub fn create_event_channel_with_size(size: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(size.max(1))
}
