//! Price alerts: rule types, evaluation against live prices and the
//! user-facing lifecycle

pub mod evaluation;
pub mod lifecycle;
pub mod types;

pub use evaluation::{pct_change, should_trigger, AlertEvaluator};
pub use lifecycle::{validate_threshold, AlertManager};
pub use types::{AlertKind, AlertRequest, AlertRule, AlertStats, AlertStatus, AlertView, NewAlert};
