//! Market data synchronization and its scheduler

pub mod scheduler;
pub mod synchronizer;

pub use scheduler::{RunGuard, SchedulerHandle, SyncScheduler};
pub use synchronizer::{partition_ids, CycleKind, CycleSummary, MarketDataSynchronizer, SyncSettings};
