mod service;
pub mod tasks;

pub use service::{parse_interval, SchedulerEvent, SchedulerService};
pub use tasks::{fetch_next_feed, CycleOutcome};
