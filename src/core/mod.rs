//! Core control loop
//!
//! - `scheduler`: the recurring tick cycle driving cache refresh,
//!   strategy evaluation, and order execution
//! - `heartbeat`: the per-tick liveness artifact
//! - `events`: structured trading event logging

pub mod events;
pub mod heartbeat;
pub mod scheduler;

pub use events::{log_event, TradingEvent, TradingEventType};
pub use heartbeat::Heartbeat;
pub use scheduler::Scheduler;
