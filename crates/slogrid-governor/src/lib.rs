//! slogrid-governor — the closed control loop.
//!
//! One periodic tick drives the whole governor: evaluate every objective,
//! match coupling rules against the fresh snapshot in priority order,
//! dispatch actions to the external backpressure controller, then check
//! revert eligibility. Strategy-change notifications from the external
//! strategy manager trigger an out-of-cycle evaluation.
//!
//! All shared state has exactly one writer — the tick itself. Rule
//! registration requested while a tick is in flight is queued and applied
//! atomically at the next tick boundary, and `stop()` lets the in-flight
//! tick finish rather than preempting it.

pub mod governor;

pub use governor::{Governor, GovernorSettings, GovernorStatus};
