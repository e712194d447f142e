//! slogrid-coupling — the rule engine linking SLO state to backpressure.
//!
//! Holds declarative coupling rules, evaluates them against each tick's
//! compliance snapshot in descending priority order, dispatches actions to
//! the external backpressure controller, and separately checks whether
//! previously-triggered rules are eligible to revert.
//!
//! The admission-control primitives themselves (queues, breakers, rate
//! caps) live behind [`BackpressureHandle`]; this crate only mutates and
//! queries them through that narrow interface.

pub mod backpressure;
pub mod controller;
pub mod error;
pub mod events;
pub mod history;

pub use backpressure::{BackpressureHandle, ControlFuture, InMemoryController, StrategyHandle};
pub use controller::{cooldown_duration, CouplingController};
pub use error::CouplingError;
pub use events::{EventBus, GovernorEvent};
pub use history::ActionHistory;
