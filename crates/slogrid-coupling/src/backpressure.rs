//! External collaborator interfaces.
//!
//! The backpressure controller and the strategy manager own the live
//! admission-control configuration and degradation level. The governor
//! only calls into them through these traits and listens for strategy
//! changes on a watch channel.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use slogrid_types::{BackpressureConfig, BackpressureOverrides, StrategySnapshot};

/// Boxed future for backpressure mutation/query calls.
///
/// Calls are treated as synchronous and idempotent from the governor's
/// point of view; a failed call is not retried within the same tick.
pub type ControlFuture<T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<T>> + Send>>;

/// Narrow mutation/query interface to the external backpressure controller.
pub trait BackpressureHandle: Send + Sync {
    /// Merge a partial configuration into the live config.
    fn update_config(&self, overrides: BackpressureOverrides) -> ControlFuture<()>;

    /// Current live configuration.
    fn get_config(&self) -> ControlFuture<BackpressureConfig>;

    /// Open the circuit breaker for a named subject.
    fn open_circuit_breaker(&self, subject: &str) -> ControlFuture<()>;

    /// Close a previously opened circuit breaker.
    fn close_circuit_breaker(&self, subject: &str) -> ControlFuture<()>;
}

/// Read interface to the external strategy manager.
pub trait StrategyHandle: Send + Sync {
    /// Current degradation level and budget-consumption estimate.
    fn current_strategy(&self) -> StrategySnapshot;

    /// Channel that receives a new snapshot whenever the strategy changes;
    /// the governor uses it to re-evaluate rules out-of-cycle.
    fn subscribe_changes(&self) -> watch::Receiver<StrategySnapshot>;
}

// ── In-memory implementation ───────────────────────────────────────

/// In-process backpressure controller and strategy manager.
///
/// Backs the demo daemon and the test suites; a production deployment
/// would put a real admission-control stack behind the same traits.
#[derive(Clone)]
pub struct InMemoryController {
    inner: Arc<Mutex<ControllerState>>,
    strategy_tx: Arc<watch::Sender<StrategySnapshot>>,
}

struct ControllerState {
    config: BackpressureConfig,
    open_breakers: HashSet<String>,
}

impl Default for InMemoryController {
    fn default() -> Self {
        Self::new(BackpressureConfig::default())
    }
}

impl InMemoryController {
    pub fn new(config: BackpressureConfig) -> Self {
        let snapshot = StrategySnapshot {
            degradation: config.degradation,
            budget_consumption: 0.0,
        };
        let (strategy_tx, _) = watch::channel(snapshot);
        Self {
            inner: Arc::new(Mutex::new(ControllerState {
                config,
                open_breakers: HashSet::new(),
            })),
            strategy_tx: Arc::new(strategy_tx),
        }
    }

    /// Currently open breaker subjects, sorted.
    pub fn open_breakers(&self) -> Vec<String> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut subjects: Vec<_> = state.open_breakers.iter().cloned().collect();
        subjects.sort();
        subjects
    }

    /// Push a strategy-change notification (for tests and the demo loop).
    pub fn publish_strategy(&self, snapshot: StrategySnapshot) {
        let _ = self.strategy_tx.send(snapshot);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControllerState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BackpressureHandle for InMemoryController {
    fn update_config(&self, overrides: BackpressureOverrides) -> ControlFuture<()> {
        let this = self.clone();
        Box::pin(async move {
            let degradation = {
                let mut state = this.lock();
                state.config.apply(&overrides);
                state.config.degradation
            };
            this.publish_strategy(StrategySnapshot {
                degradation,
                budget_consumption: 0.0,
            });
            Ok(())
        })
    }

    fn get_config(&self) -> ControlFuture<BackpressureConfig> {
        let config = self.lock().config.clone();
        Box::pin(async move { Ok(config) })
    }

    fn open_circuit_breaker(&self, subject: &str) -> ControlFuture<()> {
        let this = self.clone();
        let subject = subject.to_string();
        Box::pin(async move {
            this.lock().open_breakers.insert(subject);
            Ok(())
        })
    }

    fn close_circuit_breaker(&self, subject: &str) -> ControlFuture<()> {
        let this = self.clone();
        let subject = subject.to_string();
        Box::pin(async move {
            this.lock().open_breakers.remove(&subject);
            Ok(())
        })
    }
}

impl StrategyHandle for InMemoryController {
    fn current_strategy(&self) -> StrategySnapshot {
        self.strategy_tx.borrow().clone()
    }

    fn subscribe_changes(&self) -> watch::Receiver<StrategySnapshot> {
        self.strategy_tx.subscribe()
    }
}
