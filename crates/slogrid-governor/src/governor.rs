//! The governor context — owned lifecycle around the control loop.
//!
//! Constructed once, started with `start()`, and stopped with `stop()`,
//! which lets the in-flight tick finish before the loop halts. Rule and
//! threshold mutations requested from outside are queued on a command
//! channel and applied atomically at the next tick boundary, so the rule
//! set never changes mid-evaluation.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use slogrid_coupling::{
    BackpressureHandle, CouplingController, CouplingError, EventBus, GovernorEvent, StrategyHandle,
};
use slogrid_slo::{AdaptiveThresholdManager, MetricBackend, SloEvaluator, SloRegistry};
use slogrid_types::{
    ActionRecord, AdaptiveThreshold, CouplingMetrics, CouplingRule, EvaluationOutcome, RuleId,
    SloName, ValidationError,
};

/// How many recent action records the published status carries.
const STATUS_HISTORY_LIMIT: usize = 100;

/// Errors from governor operations.
#[derive(Debug, Error)]
pub enum GovernorError {
    #[error("governor is not running")]
    NotRunning,

    #[error("governor already started")]
    AlreadyStarted,

    #[error(transparent)]
    Coupling(#[from] CouplingError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Tunables for the control loop.
#[derive(Debug, Clone)]
pub struct GovernorSettings {
    /// Time between evaluation ticks.
    pub tick_interval: Duration,
    /// Bound on each per-objective metric query.
    pub query_timeout: Duration,
    /// Base rule cooldown before priority/effectiveness scaling.
    pub base_cooldown: Duration,
    /// Action history retention cap.
    pub history_cap: usize,
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            query_timeout: Duration::from_secs(5),
            base_cooldown: Duration::from_secs(300),
            history_cap: 1000,
        }
    }
}

/// Read-only snapshot of governor state, republished after every tick.
#[derive(Debug, Clone, Default)]
pub struct GovernorStatus {
    pub running: bool,
    /// Completed ticks since start.
    pub ticks: u64,
    pub last_outcome: Option<EvaluationOutcome>,
    pub coupling: CouplingMetrics,
    pub rules: Vec<CouplingRule>,
    pub active_thresholds: Vec<AdaptiveThreshold>,
    /// Most recent action records, newest first.
    pub recent_actions: Vec<ActionRecord>,
}

/// Mutations queued for the next tick boundary.
enum Command {
    AddRule(CouplingRule, oneshot::Sender<Result<(), GovernorError>>),
    RemoveRule(RuleId, oneshot::Sender<Result<(), GovernorError>>),
    SetRuleEnabled(RuleId, bool, oneshot::Sender<Result<(), GovernorError>>),
    ApproveRevert(RuleId, oneshot::Sender<Result<(), GovernorError>>),
    CreateThreshold {
        objective: SloName,
        adjustment_factor: f64,
        reason: String,
        validity_secs: u64,
        reply: oneshot::Sender<Result<AdaptiveThreshold, GovernorError>>,
    },
}

/// Everything the tick owns; moved into the loop task on `start()`.
struct Core {
    registry: Arc<SloRegistry>,
    evaluator: SloEvaluator,
    thresholds: AdaptiveThresholdManager,
    controller: CouplingController,
    strategy: Arc<dyn StrategyHandle>,
    events: EventBus,
    ticks: u64,
}

impl Core {
    /// Apply queued commands. Runs only between evaluations.
    fn apply_pending(&mut self, cmd_rx: &mut mpsc::UnboundedReceiver<Command>, now: u64) {
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                Command::AddRule(rule, reply) => {
                    let result = self.controller.add_rule(rule).map_err(Into::into);
                    let _ = reply.send(result);
                }
                Command::RemoveRule(rule_id, reply) => {
                    let result = self
                        .controller
                        .remove_rule(&rule_id)
                        .map(|_| ())
                        .map_err(Into::into);
                    let _ = reply.send(result);
                }
                Command::SetRuleEnabled(rule_id, enabled, reply) => {
                    let result = self
                        .controller
                        .set_rule_enabled(&rule_id, enabled)
                        .map_err(Into::into);
                    let _ = reply.send(result);
                }
                Command::ApproveRevert(rule_id, reply) => {
                    let result = self
                        .controller
                        .approve_revert(&rule_id)
                        .map_err(Into::into);
                    let _ = reply.send(result);
                }
                Command::CreateThreshold {
                    objective,
                    adjustment_factor,
                    reason,
                    validity_secs,
                    reply,
                } => {
                    let result = match self.registry.get(&objective) {
                        Some(slo) => {
                            let created = self
                                .thresholds
                                .create_override(slo, adjustment_factor, &reason, validity_secs, now)
                                .map_err(GovernorError::from);
                            if created.is_ok() {
                                self.events.emit(GovernorEvent::ThresholdCreated {
                                    objective: objective.clone(),
                                });
                            }
                            created
                        }
                        None => {
                            Err(ValidationError::UnknownObjective(objective.clone()).into())
                        }
                    };
                    let _ = reply.send(result);
                }
            }
        }
    }

    /// One evaluation pass: measure, trigger, revert.
    async fn tick(&mut self, now: u64) -> GovernorStatus {
        let outcome = self.evaluator.evaluate_all(&self.thresholds, now).await;

        for objective in &outcome.query_failures {
            self.events.emit(GovernorEvent::EvaluationError {
                message: format!("metric query failed for {objective}, assumed degraded"),
            });
        }

        let triggered = self.controller.evaluate(&outcome, now).await;
        let reverted = self.controller.check_reverts(&outcome, now).await;
        self.ticks += 1;

        debug!(
            tick = self.ticks,
            health = outcome.health_score,
            violations = outcome.violations.len(),
            triggered = triggered.len(),
            reverted = reverted.len(),
            degradation = ?self.strategy.current_strategy().degradation,
            "tick complete"
        );

        GovernorStatus {
            running: true,
            ticks: self.ticks,
            last_outcome: Some(outcome),
            coupling: self.controller.coupling_metrics(),
            rules: self.controller.list_rules(),
            active_thresholds: self.thresholds.active_overrides(now),
            recent_actions: self.controller.action_history(STATUS_HISTORY_LIMIT),
        }
    }
}

/// The governor: one periodic loop driving evaluation and coupling.
pub struct Governor {
    cmd_tx: mpsc::UnboundedSender<Command>,
    cmd_rx: Option<mpsc::UnboundedReceiver<Command>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: Option<watch::Receiver<bool>>,
    status: Arc<RwLock<GovernorStatus>>,
    events: EventBus,
    core: Option<Core>,
    handle: Option<JoinHandle<()>>,
    tick_interval: Duration,
}

impl Governor {
    pub fn new(
        registry: Arc<SloRegistry>,
        backend: Arc<dyn MetricBackend>,
        backpressure: Arc<dyn BackpressureHandle>,
        strategy: Arc<dyn StrategyHandle>,
        settings: GovernorSettings,
    ) -> Self {
        let events = EventBus::default();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let core = Core {
            registry: registry.clone(),
            evaluator: SloEvaluator::new(registry, backend, settings.query_timeout),
            thresholds: AdaptiveThresholdManager::new(),
            controller: CouplingController::new(
                backpressure,
                events.clone(),
                settings.base_cooldown,
                settings.history_cap,
            ),
            strategy,
            events: events.clone(),
            ticks: 0,
        };

        Self {
            cmd_tx,
            cmd_rx: Some(cmd_rx),
            shutdown_tx,
            shutdown_rx: Some(shutdown_rx),
            status: Arc::new(RwLock::new(GovernorStatus::default())),
            events,
            core: Some(core),
            handle: None,
            tick_interval: settings.tick_interval,
        }
    }

    /// Start the control loop. Idempotent: a second call is a no-op.
    pub fn start(&mut self) {
        let (Some(mut core), Some(mut cmd_rx), Some(mut shutdown_rx)) =
            (self.core.take(), self.cmd_rx.take(), self.shutdown_rx.take())
        else {
            return;
        };

        let status = self.status.clone();
        let interval = self.tick_interval;
        let events = self.events.clone();

        info!(interval_secs = interval.as_secs(), "governor starting");
        events.emit(GovernorEvent::MonitoringStarted);

        let handle = tokio::spawn(async move {
            let mut strategy_rx = core.strategy.subscribe_changes();
            let mut strategy_alive = true;

            // Initial evaluation so state is populated before the first
            // full interval elapses.
            run_tick(&mut core, &mut cmd_rx, &status).await;

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        run_tick(&mut core, &mut cmd_rx, &status).await;
                    }
                    changed = strategy_rx.changed(), if strategy_alive => {
                        match changed {
                            Ok(()) => {
                                // Out-of-cycle re-evaluation on strategy change.
                                debug!("strategy changed, re-evaluating");
                                run_tick(&mut core, &mut cmd_rx, &status).await;
                            }
                            Err(_) => strategy_alive = false,
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                }
            }

            status.write().await.running = false;
            events.emit(GovernorEvent::MonitoringStopped);
            info!("governor stopped");
        });

        self.handle = Some(handle);
    }

    /// Signal shutdown and wait for the in-flight tick to finish.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            error!(error = %e, "governor loop panicked");
        }
    }

    /// Latest published status snapshot.
    pub async fn status(&self) -> GovernorStatus {
        self.status.read().await.clone()
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<GovernorEvent> {
        self.events.subscribe()
    }

    /// Register a rule before the loop starts. After `start()`, use
    /// [`Governor::add_rule`], which queues the change for the next tick
    /// boundary.
    pub fn register_rule(&mut self, rule: CouplingRule) -> Result<(), GovernorError> {
        let core = self.core.as_mut().ok_or(GovernorError::AlreadyStarted)?;
        core.controller.add_rule(rule).map_err(Into::into)
    }

    /// Register a rule; applied at the next tick boundary.
    pub async fn add_rule(&self, rule: CouplingRule) -> Result<(), GovernorError> {
        self.command(|reply| Command::AddRule(rule, reply)).await
    }

    pub async fn remove_rule(&self, rule_id: &str) -> Result<(), GovernorError> {
        self.command(|reply| Command::RemoveRule(rule_id.to_string(), reply))
            .await
    }

    pub async fn set_rule_enabled(&self, rule_id: &str, enabled: bool) -> Result<(), GovernorError> {
        self.command(|reply| Command::SetRuleEnabled(rule_id.to_string(), enabled, reply))
            .await
    }

    /// Record an operator approval for a revert that requires one.
    pub async fn approve_revert(&self, rule_id: &str) -> Result<(), GovernorError> {
        self.command(|reply| Command::ApproveRevert(rule_id.to_string(), reply))
            .await
    }

    /// Create a time-bounded override of an objective's effective target.
    pub async fn create_adaptive_threshold(
        &self,
        objective: &str,
        adjustment_factor: f64,
        reason: &str,
        validity_secs: u64,
    ) -> Result<AdaptiveThreshold, GovernorError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::CreateThreshold {
                objective: objective.to_string(),
                adjustment_factor,
                reason: reason.to_string(),
                validity_secs,
                reply,
            })
            .map_err(|_| GovernorError::NotRunning)?;
        rx.await.map_err(|_| GovernorError::NotRunning)?
    }

    async fn command(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<(), GovernorError>>) -> Command,
    ) -> Result<(), GovernorError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(reply))
            .map_err(|_| GovernorError::NotRunning)?;
        rx.await.map_err(|_| GovernorError::NotRunning)?
    }
}

/// Apply queued mutations, run one tick, publish the snapshot.
async fn run_tick(
    core: &mut Core,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    status: &Arc<RwLock<GovernorStatus>>,
) {
    let now = epoch_secs();
    core.apply_pending(cmd_rx, now);
    let snapshot = core.tick(now).await;
    *status.write().await = snapshot;
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
