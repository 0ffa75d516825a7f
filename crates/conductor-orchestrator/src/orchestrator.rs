//! Orchestrator implementation.

use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use conductor_core::{emit, AgentId, Dispatcher, EventSink, ResultEnvelope, ResultStatus, Task};

use crate::{
    config::{FailurePolicy, OrchestratorConfig},
    error::WorkflowParseError,
    events::WorkflowEvent,
    report::{RunOutcome, SkipReason, StepOutcome, StepReport, StepState, WorkflowRunReport},
    workflow::WorkflowDefinition,
};

/// Why the orchestrator stopped issuing steps.
#[derive(Debug, Clone, Copy)]
enum Stop {
    Halted(usize),
    Cancelled,
}

/// Executes workflows through a [`Dispatcher`].
///
/// The orchestrator never looks at agents or transports directly; anything
/// that implements [`Dispatcher`] can sit underneath it.
pub struct Orchestrator<D: Dispatcher> {
    dispatcher: D,
    config: OrchestratorConfig,
    events: Option<EventSink<WorkflowEvent>>,
}

impl<D: Dispatcher> Orchestrator<D> {
    /// Create an orchestrator with the default configuration: sequential,
    /// fail-open, no retries.
    #[must_use]
    pub fn new(dispatcher: D) -> Self {
        Self {
            dispatcher,
            config: OrchestratorConfig::default(),
            events: None,
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach an event sink.
    #[must_use]
    pub fn with_events(mut self, events: EventSink<WorkflowEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The dispatcher steps are routed through.
    #[must_use]
    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Load a workflow file and run it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed; nothing is
    /// dispatched in that case.
    pub async fn run_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<WorkflowRunReport, WorkflowParseError> {
        let definition = WorkflowDefinition::load(path)?;
        Ok(self.run_workflow(&definition).await)
    }

    /// Run a workflow to completion.
    pub async fn run_workflow(&self, definition: &WorkflowDefinition) -> WorkflowRunReport {
        self.run_workflow_with_cancel(definition, CancellationToken::new())
            .await
    }

    /// Run a workflow until it completes or `cancel` fires.
    ///
    /// Cancellation stops new steps from being issued. Steps already
    /// dispatched finish or time out, and every step not yet issued is
    /// recorded as skipped.
    #[instrument(skip(self, definition, cancel), fields(workflow = %definition.name))]
    pub async fn run_workflow_with_cancel(
        &self,
        definition: &WorkflowDefinition,
        cancel: CancellationToken,
    ) -> WorkflowRunReport {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let total = definition.steps.len();

        info!(%run_id, steps = total, mode = ?self.config.execution, "Starting workflow");
        emit(
            &self.events,
            WorkflowEvent::RunStarted {
                run_id,
                workflow_name: definition.name.clone(),
                steps: total,
            },
        );

        if total == 0 {
            warn!(%run_id, "Workflow has no steps");
            return self.finish(run_id, definition, started_at, start, RunOutcome::Empty, Vec::new());
        }

        let labels = definition.labels();
        let dependencies = definition.dependency_indices();
        let limit = self.config.execution.max_in_flight();

        let mut states = vec![StepState::Pending; total];
        let mut outcomes: Vec<Option<StepOutcome>> = vec![None; total];
        let mut in_flight = FuturesUnordered::new();
        let mut stop: Option<Stop> = None;

        loop {
            if stop.is_none() && cancel.is_cancelled() {
                stop = Some(Stop::Cancelled);
            }

            while stop.is_none() && in_flight.len() < limit {
                let Some(index) = next_ready(&states, &dependencies) else {
                    break;
                };
                let label = labels[index].as_str();

                match definition.steps[index].prepare() {
                    Ok((agent, task)) => {
                        states[index] = StepState::Dispatched;
                        in_flight.push(self.run_step(index, label, agent, task, &cancel));
                    }
                    Err(reason) => {
                        warn!(step = %label, %reason, "Skipping malformed step");
                        states[index] = StepState::Skipped;
                        self.record_skip(index, label, reason);
                        outcomes[index] = Some(StepOutcome::Skipped { reason });
                    }
                }
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                () = cancel.cancelled(), if stop.is_none() => {
                    info!(in_flight = in_flight.len(), "Cancellation requested, draining in-flight steps");
                    stop = Some(Stop::Cancelled);
                }
                Some((index, attempts)) = in_flight.next() => {
                    let outcome = StepOutcome::Attempted { attempts };
                    let state = outcome.state();
                    states[index] = state;

                    if state == StepState::Failure
                        && self.config.failure_policy == FailurePolicy::HaltOnFirstFailure
                        && stop.is_none()
                    {
                        warn!(step = %labels[index], "Halting after failed step");
                        stop = Some(Stop::Halted(index));
                    }
                    outcomes[index] = Some(outcome);
                }
            }
        }

        let leftover_reason = match stop {
            Some(Stop::Halted(_)) => SkipReason::HaltedAfterFailure,
            _ => SkipReason::Cancelled,
        };
        let mut first_unissued = None;
        let mut entries = Vec::with_capacity(total);

        for (index, (step, outcome)) in definition.steps.iter().zip(outcomes).enumerate() {
            let outcome = match outcome {
                Some(outcome) => outcome,
                None => {
                    first_unissued.get_or_insert(index);
                    self.record_skip(index, &labels[index], leftover_reason);
                    StepOutcome::Skipped {
                        reason: leftover_reason,
                    }
                }
            };
            entries.push(StepReport {
                index,
                label: labels[index].clone(),
                step: step.clone(),
                outcome,
            });
        }

        let outcome = match (stop, first_unissued) {
            (_, None) => RunOutcome::Completed,
            (Some(Stop::Halted(at_step)), Some(_)) => RunOutcome::Halted { at_step },
            (_, Some(at_step)) => RunOutcome::Cancelled { at_step },
        };

        self.finish(run_id, definition, started_at, start, outcome, entries)
    }

    /// Dispatch one step, retrying failures as configured.
    async fn run_step(
        &self,
        index: usize,
        label: &str,
        agent: AgentId,
        task: Task,
        cancel: &CancellationToken,
    ) -> (usize, Vec<ResultEnvelope>) {
        let retry = self.config.retry;
        let max_attempts = retry.attempts();
        let mut attempts = Vec::new();
        let mut made = 0;
        let mut status = ResultStatus::Failure;

        while made < max_attempts {
            if made > 0 && cancel.is_cancelled() {
                break;
            }
            made += 1;
            debug!(step = %label, agent = %agent, attempt = made, "Dispatching step");
            emit(
                &self.events,
                WorkflowEvent::StepDispatched {
                    index,
                    label: label.to_string(),
                    agent: agent.clone(),
                    attempt: made,
                },
            );

            let envelope = self.dispatcher.route_task(task.clone(), &agent).await;
            status = envelope.status();
            if let Some(error) = envelope.error() {
                warn!(step = %label, agent = %agent, attempt = made, error = %error, "Step failed");
            }
            attempts.push(envelope);

            if status == ResultStatus::Success || made == max_attempts || cancel.is_cancelled() {
                break;
            }

            debug!(step = %label, backoff_ms = retry.backoff_ms, "Retrying step");
            if !retry.backoff().is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!(step = %label, "Cancelled during backoff, not retrying");
                        break;
                    }
                    () = tokio::time::sleep(retry.backoff()) => {}
                }
            }
        }

        info!(step = %label, status = ?status, attempts = made, "Step finished");
        emit(
            &self.events,
            WorkflowEvent::StepCompleted {
                index,
                label: label.to_string(),
                status,
                attempts: made,
            },
        );

        (index, attempts)
    }

    fn record_skip(&self, index: usize, label: &str, reason: SkipReason) {
        debug!(step = %label, %reason, "Step skipped");
        emit(
            &self.events,
            WorkflowEvent::StepSkipped {
                index,
                label: label.to_string(),
                reason,
            },
        );
    }

    fn finish(
        &self,
        run_id: Uuid,
        definition: &WorkflowDefinition,
        started_at: DateTime<Utc>,
        start: Instant,
        outcome: RunOutcome,
        entries: Vec<StepReport>,
    ) -> WorkflowRunReport {
        let total_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let report = WorkflowRunReport {
            run_id,
            workflow_name: definition.name.clone(),
            started_at,
            total_time_ms,
            outcome,
            entries,
        };

        info!(
            %run_id,
            outcome = ?report.outcome,
            succeeded = report.count(StepState::Success),
            failed = report.count(StepState::Failure),
            skipped = report.count(StepState::Skipped),
            duration_ms = total_time_ms,
            "Workflow completed"
        );
        emit(
            &self.events,
            WorkflowEvent::RunFinished {
                run_id,
                outcome,
                total_time_ms,
            },
        );

        report
    }
}

/// First pending step whose dependencies have all finished.
fn next_ready(states: &[StepState], dependencies: &[Vec<usize>]) -> Option<usize> {
    states.iter().enumerate().find_map(|(index, state)| {
        let ready = *state == StepState::Pending
            && dependencies[index]
                .iter()
                .all(|&dep| states[dep].is_terminal());
        ready.then_some(index)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionMode, RetryPolicy};
    use crate::workflow::StepDefinition;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Dispatcher with scripted behaviour per destination:
    /// `bad` always fails, `flaky` fails `flaky_failures` times, `stopper`
    /// cancels the run token, everything else echoes the task. A
    /// `delay_ms` task field delays the reply.
    #[derive(Default)]
    struct ScriptedDispatcher {
        calls: Mutex<Vec<String>>,
        flaky_failures: AtomicU32,
        running: AtomicUsize,
        peak: AtomicUsize,
        stop_token: Option<CancellationToken>,
    }

    impl ScriptedDispatcher {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Dispatcher for ScriptedDispatcher {
        async fn route_task(&self, task: Task, destination: &AgentId) -> ResultEnvelope {
            self.calls.lock().unwrap().push(destination.to_string());
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);

            if let Some(ms) = task.get("delay_ms").and_then(|v| v.as_u64()) {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            match destination.as_str() {
                "bad" => ResultEnvelope::failure(destination.clone(), "boom"),
                "flaky"
                    if self
                        .flaky_failures
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                        .is_ok() =>
                {
                    ResultEnvelope::failure(destination.clone(), "transient")
                }
                "stopper" => {
                    if let Some(ref token) = self.stop_token {
                        token.cancel();
                    }
                    ResultEnvelope::success(destination.clone(), "stopped")
                }
                _ => ResultEnvelope::success(destination.clone(), task.into_value()),
            }
        }
    }

    fn step(agent: &str) -> StepDefinition {
        StepDefinition::new(agent, Task::new())
    }

    fn delayed(agent: &str, ms: u64) -> StepDefinition {
        StepDefinition::new(agent, Task::new().with("delay_ms", ms)).named(agent)
    }

    fn workflow(steps: Vec<StepDefinition>) -> WorkflowDefinition {
        steps
            .into_iter()
            .fold(WorkflowDefinition::new("test"), WorkflowDefinition::with_step)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_sequential_runs_in_definition_order() {
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let orchestrator = Orchestrator::new(dispatcher.clone());

        let report = orchestrator
            .run_workflow(&workflow(vec![step("a"), step("b"), step("c")]))
            .await;

        assert_eq!(dispatcher.calls(), vec!["a", "b", "c"]);
        assert_eq!(report.len(), 3);
        assert_eq!(report.outcome, RunOutcome::Completed);
        for (index, entry) in report.entries.iter().enumerate() {
            assert_eq!(entry.index, index);
            assert_eq!(entry.state(), StepState::Success);
        }
        assert_eq!(report.entries[1].label, "Unnamed Step 2");
    }

    #[tokio::test]
    async fn test_malformed_steps_are_skipped_without_dispatch() {
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let orchestrator = Orchestrator::new(dispatcher.clone());

        let no_agent = StepDefinition {
            task: Some(json!({})),
            ..StepDefinition::default()
        };
        let list_task = StepDefinition {
            agent: Some(AgentId::new("b")),
            task: Some(json!([1, 2])),
            ..StepDefinition::default()
        };
        let report = orchestrator
            .run_workflow(&workflow(vec![
                step("a"),
                no_agent,
                list_task,
                step(""),
                step("c"),
            ]))
            .await;

        assert_eq!(dispatcher.calls(), vec!["a", "c"]);
        assert_eq!(report.len(), 5);
        let reasons: Vec<_> = report
            .entries
            .iter()
            .map(|e| e.outcome.skip_reason())
            .collect();
        assert_eq!(
            reasons,
            vec![
                None,
                Some(SkipReason::MissingAgentOrTask),
                Some(SkipReason::TaskNotMapping),
                Some(SkipReason::MissingAgentOrTask),
                None,
            ]
        );
        assert_eq!(report.outcome, RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_run_by_default() {
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let orchestrator = Orchestrator::new(dispatcher.clone());

        let report = orchestrator
            .run_workflow(&workflow(vec![step("bad"), step("a")]))
            .await;

        assert_eq!(dispatcher.calls(), vec!["bad", "a"]);
        assert_eq!(report.entries[0].state(), StepState::Failure);
        assert_eq!(report.entries[1].state(), StepState::Success);
        assert_eq!(
            report.entries[0].outcome.envelope().unwrap().error(),
            Some("boom")
        );
    }

    #[tokio::test]
    async fn test_halt_on_first_failure() {
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let orchestrator = Orchestrator::new(dispatcher.clone()).with_config(
            OrchestratorConfig::default().with_failure_policy(FailurePolicy::HaltOnFirstFailure),
        );

        let report = orchestrator
            .run_workflow(&workflow(vec![step("a"), step("bad"), step("c"), step("d")]))
            .await;

        assert_eq!(dispatcher.calls(), vec!["a", "bad"]);
        assert_eq!(report.len(), 4);
        assert_eq!(report.outcome, RunOutcome::Halted { at_step: 1 });
        assert_eq!(
            report.entries[2].outcome.skip_reason(),
            Some(SkipReason::HaltedAfterFailure)
        );
        assert_eq!(
            report.entries[3].outcome.skip_reason(),
            Some(SkipReason::HaltedAfterFailure)
        );
    }

    #[tokio::test]
    async fn test_halt_on_last_step_completes() {
        let orchestrator = Orchestrator::new(ScriptedDispatcher::default()).with_config(
            OrchestratorConfig::default().with_failure_policy(FailurePolicy::HaltOnFirstFailure),
        );

        let report = orchestrator
            .run_workflow(&workflow(vec![step("a"), step("bad")]))
            .await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn test_retry_records_every_attempt() {
        let dispatcher = Arc::new(ScriptedDispatcher {
            flaky_failures: AtomicU32::new(2),
            ..ScriptedDispatcher::default()
        });
        let orchestrator = Orchestrator::new(dispatcher.clone())
            .with_config(OrchestratorConfig::default().with_retry(RetryPolicy::new(3)));

        let report = orchestrator
            .run_workflow(&workflow(vec![step("flaky"), step("a")]))
            .await;

        assert_eq!(dispatcher.calls(), vec!["flaky", "flaky", "flaky", "a"]);
        let attempts = report.entries[0].outcome.attempts();
        assert_eq!(attempts.len(), 3);
        assert!(attempts[0].is_failure());
        assert!(attempts[1].is_failure());
        assert!(attempts[2].is_success());
        assert_eq!(report.entries[0].state(), StepState::Success);
        assert_eq!(report.entries[1].outcome.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted_with_backoff() {
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let orchestrator = Orchestrator::new(dispatcher.clone()).with_config(
            OrchestratorConfig::default().with_retry(RetryPolicy::new(2).with_backoff(100)),
        );

        let report = orchestrator.run_workflow(&workflow(vec![step("bad")])).await;

        assert_eq!(dispatcher.calls().len(), 2);
        assert_eq!(report.entries[0].outcome.attempts().len(), 2);
        assert_eq!(report.entries[0].state(), StepState::Failure);
    }

    #[tokio::test]
    async fn test_empty_workflow() {
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let orchestrator = Orchestrator::new(dispatcher.clone());

        let report = orchestrator.run_workflow(&WorkflowDefinition::default()).await;

        assert!(report.is_empty());
        assert_eq!(report.outcome, RunOutcome::Empty);
        assert!(dispatcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let orchestrator = Orchestrator::new(dispatcher.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = orchestrator
            .run_workflow_with_cancel(&workflow(vec![step("a"), step("b")]), cancel)
            .await;

        assert!(dispatcher.calls().is_empty());
        assert_eq!(report.outcome, RunOutcome::Cancelled { at_step: 0 });
        assert_eq!(report.count(StepState::Skipped), 2);
    }

    #[tokio::test]
    async fn test_cancel_lets_in_flight_step_finish() {
        let cancel = CancellationToken::new();
        let dispatcher = Arc::new(ScriptedDispatcher {
            stop_token: Some(cancel.clone()),
            ..ScriptedDispatcher::default()
        });
        let orchestrator = Orchestrator::new(dispatcher.clone());

        let report = orchestrator
            .run_workflow_with_cancel(
                &workflow(vec![step("a"), step("stopper"), step("c")]),
                cancel,
            )
            .await;

        assert_eq!(dispatcher.calls(), vec!["a", "stopper"]);
        assert_eq!(report.entries[1].state(), StepState::Success);
        assert_eq!(
            report.entries[2].outcome.skip_reason(),
            Some(SkipReason::Cancelled)
        );
        assert_eq!(report.outcome, RunOutcome::Cancelled { at_step: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retries() {
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let orchestrator = Orchestrator::new(dispatcher.clone()).with_config(
            OrchestratorConfig::default().with_retry(RetryPolicy::new(5).with_backoff(1_000)),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let report = orchestrator
            .run_workflow_with_cancel(&workflow(vec![step("bad"), step("a")]), cancel)
            .await;

        assert_eq!(dispatcher.calls(), vec!["bad"]);
        assert_eq!(report.entries[0].outcome.attempts().len(), 1);
        assert_eq!(report.entries[0].state(), StepState::Failure);
        assert_eq!(
            report.entries[1].outcome.skip_reason(),
            Some(SkipReason::Cancelled)
        );
        assert_eq!(report.outcome, RunOutcome::Cancelled { at_step: 1 });
        assert!(started.elapsed() < Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_no_retry_once_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let orchestrator = Orchestrator::new(dispatcher.clone())
            .with_config(OrchestratorConfig::default().with_retry(RetryPolicy::new(3)));

        let (index, attempts) = orchestrator
            .run_step(0, "bad", AgentId::new("bad"), Task::new(), &cancel)
            .await;

        assert_eq!(index, 0);
        assert_eq!(attempts.len(), 1);
        assert_eq!(dispatcher.calls(), vec!["bad"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_halt_records_in_flight_steps() {
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let orchestrator = Orchestrator::new(dispatcher.clone()).with_config(
            OrchestratorConfig::default()
                .with_failure_policy(FailurePolicy::HaltOnFirstFailure)
                .with_execution(ExecutionMode::Concurrent { max_parallel: 2 }),
        );

        let report = orchestrator
            .run_workflow(&workflow(vec![
                delayed("bad", 10),
                delayed("slow", 50),
                step("c"),
                step("d"),
            ]))
            .await;

        let mut calls = dispatcher.calls();
        calls.sort();
        assert_eq!(calls, vec!["bad", "slow"]);
        assert_eq!(report.entries[0].state(), StepState::Failure);
        assert_eq!(report.entries[1].state(), StepState::Success);
        assert_eq!(
            report.entries[1].outcome.envelope().unwrap().result(),
            Some(&json!({"delay_ms": 50}))
        );
        for entry in &report.entries[2..] {
            assert_eq!(
                entry.outcome.skip_reason(),
                Some(SkipReason::HaltedAfterFailure)
            );
        }
        assert_eq!(report.outcome, RunOutcome::Halted { at_step: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_cancel_drains_in_flight_steps() {
        let cancel = CancellationToken::new();
        let dispatcher = Arc::new(ScriptedDispatcher {
            stop_token: Some(cancel.clone()),
            ..ScriptedDispatcher::default()
        });
        let orchestrator = Orchestrator::new(dispatcher.clone()).with_config(
            OrchestratorConfig::default()
                .with_execution(ExecutionMode::Concurrent { max_parallel: 2 }),
        );

        let report = orchestrator
            .run_workflow_with_cancel(
                &workflow(vec![
                    delayed("slow", 50),
                    step("stopper"),
                    step("c"),
                    step("d"),
                ]),
                cancel,
            )
            .await;

        let mut calls = dispatcher.calls();
        calls.sort();
        assert_eq!(calls, vec!["slow", "stopper"]);
        assert_eq!(report.entries[0].state(), StepState::Success);
        assert_eq!(report.entries[1].state(), StepState::Success);
        for entry in &report.entries[2..] {
            assert_eq!(entry.outcome.skip_reason(), Some(SkipReason::Cancelled));
        }
        assert_eq!(report.outcome, RunOutcome::Cancelled { at_step: 2 });
    }

    #[tokio::test]
    async fn test_dependent_of_failed_step_runs_when_fail_open() {
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let orchestrator = Orchestrator::new(dispatcher.clone());

        let report = orchestrator
            .run_workflow(&workflow(vec![
                step("bad").named("fetch"),
                step("a").after("fetch"),
            ]))
            .await;

        assert_eq!(dispatcher.calls(), vec!["bad", "a"]);
        assert_eq!(report.entries[0].state(), StepState::Failure);
        assert_eq!(report.entries[1].state(), StepState::Success);
        assert_eq!(report.outcome, RunOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_report_keeps_definition_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator::new(ScriptedDispatcher::default())
            .with_config(
                OrchestratorConfig::default()
                    .with_execution(ExecutionMode::Concurrent { max_parallel: 4 }),
            )
            .with_events(tx);

        let report = orchestrator
            .run_workflow(&workflow(vec![delayed("slow", 50), delayed("fast", 10)]))
            .await;

        let labels: Vec<_> = report.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["slow", "fast"]);

        let completed: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                WorkflowEvent::StepCompleted { label, .. } => Some(label),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec!["fast", "slow"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waits_for_dependencies() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator::new(ScriptedDispatcher::default())
            .with_config(
                OrchestratorConfig::default()
                    .with_execution(ExecutionMode::Concurrent { max_parallel: 4 }),
            )
            .with_events(tx);

        let report = orchestrator
            .run_workflow(&workflow(vec![
                delayed("first", 50),
                delayed("other", 10),
                delayed("after", 10).after("first"),
            ]))
            .await;
        assert_eq!(report.count(StepState::Success), 3);

        let events = drain(&mut rx);
        let position = |wanted: &WorkflowEvent| events.iter().position(|e| e == wanted).unwrap();
        let first_done = position(&WorkflowEvent::StepCompleted {
            index: 0,
            label: "first".into(),
            status: ResultStatus::Success,
            attempts: 1,
        });
        let after_sent = position(&WorkflowEvent::StepDispatched {
            index: 2,
            label: "after".into(),
            agent: AgentId::new("after"),
            attempt: 1,
        });
        assert!(first_done < after_sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_parallelism_is_bounded() {
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let orchestrator = Orchestrator::new(dispatcher.clone()).with_config(
            OrchestratorConfig::default()
                .with_execution(ExecutionMode::Concurrent { max_parallel: 2 }),
        );

        let steps = (0..5).map(|i| delayed(&format!("s{i}"), 10)).collect();
        let report = orchestrator.run_workflow(&workflow(steps)).await;

        assert_eq!(report.len(), 5);
        assert_eq!(dispatcher.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_event_sequence() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator::new(ScriptedDispatcher::default()).with_events(tx);

        let no_task = StepDefinition {
            agent: Some(AgentId::new("a")),
            ..StepDefinition::default()
        };
        orchestrator
            .run_workflow(&workflow(vec![step("a"), no_task]))
            .await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], WorkflowEvent::RunStarted { steps: 2, .. }));
        assert!(matches!(events[1], WorkflowEvent::StepDispatched { index: 0, attempt: 1, .. }));
        assert!(matches!(events[2], WorkflowEvent::StepCompleted { index: 0, .. }));
        assert!(matches!(
            events[3],
            WorkflowEvent::StepSkipped {
                index: 1,
                reason: SkipReason::MissingAgentOrTask,
                ..
            }
        ));
        assert!(matches!(
            events[4],
            WorkflowEvent::RunFinished {
                outcome: RunOutcome::Completed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_run_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.yaml");
        std::fs::write(
            &path,
            "workflow_name: File\nsteps:\n  - agent: a\n    task: { msg: hi }\n",
        )
        .unwrap();

        let orchestrator = Orchestrator::new(ScriptedDispatcher::default());
        let report = orchestrator.run_file(&path).await.unwrap();
        assert_eq!(report.workflow_name, "File");
        assert_eq!(
            report.entries[0].outcome.envelope().unwrap().result(),
            Some(&json!({"msg": "hi"}))
        );

        assert!(matches!(
            orchestrator.run_file(dir.path().join("missing.yaml")).await,
            Err(WorkflowParseError::Io { .. })
        ));
    }
}
