// src/state/machine.rs

//! The task state machine: the event log, the current stage and its rule
//! set, behind a single mutex.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::events::{Step, TaskEvent};
use crate::state::rules::RuleSet;
use crate::state::Stage;
use crate::task::ContainerGraph;
use crate::types::BehaviourAfterFailure;

/// Why the machine moved from Running to CleaningUp. Only failures are
/// eligible for the `DoNotCleanup` behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransitionReason {
    MainContainerExited,
    Failure,
    Interrupted,
    /// No rule can fire and no step is in flight, so no event can ever
    /// arrive to enable one.
    Stalled,
}

#[derive(Debug)]
struct Inner {
    events: Vec<TaskEvent>,
    stage: Stage,
    rules: RuleSet,
    emitted: HashSet<Step>,
    cleanup_skipped: bool,
}

/// Holds the append-only event log and the current stage, and answers
/// `pop_next_step` / `post_event` / `is_finished`.
///
/// All mutation goes through one mutex; rule evaluation happens under the
/// lock but is cheap (pure predicates over a small log). Rules never call
/// back into `post_event`.
#[derive(Debug)]
pub struct TaskStateMachine {
    graph: Arc<ContainerGraph>,
    behaviour_after_failure: BehaviourAfterFailure,
    inner: Mutex<Inner>,
}

impl TaskStateMachine {
    /// A machine at the start of the Running stage: image preparation and
    /// network creation are immediately enabled.
    pub fn new(graph: Arc<ContainerGraph>, behaviour_after_failure: BehaviourAfterFailure) -> Self {
        let rules = RuleSet::for_run_stage(&graph);

        Self {
            graph,
            behaviour_after_failure,
            inner: Mutex::new(Inner {
                events: Vec::new(),
                stage: Stage::Running,
                rules,
                emitted: HashSet::new(),
                cleanup_skipped: false,
            }),
        }
    }

    /// A machine for a task that failed before any step could run: it begins
    /// directly in CleaningUp with the failure already logged and nothing to
    /// tear down.
    pub fn for_fatal_failure(graph: Arc<ContainerGraph>, message: String) -> Self {
        let rules = RuleSet::for_cleanup_stage(&graph);

        Self {
            graph,
            behaviour_after_failure: BehaviourAfterFailure::Cleanup,
            inner: Mutex::new(Inner {
                events: vec![TaskEvent::ExecutionFailed { message }],
                stage: Stage::CleaningUp,
                rules,
                emitted: HashSet::new(),
                cleanup_skipped: false,
            }),
        }
    }

    /// Return the next enabled step, or `None` if nothing is currently
    /// enabled. Callers must not spin on `None`: they call again only after
    /// posting a new event (or when their last worker finishes).
    ///
    /// `steps_still_running` tells the machine whether the caller has work
    /// in flight. When it does not, a Running stage with no enabled rule can
    /// never make progress again (no event will arrive to change the log),
    /// so the machine performs the one-way transition to CleaningUp and
    /// retries against the cleanup rules.
    pub fn pop_next_step(&self, steps_still_running: bool) -> Option<Step> {
        let mut guard = self.inner.lock().expect("state machine mutex poisoned");
        let inner = &mut *guard;

        if let Some(step) = inner.rules.next_step(&self.graph, &inner.events, &inner.emitted) {
            debug!(step = %step, "rules engine emitted step");
            inner.emitted.insert(step.clone());
            return Some(step);
        }

        if inner.stage == Stage::Running && !steps_still_running {
            self.transition(inner, TransitionReason::Stalled);

            if let Some(step) = inner.rules.next_step(&self.graph, &inner.events, &inner.emitted) {
                debug!(step = %step, "rules engine emitted step");
                inner.emitted.insert(step.clone());
                return Some(step);
            }
        }

        None
    }

    /// Append an event to the log, recording any synthetic follow-on events
    /// and re-evaluating the stage transition atomically.
    pub fn post_event(&self, event: TaskEvent) {
        let mut guard = self.inner.lock().expect("state machine mutex poisoned");
        let inner = &mut *guard;

        debug!(event = %event, "event posted to state machine");

        // Containers without a health check are considered healthy as soon
        // as they start.
        let synthetic = match &event {
            TaskEvent::ContainerStarted { container }
                if !self.graph.has_health_check(container) =>
            {
                Some(TaskEvent::ContainerBecameHealthy {
                    container: container.clone(),
                })
            }
            _ => None,
        };

        let reason = transition_reason_for(&event);

        inner.events.push(event);
        if let Some(synthetic) = synthetic {
            debug!(event = %synthetic, "recording synthetic follow-on event");
            inner.events.push(synthetic);
        }

        if inner.stage == Stage::Running {
            if let Some(reason) = reason {
                self.transition(inner, reason);
            }
        }
    }

    /// True iff the stage is CleaningUp and no rule can fire. Callers track
    /// in-flight workers separately.
    pub fn is_finished(&self) -> bool {
        let inner = self.inner.lock().expect("state machine mutex poisoned");

        inner.stage == Stage::CleaningUp
            && inner
                .rules
                .next_step(&self.graph, &inner.events, &inner.emitted)
                .is_none()
    }

    pub fn stage(&self) -> Stage {
        self.inner
            .lock()
            .expect("state machine mutex poisoned")
            .stage
    }

    /// Snapshot of the event log, for exit-status derivation and tests.
    pub fn events(&self) -> Vec<TaskEvent> {
        self.inner
            .lock()
            .expect("state machine mutex poisoned")
            .events
            .clone()
    }

    /// Whether cleanup was deliberately skipped (`DoNotCleanup` after a
    /// failure), leaving resources behind.
    pub fn cleanup_was_skipped(&self) -> bool {
        self.inner
            .lock()
            .expect("state machine mutex poisoned")
            .cleanup_skipped
    }

    pub fn graph(&self) -> &Arc<ContainerGraph> {
        &self.graph
    }

    /// One-way, one-shot Running → CleaningUp transition.
    fn transition(&self, inner: &mut Inner, reason: TransitionReason) {
        if inner.stage == Stage::CleaningUp {
            return;
        }

        let failure_caused = match reason {
            TransitionReason::Failure => true,
            TransitionReason::Stalled => has_failure_event(&inner.events),
            TransitionReason::MainContainerExited | TransitionReason::Interrupted => false,
        };

        info!(?reason, "transitioning to cleanup stage");
        inner.stage = Stage::CleaningUp;

        if failure_caused && self.behaviour_after_failure == BehaviourAfterFailure::DoNotCleanup {
            warn!("cleanup disabled after failure; leaving created resources behind");
            inner.cleanup_skipped = true;
            inner.rules = RuleSet::empty();
        } else {
            inner.rules = RuleSet::for_cleanup_stage(&self.graph);
        }
    }
}

/// Events that end the Running stage. Every forward failure qualifies:
/// every container in the graph is transitively required by the main
/// container, so any forward failure makes forward progress impossible.
fn transition_reason_for(event: &TaskEvent) -> Option<TransitionReason> {
    match event {
        TaskEvent::RunningContainerExited { .. } => Some(TransitionReason::MainContainerExited),
        TaskEvent::ExecutionFailed { .. } => Some(TransitionReason::Failure),
        TaskEvent::UserInterruptedExecution => Some(TransitionReason::Interrupted),
        TaskEvent::ImageBuildFailed { .. }
        | TaskEvent::ImagePullFailed { .. }
        | TaskEvent::TaskNetworkCreationFailed { .. }
        | TaskEvent::ContainerCreationFailed { .. }
        | TaskEvent::ContainerStartFailed { .. }
        | TaskEvent::ContainerDidNotBecomeHealthy { .. } => Some(TransitionReason::Failure),
        _ => None,
    }
}

fn has_failure_event(events: &[TaskEvent]) -> bool {
    events.iter().any(|e| {
        matches!(
            e,
            TaskEvent::ImageBuildFailed { .. }
                | TaskEvent::ImagePullFailed { .. }
                | TaskEvent::TaskNetworkCreationFailed { .. }
                | TaskEvent::ContainerCreationFailed { .. }
                | TaskEvent::ContainerStartFailed { .. }
                | TaskEvent::ContainerDidNotBecomeHealthy { .. }
                | TaskEvent::ExecutionFailed { .. }
        )
    })
}
