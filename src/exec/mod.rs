// src/exec/mod.rs

//! The async execution shell around the state machine: the parallel
//! execution manager ([`manager`]) and the step dispatcher ([`runner`]).

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::engine::EngineDriver;
use crate::events::TaskEvent;
use crate::state::{plan_run, TaskStateMachine};
use crate::task::{ContainerGraph, ContainerName};
use crate::types::BehaviourAfterFailure;
use crate::ui::EventLogger;

pub mod manager;
pub mod runner;

pub use manager::ParallelExecutionManager;

/// Options for a single task run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub task_name: String,
    /// Extra arguments appended to the main container's command.
    pub additional_command_args: Vec<String>,
    /// Maximum number of steps in flight simultaneously. At least 1.
    pub level_of_parallelism: usize,
    pub behaviour_after_failure: BehaviourAfterFailure,
    /// Whether Ctrl+C is converted into a graceful cleanup.
    pub is_interruptible: bool,
}

impl RunOptions {
    pub fn new(task_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            additional_command_args: Vec::new(),
            level_of_parallelism: 1,
            behaviour_after_failure: BehaviourAfterFailure::Cleanup,
            is_interruptible: true,
        }
    }
}

/// Outcome of a task run, derived solely from the final event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskExitStatus {
    /// The main container ran to completion; carries its exit code.
    Exited { exit_code: i64 },
    /// Execution was interrupted and cleanup succeeded.
    Interrupted,
    /// The task failed; carries a human-readable reason.
    Failed { message: String },
}

impl TaskExitStatus {
    /// The process exit code to report for this status. A main container
    /// that exited propagates its own code; interruption uses the
    /// conventional SIGINT code.
    pub fn exit_code(&self) -> i32 {
        match self {
            TaskExitStatus::Exited { exit_code } => *exit_code as i32,
            TaskExitStatus::Interrupted => 130,
            TaskExitStatus::Failed { .. } => 1,
        }
    }

    /// Derive the status from a finished run's event log.
    ///
    /// Success requires the main container to have run to completion *and*
    /// cleanup to have succeeded for everything that was created. Cleanup
    /// failures therefore take precedence, then the main container's exit,
    /// then interruption, then the first recorded failure.
    pub fn from_events(events: &[TaskEvent], graph: &ContainerGraph) -> Self {
        let cleanup_failures = cleanup_failure_descriptions(events);
        let leftovers = leftover_descriptions(events, graph);
        let main_exit = events.iter().find_map(|e| match e {
            TaskEvent::RunningContainerExited {
                container,
                exit_code,
            } if container == graph.main_container_name() => Some(*exit_code),
            _ => None,
        });

        if !cleanup_failures.is_empty() {
            let detail = cleanup_failures.join("; ");
            let message = match main_exit {
                Some(code) => format!(
                    "main container exited with code {code}, but cleanup failed: {detail}"
                ),
                None => format!("cleanup failed: {detail}"),
            };
            return TaskExitStatus::Failed { message };
        }

        if !leftovers.is_empty() {
            let cause = first_failure_message(events)
                .unwrap_or_else(|| "execution failed".to_string());
            return TaskExitStatus::Failed {
                message: format!(
                    "{cause}; resources left behind for inspection: {}",
                    leftovers.join(", ")
                ),
            };
        }

        if let Some(exit_code) = main_exit {
            return TaskExitStatus::Exited { exit_code };
        }

        if events
            .iter()
            .any(|e| matches!(e, TaskEvent::UserInterruptedExecution))
        {
            return TaskExitStatus::Interrupted;
        }

        TaskExitStatus::Failed {
            message: first_failure_message(events)
                .unwrap_or_else(|| "the task did not run to completion".to_string()),
        }
    }
}

/// Cleanup failures for resources that had been successfully created.
fn cleanup_failure_descriptions(events: &[TaskEvent]) -> Vec<String> {
    let created: Vec<&ContainerName> = events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::ContainerCreated { container, .. } => Some(container),
            _ => None,
        })
        .collect();

    let network_created = events
        .iter()
        .any(|e| matches!(e, TaskEvent::TaskNetworkCreated { .. }));

    let mut descriptions = Vec::new();

    for event in events {
        match event {
            TaskEvent::ContainerStopFailed { container, message }
                if created.contains(&container) =>
            {
                descriptions.push(format!("could not stop container '{container}': {message}"))
            }
            TaskEvent::ContainerRemovalFailed { container, message }
                if created.contains(&container) =>
            {
                descriptions.push(format!(
                    "could not remove container '{container}': {message}"
                ))
            }
            TaskEvent::TaskNetworkDeletionFailed { message } if network_created => {
                descriptions.push(format!("could not delete the task network: {message}"))
            }
            _ => {}
        }
    }

    descriptions
}

/// Resources created but never torn down (the `DoNotCleanup` path).
fn leftover_descriptions(events: &[TaskEvent], graph: &ContainerGraph) -> Vec<String> {
    let mut leftovers = Vec::new();

    for container in graph.containers() {
        let created = events.iter().any(|e| {
            matches!(e, TaskEvent::ContainerCreated { container: c, .. } if *c == container.name)
        });

        if created && !crate::state::rules::removal_outcome(events, &container.name) {
            leftovers.push(format!("container '{}'", container.name));
        }
    }

    let network = events.iter().find_map(|e| match e {
        TaskEvent::TaskNetworkCreated { network_id } => Some(network_id),
        _ => None,
    });

    if let Some(network_id) = network {
        let deleted = events.iter().any(|e| {
            matches!(
                e,
                TaskEvent::TaskNetworkDeleted | TaskEvent::TaskNetworkDeletionFailed { .. }
            )
        });

        if !deleted {
            leftovers.push(format!("task network '{network_id}'"));
        }
    }

    leftovers
}

fn first_failure_message(events: &[TaskEvent]) -> Option<String> {
    events.iter().find_map(|e| match e {
        TaskEvent::ImageBuildFailed { container, message } => Some(format!(
            "building the image for container '{container}' failed: {message}"
        )),
        TaskEvent::ImagePullFailed { image, message } => {
            Some(format!("pulling image '{image}' failed: {message}"))
        }
        TaskEvent::TaskNetworkCreationFailed { message } => {
            Some(format!("creating the task network failed: {message}"))
        }
        TaskEvent::ContainerCreationFailed { container, message } => {
            Some(format!("creating container '{container}' failed: {message}"))
        }
        TaskEvent::ContainerStartFailed { container, message } => {
            Some(format!("starting container '{container}' failed: {message}"))
        }
        TaskEvent::ContainerDidNotBecomeHealthy { container, message } => Some(format!(
            "container '{container}' did not become healthy: {message}"
        )),
        TaskEvent::ExecutionFailed { message } => Some(message.clone()),
        _ => None,
    })
}

/// Signals that wake the manager's scheduling loop.
#[derive(Debug, Clone, Copy)]
pub(crate) enum WakeSignal {
    EventPosted,
    WorkerFinished,
}

/// The side-effect-only callback handed to the step runner.
///
/// Every posted event is delivered to the UI listener first and to the
/// state machine second; that ordering is observable and required. The two
/// sinks must not be parallelised.
#[derive(Clone)]
pub struct EventSink {
    ui: Arc<dyn EventLogger>,
    machine: Arc<TaskStateMachine>,
    wake: mpsc::UnboundedSender<WakeSignal>,
}

impl EventSink {
    pub(crate) fn new(
        ui: Arc<dyn EventLogger>,
        machine: Arc<TaskStateMachine>,
        wake: mpsc::UnboundedSender<WakeSignal>,
    ) -> Self {
        Self { ui, machine, wake }
    }

    pub fn post(&self, event: TaskEvent) {
        self.ui.post_event(&event);
        self.machine.post_event(event);
        // The manager may already have exited; that is fine.
        let _ = self.wake.send(WakeSignal::EventPosted);
    }
}

/// Convenience entry point: plan and run a task against the given driver
/// and UI, returning its exit status.
pub async fn run_task(
    graph: Arc<ContainerGraph>,
    driver: Arc<dyn EngineDriver>,
    ui: Arc<dyn EventLogger>,
    options: RunOptions,
) -> TaskExitStatus {
    let machine = Arc::new(plan_run(
        Arc::clone(&graph),
        options.behaviour_after_failure,
    ));

    ParallelExecutionManager::new(machine, driver, ui, options)
        .run()
        .await
}
