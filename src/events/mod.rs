// src/events/mod.rs

//! Observations recorded in the task event log.
//!
//! Events are the single source of truth for the execution engine: every
//! state transition is a pure function of the accumulated log. Once appended,
//! an event is never modified.

use std::fmt;

use crate::task::ContainerName;

pub mod step;

pub use step::Step;

/// An immutable observation appended to the task event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    ImageBuildStarted {
        container: ContainerName,
    },
    ImageBuildProgress {
        container: ContainerName,
        current_step: u64,
        total_steps: u64,
        message: String,
    },
    ImageBuildSucceeded {
        container: ContainerName,
        image_id: String,
    },
    ImageBuildFailed {
        container: ContainerName,
        message: String,
    },
    ImagePullStarted {
        image: String,
    },
    ImagePullProgress {
        image: String,
        message: String,
    },
    ImagePullSucceeded {
        image: String,
    },
    ImagePullFailed {
        image: String,
        message: String,
    },
    TaskNetworkCreated {
        network_id: String,
    },
    TaskNetworkCreationFailed {
        message: String,
    },
    ContainerCreated {
        container: ContainerName,
        container_id: String,
    },
    ContainerCreationFailed {
        container: ContainerName,
        message: String,
    },
    ContainerStarted {
        container: ContainerName,
    },
    ContainerStartFailed {
        container: ContainerName,
        message: String,
    },
    ContainerBecameHealthy {
        container: ContainerName,
    },
    ContainerDidNotBecomeHealthy {
        container: ContainerName,
        message: String,
    },
    RunningContainerExited {
        container: ContainerName,
        exit_code: i64,
    },
    ContainerStopped {
        container: ContainerName,
    },
    ContainerStopFailed {
        container: ContainerName,
        message: String,
    },
    ContainerRemoved {
        container: ContainerName,
    },
    ContainerRemovalFailed {
        container: ContainerName,
        message: String,
    },
    TaskNetworkDeleted,
    TaskNetworkDeletionFailed {
        message: String,
    },
    /// Catastrophic failure from any step (a bug, not an engine refusal).
    ExecutionFailed {
        message: String,
    },
    UserInterruptedExecution,
}

impl fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskEvent::ImageBuildStarted { container } => {
                write!(f, "ImageBuildStarted(container: '{container}')")
            }
            TaskEvent::ImageBuildProgress {
                container,
                current_step,
                total_steps,
                message,
            } => write!(
                f,
                "ImageBuildProgress(container: '{container}', current step: {current_step}, total steps: {total_steps}, message: '{message}')"
            ),
            TaskEvent::ImageBuildSucceeded {
                container,
                image_id,
            } => write!(
                f,
                "ImageBuildSucceeded(container: '{container}', image id: '{image_id}')"
            ),
            TaskEvent::ImageBuildFailed { container, message } => write!(
                f,
                "ImageBuildFailed(container: '{container}', message: '{message}')"
            ),
            TaskEvent::ImagePullStarted { image } => {
                write!(f, "ImagePullStarted(image: '{image}')")
            }
            TaskEvent::ImagePullProgress { image, message } => {
                write!(f, "ImagePullProgress(image: '{image}', message: '{message}')")
            }
            TaskEvent::ImagePullSucceeded { image } => {
                write!(f, "ImagePullSucceeded(image: '{image}')")
            }
            TaskEvent::ImagePullFailed { image, message } => {
                write!(f, "ImagePullFailed(image: '{image}', message: '{message}')")
            }
            TaskEvent::TaskNetworkCreated { network_id } => {
                write!(f, "TaskNetworkCreated(network: '{network_id}')")
            }
            TaskEvent::TaskNetworkCreationFailed { message } => {
                write!(f, "TaskNetworkCreationFailed(message: '{message}')")
            }
            TaskEvent::ContainerCreated {
                container,
                container_id,
            } => write!(
                f,
                "ContainerCreated(container: '{container}', container id: '{container_id}')"
            ),
            TaskEvent::ContainerCreationFailed { container, message } => write!(
                f,
                "ContainerCreationFailed(container: '{container}', message: '{message}')"
            ),
            TaskEvent::ContainerStarted { container } => {
                write!(f, "ContainerStarted(container: '{container}')")
            }
            TaskEvent::ContainerStartFailed { container, message } => write!(
                f,
                "ContainerStartFailed(container: '{container}', message: '{message}')"
            ),
            TaskEvent::ContainerBecameHealthy { container } => {
                write!(f, "ContainerBecameHealthy(container: '{container}')")
            }
            TaskEvent::ContainerDidNotBecomeHealthy { container, message } => write!(
                f,
                "ContainerDidNotBecomeHealthy(container: '{container}', message: '{message}')"
            ),
            TaskEvent::RunningContainerExited {
                container,
                exit_code,
            } => write!(
                f,
                "RunningContainerExited(container: '{container}', exit code: {exit_code})"
            ),
            TaskEvent::ContainerStopped { container } => {
                write!(f, "ContainerStopped(container: '{container}')")
            }
            TaskEvent::ContainerStopFailed { container, message } => write!(
                f,
                "ContainerStopFailed(container: '{container}', message: '{message}')"
            ),
            TaskEvent::ContainerRemoved { container } => {
                write!(f, "ContainerRemoved(container: '{container}')")
            }
            TaskEvent::ContainerRemovalFailed { container, message } => write!(
                f,
                "ContainerRemovalFailed(container: '{container}', message: '{message}')"
            ),
            TaskEvent::TaskNetworkDeleted => write!(f, "TaskNetworkDeleted()"),
            TaskEvent::TaskNetworkDeletionFailed { message } => {
                write!(f, "TaskNetworkDeletionFailed(message: '{message}')")
            }
            TaskEvent::ExecutionFailed { message } => {
                write!(f, "ExecutionFailed(message: '{message}')")
            }
            TaskEvent::UserInterruptedExecution => write!(f, "UserInterruptedExecution()"),
        }
    }
}
