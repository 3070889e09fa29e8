// src/events/step.rs

//! Units of work emitted by the rules engine.

use std::fmt;

use crate::task::ContainerName;

/// A single unit of executable work.
///
/// Steps are plain data: identifiers plus parameters the rules engine has
/// already extracted from the event log (container ids, the network id, the
/// resolved image). Structural equality is what the state machine uses to
/// guarantee at-most-once emission per target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    CreateTaskNetwork,
    BuildImage {
        container: ContainerName,
    },
    PullImage {
        image: String,
    },
    CreateContainer {
        container: ContainerName,
        image: String,
        network_id: String,
    },
    StartContainer {
        container: ContainerName,
        container_id: String,
    },
    WaitForContainerToBecomeHealthy {
        container: ContainerName,
        container_id: String,
    },
    RunContainer {
        container: ContainerName,
        container_id: String,
    },
    StopContainer {
        container: ContainerName,
        container_id: String,
    },
    RemoveContainer {
        container: ContainerName,
        container_id: String,
    },
    DeleteTaskNetwork {
        network_id: String,
    },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::CreateTaskNetwork => write!(f, "CreateTaskNetwork()"),
            Step::BuildImage { container } => {
                write!(f, "BuildImage(container: '{container}')")
            }
            Step::PullImage { image } => write!(f, "PullImage(image: '{image}')"),
            Step::CreateContainer {
                container,
                image,
                network_id,
            } => write!(
                f,
                "CreateContainer(container: '{container}', image: '{image}', network: '{network_id}')"
            ),
            Step::StartContainer {
                container,
                container_id,
            } => write!(
                f,
                "StartContainer(container: '{container}', container id: '{container_id}')"
            ),
            Step::WaitForContainerToBecomeHealthy {
                container,
                container_id,
            } => write!(
                f,
                "WaitForContainerToBecomeHealthy(container: '{container}', container id: '{container_id}')"
            ),
            Step::RunContainer {
                container,
                container_id,
            } => write!(
                f,
                "RunContainer(container: '{container}', container id: '{container_id}')"
            ),
            Step::StopContainer {
                container,
                container_id,
            } => write!(
                f,
                "StopContainer(container: '{container}', container id: '{container_id}')"
            ),
            Step::RemoveContainer {
                container,
                container_id,
            } => write!(
                f,
                "RemoveContainer(container: '{container}', container id: '{container_id}')"
            ),
            Step::DeleteTaskNetwork { network_id } => {
                write!(f, "DeleteTaskNetwork(network: '{network_id}')")
            }
        }
    }
}
