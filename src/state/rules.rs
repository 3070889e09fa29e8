// src/state/rules.rs

//! Pure rules over the task event log.
//!
//! A rule declares the step it may emit, an enabling predicate and a
//! suppression predicate, all evaluated against the accumulated event log
//! only. Rules never mutate anything and never post events; the state
//! machine owns the log and the at-most-once bookkeeping.

use std::collections::HashSet;

use crate::events::{Step, TaskEvent};
use crate::task::{Container, ContainerGraph, ContainerName, ImageSource};

/// A single rule. The variants mirror the steps the rules engine can emit;
/// `PrepareImage` resolves to either a build or a pull step depending on the
/// container's image source.
#[derive(Debug, Clone)]
enum Rule {
    CreateTaskNetwork,
    PrepareImage { container: ContainerName },
    CreateContainer { container: ContainerName },
    StartContainer { container: ContainerName },
    WaitForHealthy { container: ContainerName },
    RunMainContainer,
    StopContainer { container: ContainerName },
    RemoveContainer { container: ContainerName },
    DeleteTaskNetwork,
}

impl Rule {
    /// Whether this rule's own outcome is already in the log, making it
    /// redundant.
    fn suppressed(&self, graph: &ContainerGraph, events: &[TaskEvent]) -> bool {
        match self {
            Rule::CreateTaskNetwork => events.iter().any(|e| {
                matches!(
                    e,
                    TaskEvent::TaskNetworkCreated { .. }
                        | TaskEvent::TaskNetworkCreationFailed { .. }
                )
            }),
            Rule::PrepareImage { container } => match image_source_of(graph, container) {
                Some(ImageSource::Build { .. }) => events.iter().any(|e| match e {
                    TaskEvent::ImageBuildStarted { container: c }
                    | TaskEvent::ImageBuildSucceeded { container: c, .. }
                    | TaskEvent::ImageBuildFailed { container: c, .. } => c == container,
                    _ => false,
                }),
                Some(ImageSource::Pull { image }) => events.iter().any(|e| match e {
                    TaskEvent::ImagePullStarted { image: i }
                    | TaskEvent::ImagePullSucceeded { image: i }
                    | TaskEvent::ImagePullFailed { image: i, .. } => i == image,
                    _ => false,
                }),
                None => true,
            },
            Rule::CreateContainer { container } => events.iter().any(|e| match e {
                TaskEvent::ContainerCreated { container: c, .. }
                | TaskEvent::ContainerCreationFailed { container: c, .. } => c == container,
                _ => false,
            }),
            Rule::StartContainer { container } => events.iter().any(|e| match e {
                TaskEvent::ContainerStarted { container: c }
                | TaskEvent::ContainerStartFailed { container: c, .. } => c == container,
                _ => false,
            }),
            Rule::WaitForHealthy { container } => events.iter().any(|e| match e {
                TaskEvent::ContainerBecameHealthy { container: c }
                | TaskEvent::ContainerDidNotBecomeHealthy { container: c, .. } => c == container,
                _ => false,
            }),
            Rule::RunMainContainer => events.iter().any(|e| {
                matches!(e, TaskEvent::RunningContainerExited { container, .. }
                    if container == graph.main_container_name())
            }),
            Rule::StopContainer { container } => events.iter().any(|e| match e {
                TaskEvent::ContainerStopped { container: c }
                | TaskEvent::ContainerStopFailed { container: c, .. } => c == container,
                _ => false,
            }),
            Rule::RemoveContainer { container } => removal_outcome(events, container),
            Rule::DeleteTaskNetwork => events.iter().any(|e| {
                matches!(
                    e,
                    TaskEvent::TaskNetworkDeleted | TaskEvent::TaskNetworkDeletionFailed { .. }
                )
            }),
        }
    }

    /// The step this rule emits, if its enabling predicate holds against the
    /// log. Steps carry parameters (container ids, the network id, the
    /// resolved image) extracted from the events that enabled them.
    fn step(&self, graph: &ContainerGraph, events: &[TaskEvent]) -> Option<Step> {
        match self {
            Rule::CreateTaskNetwork => Some(Step::CreateTaskNetwork),

            Rule::PrepareImage { container } => match image_source_of(graph, container)? {
                ImageSource::Build { .. } => Some(Step::BuildImage {
                    container: container.clone(),
                }),
                ImageSource::Pull { image } => Some(Step::PullImage {
                    image: image.clone(),
                }),
            },

            Rule::CreateContainer { container } => {
                let spec = graph.container(container)?;
                let image = ready_image(events, spec)?;
                let network_id = network_id(events)?;

                let deps_ready = spec
                    .dependencies
                    .iter()
                    .all(|dep| dependency_ready(graph, events, dep));

                if !deps_ready {
                    return None;
                }

                Some(Step::CreateContainer {
                    container: container.clone(),
                    image,
                    network_id: network_id.to_string(),
                })
            }

            Rule::StartContainer { container } => {
                let container_id = container_id(events, container)?;

                Some(Step::StartContainer {
                    container: container.clone(),
                    container_id: container_id.to_string(),
                })
            }

            Rule::WaitForHealthy { container } => {
                if !started(events, container) {
                    return None;
                }
                let container_id = container_id(events, container)?;

                Some(Step::WaitForContainerToBecomeHealthy {
                    container: container.clone(),
                    container_id: container_id.to_string(),
                })
            }

            Rule::RunMainContainer => {
                let main = graph.main_container_name();
                let all_ready = graph
                    .containers()
                    .all(|c| dependency_ready(graph, events, &c.name));

                if !all_ready {
                    return None;
                }

                let container_id = container_id(events, main)?;

                Some(Step::RunContainer {
                    container: main.clone(),
                    container_id: container_id.to_string(),
                })
            }

            Rule::StopContainer { container } => {
                if !started(events, container) {
                    return None;
                }
                let container_id = container_id(events, container)?;

                Some(Step::StopContainer {
                    container: container.clone(),
                    container_id: container_id.to_string(),
                })
            }

            Rule::RemoveContainer { container } => {
                let container_id = container_id(events, container)?;

                // Stop before remove is mandatory: once the container was
                // started, removal waits for a stop outcome. Removal is
                // forced, so a failed stop still gets a removal attempt.
                if started(events, container) && !stop_outcome(events, container) {
                    return None;
                }

                Some(Step::RemoveContainer {
                    container: container.clone(),
                    container_id: container_id.to_string(),
                })
            }

            Rule::DeleteTaskNetwork => {
                let network_id = network_id(events)?;

                let all_removed = graph
                    .containers()
                    .filter(|c| container_id(events, &c.name).is_some())
                    .all(|c| removal_outcome(events, &c.name));

                if !all_removed {
                    return None;
                }

                Some(Step::DeleteTaskNetwork {
                    network_id: network_id.to_string(),
                })
            }
        }
    }
}

/// An ordered set of rules for one stage.
///
/// `next_step` scans in construction order; the order is not observable by
/// callers but is deterministic for a given log, so behaviour is
/// reproducible under tests.
#[derive(Debug, Clone)]
pub(crate) struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Rules for the Running stage: image preparation and network creation
    /// are enabled from the start; everything else is gated on the log.
    pub(crate) fn for_run_stage(graph: &ContainerGraph) -> Self {
        let mut rules = vec![Rule::CreateTaskNetwork];

        for container in graph.containers() {
            rules.push(Rule::PrepareImage {
                container: container.name.clone(),
            });
        }

        for container in graph.containers() {
            rules.push(Rule::CreateContainer {
                container: container.name.clone(),
            });
            rules.push(Rule::StartContainer {
                container: container.name.clone(),
            });

            if container.has_health_check() {
                rules.push(Rule::WaitForHealthy {
                    container: container.name.clone(),
                });
            }
        }

        rules.push(Rule::RunMainContainer);

        Self { rules }
    }

    /// Rules for the CleaningUp stage: stop what was started, remove what
    /// was created, then delete the network.
    pub(crate) fn for_cleanup_stage(graph: &ContainerGraph) -> Self {
        let mut rules = Vec::new();

        for container in graph.containers() {
            rules.push(Rule::StopContainer {
                container: container.name.clone(),
            });
        }

        for container in graph.containers() {
            rules.push(Rule::RemoveContainer {
                container: container.name.clone(),
            });
        }

        rules.push(Rule::DeleteTaskNetwork);

        Self { rules }
    }

    /// No rules at all: used when cleanup is deliberately skipped
    /// (`DoNotCleanup` after a failure).
    pub(crate) fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The first step that is enabled, not suppressed by the log, and not
    /// already emitted.
    pub(crate) fn next_step(
        &self,
        graph: &ContainerGraph,
        events: &[TaskEvent],
        emitted: &HashSet<Step>,
    ) -> Option<Step> {
        for rule in &self.rules {
            if rule.suppressed(graph, events) {
                continue;
            }

            if let Some(step) = rule.step(graph, events) {
                if !emitted.contains(&step) {
                    return Some(step);
                }
            }
        }

        None
    }
}

fn image_source_of<'a>(graph: &'a ContainerGraph, container: &str) -> Option<&'a ImageSource> {
    graph.container(container).map(|c| &c.image_source)
}

/// The image to create a container from, once its source is ready: the built
/// image id for build sources, the pulled reference for pull sources.
fn ready_image(events: &[TaskEvent], container: &Container) -> Option<String> {
    match &container.image_source {
        ImageSource::Build { .. } => events.iter().find_map(|e| match e {
            TaskEvent::ImageBuildSucceeded {
                container: c,
                image_id,
            } if *c == container.name => Some(image_id.clone()),
            _ => None,
        }),
        ImageSource::Pull { image } => events
            .iter()
            .any(|e| matches!(e, TaskEvent::ImagePullSucceeded { image: i } if i == image))
            .then(|| image.clone()),
    }
}

pub(crate) fn network_id(events: &[TaskEvent]) -> Option<&str> {
    events.iter().find_map(|e| match e {
        TaskEvent::TaskNetworkCreated { network_id } => Some(network_id.as_str()),
        _ => None,
    })
}

pub(crate) fn container_id<'a>(events: &'a [TaskEvent], container: &str) -> Option<&'a str> {
    events.iter().find_map(|e| match e {
        TaskEvent::ContainerCreated {
            container: c,
            container_id,
        } if c == container => Some(container_id.as_str()),
        _ => None,
    })
}

fn started(events: &[TaskEvent], container: &str) -> bool {
    events
        .iter()
        .any(|e| matches!(e, TaskEvent::ContainerStarted { container: c } if c == container))
}

fn healthy(events: &[TaskEvent], container: &str) -> bool {
    events
        .iter()
        .any(|e| matches!(e, TaskEvent::ContainerBecameHealthy { container: c } if c == container))
}

/// Whether a dependency is ready from the point of view of its dependents:
/// healthy, or merely started when it declares no health check. (The state
/// machine appends a synthetic healthy event for containers without a check,
/// so the second arm is a belt-and-braces restatement of the contract.)
fn dependency_ready(graph: &ContainerGraph, events: &[TaskEvent], container: &str) -> bool {
    healthy(events, container)
        || (!graph.has_health_check(container) && started(events, container))
}

fn stop_outcome(events: &[TaskEvent], container: &str) -> bool {
    events.iter().any(|e| match e {
        TaskEvent::ContainerStopped { container: c }
        | TaskEvent::ContainerStopFailed { container: c, .. } => c == container,
        _ => false,
    })
}

pub(crate) fn removal_outcome(events: &[TaskEvent], container: &str) -> bool {
    events.iter().any(|e| match e {
        TaskEvent::ContainerRemoved { container: c }
        | TaskEvent::ContainerRemovalFailed { container: c, .. } => c == container,
        _ => false,
    })
}
