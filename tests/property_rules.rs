// tests/property_rules.rs

//! Property tests for the rules engine: random dependency graphs with
//! random creation failures always terminate, never emit a step twice,
//! respect dependency ordering, and tear down everything they created.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use taskdock::events::{Step, TaskEvent};
use taskdock::state::{plan_run, TaskStateMachine};
use taskdock::task::{Container, ContainerGraph};
use taskdock::types::BehaviourAfterFailure;

/// Ingredients for a random but valid task graph: container `i` may only
/// depend on containers with lower indices, which rules out cycles by
/// construction. The last container is the task's main container.
fn graph_strategy(
    max_containers: usize,
) -> impl Strategy<Value = (ContainerGraph, HashSet<String>)> {
    (1..=max_containers).prop_flat_map(|count| {
        let deps = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..count),
            count,
        );
        let health_checks = proptest::collection::vec(any::<bool>(), count);
        let failing = proptest::collection::vec(any::<bool>(), count);

        (deps, health_checks, failing).prop_map(move |(raw_deps, health_checks, failing)| {
            let mut containers = Vec::with_capacity(count);
            let mut failing_names = HashSet::new();

            for (i, potential_deps) in raw_deps.into_iter().enumerate() {
                let name = format!("c{i}");
                let mut container = Container::from_image(&name, format!("img-{i}:1"));

                // Sanitize dependencies: only allow deps with index < i.
                let mut valid_deps: Vec<usize> = potential_deps
                    .into_iter()
                    .filter(|_| i > 0)
                    .map(|d| d % i)
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect();
                valid_deps.sort_unstable();

                container.dependencies = valid_deps.iter().map(|d| format!("c{d}")).collect();

                if health_checks[i] {
                    container.health_check = Some(Default::default());
                }

                if failing[i] {
                    failing_names.insert(name.clone());
                }

                containers.push(container);
            }

            let main = format!("c{}", count - 1);
            let graph = ContainerGraph::from_containers("prop", main, containers)
                .expect("generated graph is valid by construction");

            // Containers outside the main container's closure never run.
            failing_names.retain(|name| graph.container(name).is_some());

            (graph, failing_names)
        })
    })
}

/// Post the events a worker would post for this step, with container
/// creation failing for the chosen containers.
fn simulate_step(machine: &TaskStateMachine, failing: &HashSet<String>, step: Step) {
    match step {
        Step::CreateTaskNetwork => machine.post_event(TaskEvent::TaskNetworkCreated {
            network_id: "net-1".to_string(),
        }),
        Step::BuildImage { container } => {
            machine.post_event(TaskEvent::ImageBuildStarted {
                container: container.clone(),
            });
            machine.post_event(TaskEvent::ImageBuildSucceeded {
                image_id: format!("{container}-image"),
                container,
            });
        }
        Step::PullImage { image } => {
            machine.post_event(TaskEvent::ImagePullStarted {
                image: image.clone(),
            });
            machine.post_event(TaskEvent::ImagePullSucceeded { image });
        }
        Step::CreateContainer { container, .. } => {
            if failing.contains(&container) {
                machine.post_event(TaskEvent::ContainerCreationFailed {
                    container,
                    message: "injected failure".to_string(),
                });
            } else {
                machine.post_event(TaskEvent::ContainerCreated {
                    container_id: format!("{container}-id"),
                    container,
                });
            }
        }
        Step::StartContainer { container, .. } => {
            machine.post_event(TaskEvent::ContainerStarted { container })
        }
        Step::WaitForContainerToBecomeHealthy { container, .. } => {
            machine.post_event(TaskEvent::ContainerBecameHealthy { container })
        }
        Step::RunContainer { container, .. } => {
            machine.post_event(TaskEvent::RunningContainerExited {
                container,
                exit_code: 0,
            })
        }
        Step::StopContainer { container, .. } => {
            machine.post_event(TaskEvent::ContainerStopped { container })
        }
        Step::RemoveContainer { container, .. } => {
            machine.post_event(TaskEvent::ContainerRemoved { container })
        }
        Step::DeleteTaskNetwork { .. } => machine.post_event(TaskEvent::TaskNetworkDeleted),
    }
}

proptest! {
    #[test]
    fn random_graphs_terminate_with_ordering_and_cleanup_intact(
        (graph, failing) in graph_strategy(8),
    ) {
        let graph = Arc::new(graph);
        let machine = plan_run(Arc::clone(&graph), BehaviourAfterFailure::Cleanup);

        let mut in_flight: Vec<Step> = Vec::new();
        let mut popped: Vec<Step> = Vec::new();
        let mut iterations = 0;

        loop {
            while let Some(step) = machine.pop_next_step(!in_flight.is_empty()) {
                popped.push(step.clone());
                in_flight.push(step);

                iterations += 1;
                prop_assert!(iterations < 10_000, "simulation did not converge");
            }

            if in_flight.is_empty() {
                break;
            }

            let step = in_flight.remove(0);
            simulate_step(&machine, &failing, step);
        }

        prop_assert!(machine.is_finished(), "machine stopped without finishing");

        // No step is ever emitted twice.
        let unique: HashSet<&Step> = popped.iter().collect();
        prop_assert_eq!(unique.len(), popped.len(), "duplicate step emitted");

        let events = machine.events();

        // A container is only created after each of its dependencies is
        // healthy (or started, for dependencies without a health check).
        for (index, event) in events.iter().enumerate() {
            if let TaskEvent::ContainerCreated { container, .. } = event {
                for dep in graph.dependencies_of(container) {
                    let ready_before = events[..index].iter().any(|e| match e {
                        TaskEvent::ContainerBecameHealthy { container: c } => c == dep,
                        TaskEvent::ContainerStarted { container: c } => {
                            c == dep && !graph.has_health_check(dep)
                        }
                        _ => false,
                    });

                    prop_assert!(
                        ready_before,
                        "'{}' was created before its dependency '{}' was ready",
                        container,
                        dep
                    );
                }
            }
        }

        // Everything created was torn down (or a tear-down outcome was at
        // least recorded).
        for event in events.iter() {
            if let TaskEvent::ContainerCreated { container, .. } = event {
                let removed = events.iter().any(|e| match e {
                    TaskEvent::ContainerRemoved { container: c }
                    | TaskEvent::ContainerRemovalFailed { container: c, .. } => c == container,
                    _ => false,
                });
                prop_assert!(removed, "container '{}' was never removed", container);
            }
        }

        let network_created = events
            .iter()
            .any(|e| matches!(e, TaskEvent::TaskNetworkCreated { .. }));
        if network_created {
            let network_deleted = events.iter().any(|e| {
                matches!(
                    e,
                    TaskEvent::TaskNetworkDeleted | TaskEvent::TaskNetworkDeletionFailed { .. }
                )
            });
            prop_assert!(network_deleted, "the task network was never deleted");
        }
    }
}
