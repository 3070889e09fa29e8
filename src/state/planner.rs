// src/state/planner.rs

//! Stage planning: constructing the initial state machine for a task.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::state::TaskStateMachine;
use crate::task::ContainerGraph;
use crate::types::BehaviourAfterFailure;

/// Plan a normal run: a machine at the start of the Running stage, with
/// image preparation for every container and task-network creation
/// immediately enabled.
pub fn plan_run(
    graph: Arc<ContainerGraph>,
    behaviour_after_failure: BehaviourAfterFailure,
) -> TaskStateMachine {
    debug!(
        task = graph.task_name(),
        containers = graph.len(),
        main = %graph.main_container_name(),
        "planning run stage"
    );

    TaskStateMachine::new(graph, behaviour_after_failure)
}

/// A task-level fatal failure before any step could run: planning is
/// bypassed and execution begins directly in cleanup, with no resources to
/// tear down.
pub fn plan_fatal_failure(graph: Arc<ContainerGraph>, message: String) -> TaskStateMachine {
    warn!(
        task = graph.task_name(),
        message = %message,
        "task failed before execution; starting directly in cleanup"
    );

    TaskStateMachine::for_fatal_failure(graph, message)
}
