// tests/execution_failures.rs

//! Task-level fatal failures: errors the dispatcher cannot express as a
//! resource-specific `…Failed` event surface exactly once as
//! `ExecutionFailed`, and cleanup still runs.

mod common;

use std::sync::Arc;

use taskdock::events::TaskEvent;
use taskdock::exec::{RunOptions, TaskExitStatus};
use taskdock_test_utils::{ContainerBuilder, FakeEngineDriver, GraphBuilder};

use crate::common::{index_of, init_tracing, run_task_with};

#[tokio::test]
async fn a_failure_while_running_the_main_container_becomes_execution_failed() {
    init_tracing();

    let graph = GraphBuilder::new("build", "app")
        .with_container(ContainerBuilder::new("app", "app:latest").build())
        .build();

    let driver = Arc::new(FakeEngineDriver::new());
    driver.fail_on("run_container app-id", "Something went wrong.");

    let (status, events) =
        run_task_with(graph, Arc::clone(&driver), RunOptions::new("build")).await;

    let failures: Vec<&TaskEvent> = events
        .iter()
        .filter(|e| matches!(e, TaskEvent::ExecutionFailed { .. }))
        .collect();

    assert_eq!(failures.len(), 1, "ExecutionFailed must be posted exactly once");
    match failures[0] {
        TaskEvent::ExecutionFailed { message } => {
            assert!(
                message.contains("Something went wrong."),
                "unexpected message: {message}"
            );
        }
        _ => unreachable!(),
    }

    match status {
        TaskExitStatus::Failed { message } => {
            assert!(message.contains("Something went wrong."), "unexpected message: {message}")
        }
        other => panic!("expected failure, got {other:?}"),
    }

    // The container that was created and started still gets torn down.
    let ops = driver.operations();
    index_of(&ops, "stop_container app-id");
    index_of(&ops, "remove_container app-id");
    index_of(&ops, "delete_network net-1");
}
