#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use tokio::time::timeout;

use taskdock::events::TaskEvent;
use taskdock::exec::{ParallelExecutionManager, RunOptions, TaskExitStatus};
use taskdock::state::plan_run;
use taskdock::task::ContainerGraph;
use taskdock::ui::NullEventLogger;
use taskdock_test_utils::FakeEngineDriver;

/// Route execution-engine tracing through the test harness's per-test
/// capture. Every test calls this; `try_init` makes the second and later
/// calls no-ops, so no one-time guard is needed. Override the default
/// `debug` verbosity with `RUST_LOG` (e.g. `RUST_LOG=taskdock=trace`)
/// when digging into a failure.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Run a task on the fake driver and return its status plus the final event
/// log. Panics if the run does not finish within five seconds.
pub async fn run_task_with(
    graph: ContainerGraph,
    driver: Arc<FakeEngineDriver>,
    options: RunOptions,
) -> (TaskExitStatus, Vec<TaskEvent>) {
    let graph = Arc::new(graph);
    let machine = Arc::new(plan_run(Arc::clone(&graph), options.behaviour_after_failure));

    let manager = ParallelExecutionManager::new(
        Arc::clone(&machine),
        driver,
        Arc::new(NullEventLogger),
        options,
    );

    let status = timeout(Duration::from_secs(5), manager.run())
        .await
        .expect("task did not finish within 5 seconds");

    (status, machine.events())
}

/// Position of `key` in the recorded operations; panics when absent.
pub fn index_of(operations: &[String], key: &str) -> usize {
    operations
        .iter()
        .position(|op| op == key)
        .unwrap_or_else(|| panic!("operation '{key}' not found in {operations:?}"))
}
