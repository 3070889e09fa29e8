// tests/task_execution.rs

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use taskdock::events::{Step, TaskEvent};
use taskdock::exec::{ParallelExecutionManager, RunOptions, TaskExitStatus};
use taskdock::state::{plan_run, TaskStateMachine};
use taskdock::ui::EventLogger;
use taskdock_test_utils::{ContainerBuilder, FakeEngineDriver, GraphBuilder};

use crate::common::{index_of, init_tracing, run_task_with};

#[tokio::test]
async fn single_container_happy_path_runs_the_full_lifecycle() {
    init_tracing();

    let graph = GraphBuilder::new("build", "app")
        .with_container(ContainerBuilder::new("app", "app:latest").command("make").build())
        .build();

    let driver = Arc::new(FakeEngineDriver::new());
    let (status, events) = run_task_with(graph, Arc::clone(&driver), RunOptions::new("build")).await;

    assert_eq!(status, TaskExitStatus::Exited { exit_code: 0 });

    let ops = driver.operations();
    let pull = index_of(&ops, "pull_image app:latest");
    let create = index_of(&ops, "create_container app");
    let start = index_of(&ops, "start_container app-id");
    let run = index_of(&ops, "run_container app-id");
    let stop = index_of(&ops, "stop_container app-id");
    let remove = index_of(&ops, "remove_container app-id");
    let delete_network = index_of(&ops, "delete_network net-1");

    assert!(pull < create);
    assert!(create < start);
    assert!(start < run);
    assert!(run < stop);
    assert!(stop < remove);
    assert!(remove < delete_network);

    // Cleanup closure: the created container was removed and the network
    // deleted.
    assert!(events.iter().any(|e| matches!(
        e,
        TaskEvent::ContainerRemoved { container } if container == "app"
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, TaskEvent::TaskNetworkDeleted)));
}

#[tokio::test]
async fn main_container_exit_code_is_propagated() {
    init_tracing();

    let graph = Arc::new(
        GraphBuilder::new("build", "app")
            .with_container(ContainerBuilder::new("app", "app:latest").build())
            .build(),
    );

    let driver = Arc::new(FakeEngineDriver::new());
    driver.set_run_exit_code(3);

    // Exercise the high-level entry point rather than a hand-built manager.
    let status = timeout(
        Duration::from_secs(5),
        taskdock::exec::run_task(
            graph,
            driver,
            Arc::new(taskdock::ui::NullEventLogger),
            RunOptions::new("build"),
        ),
    )
    .await
    .expect("task did not finish within 5 seconds");

    assert_eq!(status, TaskExitStatus::Exited { exit_code: 3 });
    assert_eq!(status.exit_code(), 3);
}

#[tokio::test]
async fn additional_command_args_extend_only_the_main_container_command() {
    init_tracing();

    let graph = GraphBuilder::new("test", "app")
        .with_container(
            ContainerBuilder::new("app", "app:latest")
                .command("npm test")
                .depends_on("db")
                .build(),
        )
        .with_container(ContainerBuilder::new("db", "postgres:13").command("postgres").build())
        .build();

    let driver = Arc::new(FakeEngineDriver::new());
    let mut options = RunOptions::new("test");
    options.additional_command_args = vec!["--watch".to_string()];

    let (status, _events) = run_task_with(graph, Arc::clone(&driver), options).await;
    assert_eq!(status, TaskExitStatus::Exited { exit_code: 0 });

    let requests = driver.created_requests();
    let app = requests
        .iter()
        .find(|r| r.container_name == "app")
        .expect("app container was created");
    let db = requests
        .iter()
        .find(|r| r.container_name == "db")
        .expect("db container was created");

    assert_eq!(
        app.command,
        Some(vec!["npm".to_string(), "test".to_string(), "--watch".to_string()])
    );
    assert_eq!(db.command, Some(vec!["postgres".to_string()]));
}

#[tokio::test]
async fn containers_are_created_only_after_their_dependencies_are_ready() {
    init_tracing();

    let graph = GraphBuilder::new("build", "app")
        .with_container(ContainerBuilder::new("app", "app:latest").depends_on("db").build())
        .with_container(
            ContainerBuilder::new("db", "postgres:13")
                .with_health_check()
                .build(),
        )
        .build();

    let driver = Arc::new(FakeEngineDriver::new());
    let (status, _events) =
        run_task_with(graph, Arc::clone(&driver), RunOptions::new("build")).await;

    assert_eq!(status, TaskExitStatus::Exited { exit_code: 0 });

    let ops = driver.operations();
    let db_healthy = index_of(&ops, "wait_for_healthy db-id");
    let app_created = index_of(&ops, "create_container app");

    assert!(
        db_healthy < app_created,
        "the dependency must be healthy before its dependent is created: {ops:?}"
    );
}

/// A UI listener that checks, for every event it receives, that the state
/// machine has not yet recorded that event: the UI must always observe
/// events first.
struct UiFirstProbe {
    machine: Arc<TaskStateMachine>,
    violations: AtomicUsize,
    saw_events: AtomicBool,
}

impl EventLogger for UiFirstProbe {
    fn on_starting_task_step(&self, _step: &Step) {}

    fn post_event(&self, event: &TaskEvent) {
        self.saw_events.store(true, Ordering::SeqCst);

        let already_in_machine = self.machine.events().iter().any(|e| e == event);
        if already_in_machine {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn ui_sees_every_event_before_the_state_machine() {
    init_tracing();

    let graph = Arc::new(
        GraphBuilder::new("build", "app")
            .with_container(ContainerBuilder::new("app", "app:latest").build())
            .build(),
    );

    let machine = Arc::new(plan_run(
        Arc::clone(&graph),
        taskdock::types::BehaviourAfterFailure::Cleanup,
    ));

    let probe = Arc::new(UiFirstProbe {
        machine: Arc::clone(&machine),
        violations: AtomicUsize::new(0),
        saw_events: AtomicBool::new(false),
    });

    let manager = ParallelExecutionManager::new(
        Arc::clone(&machine),
        Arc::new(FakeEngineDriver::new()),
        Arc::clone(&probe) as Arc<dyn EventLogger>,
        RunOptions::new("build"),
    );

    let status = timeout(Duration::from_secs(5), manager.run())
        .await
        .expect("task did not finish within 5 seconds");

    assert_eq!(status, TaskExitStatus::Exited { exit_code: 0 });
    assert!(probe.saw_events.load(Ordering::SeqCst));
    assert_eq!(
        probe.violations.load(Ordering::SeqCst),
        0,
        "the state machine observed an event before the UI did"
    );
}

#[tokio::test]
async fn a_shared_image_is_pulled_only_once() {
    init_tracing();

    let graph = GraphBuilder::new("build", "app")
        .with_container(
            ContainerBuilder::new("app", "shared:1")
                .depends_on("worker")
                .build(),
        )
        .with_container(ContainerBuilder::new("worker", "shared:1").build())
        .build();

    let driver = Arc::new(FakeEngineDriver::new());
    let (status, _events) =
        run_task_with(graph, Arc::clone(&driver), RunOptions::new("build")).await;

    assert_eq!(status, TaskExitStatus::Exited { exit_code: 0 });

    let pulls = driver
        .operations()
        .iter()
        .filter(|op| op.as_str() == "pull_image shared:1")
        .count();

    assert_eq!(pulls, 1);
}
