// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exec;
pub mod logging;
pub mod state;
pub mod task;
pub mod types;
pub mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::engine::DockerDriver;
use crate::events::TaskEvent;
use crate::exec::{ParallelExecutionManager, RunOptions, TaskExitStatus};
use crate::state::plan_run;
use crate::task::ContainerGraph;
use crate::types::BehaviourAfterFailure;
use crate::ui::ConsoleEventLogger;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - the resolved container graph for the requested task
/// - the state machine, Docker driver, console UI and execution manager
/// - Ctrl-C handling
///
/// Returns the process exit code to report.
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    let task = cfg
        .task(&args.task)
        .ok_or_else(|| errors::TaskdockError::TaskNotFound(args.task.clone()))?;

    let containers = cfg.containers()?;
    let graph = Arc::new(ContainerGraph::resolve(
        &args.task,
        &task.container,
        &containers,
    )?);

    if args.dry_run {
        print_dry_run(&graph);
        return Ok(0);
    }

    if args.level_of_parallelism < 1 {
        bail!("--level-of-parallelism must be at least 1");
    }

    let mut additional_command_args = task.command_args.clone();
    additional_command_args.extend(args.task_args.iter().cloned());

    let options = RunOptions {
        task_name: args.task.clone(),
        additional_command_args,
        level_of_parallelism: args.level_of_parallelism,
        behaviour_after_failure: if args.no_cleanup_after_failure {
            BehaviourAfterFailure::DoNotCleanup
        } else {
            BehaviourAfterFailure::Cleanup
        },
        is_interruptible: !args.no_interrupt_handling,
    };

    let driver = Arc::new(DockerDriver::new().map_err(anyhow::Error::new)?);
    let ui = Arc::new(ConsoleEventLogger::new());
    let machine = Arc::new(plan_run(
        Arc::clone(&graph),
        options.behaviour_after_failure,
    ));

    let is_interruptible = options.is_interruptible;
    let mut manager = ParallelExecutionManager::new(machine, driver, ui, options);

    if let Some(path) = &args.log_file {
        manager = manager.with_diagnostics(Arc::new(logging::open_structured_log(path)?));
    }

    // Ctrl-C → graceful cleanup: post the interrupt through the manager's
    // sink so the UI sees it before the state machine reacts.
    if is_interruptible {
        let sink = manager.event_sink();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            sink.post(TaskEvent::UserInterruptedExecution);
        });
    }

    let status = manager.run().await;

    match &status {
        TaskExitStatus::Exited { exit_code } => {
            info!(exit_code, "task finished");
        }
        TaskExitStatus::Interrupted => {
            eprintln!("taskdock: interrupted");
        }
        TaskExitStatus::Failed { message } => {
            eprintln!("taskdock: {message}");
        }
    }

    Ok(status.exit_code())
}

/// Simple dry-run output: print the task's containers, images and
/// dependencies.
fn print_dry_run(graph: &ContainerGraph) {
    println!("taskdock dry-run");
    println!("  task: {}", graph.task_name());
    println!("  main container: {}", graph.main_container_name());
    println!();

    println!("containers ({}):", graph.len());
    for container in graph.containers() {
        println!("  - {}", container.name);
        match &container.image_source {
            task::ImageSource::Build { directory } => {
                println!("      build: {}", directory.display())
            }
            task::ImageSource::Pull { image } => println!("      image: {image}"),
        }
        if let Some(command) = &container.command {
            println!("      command: {command}");
        }
        if !container.dependencies.is_empty() {
            println!("      dependencies: {:?}", container.dependencies);
        }
        if container.has_health_check() {
            println!("      health check: yes");
        }
    }

    debug!("dry-run complete (no execution)");
}
