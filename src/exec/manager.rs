// src/exec/manager.rs

//! The parallel execution manager: drains the state machine with a bounded
//! pool of Tokio workers and funnels events back through the UI listener
//! into the state machine.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::EngineDriver;
use crate::events::TaskEvent;
use crate::exec::runner::run_step;
use crate::exec::{EventSink, RunOptions, TaskExitStatus, WakeSignal};
use crate::logging::{Severity, StructuredLogWriter};
use crate::state::TaskStateMachine;
use crate::ui::EventLogger;

/// Runs one task to completion.
///
/// The main loop repeatedly asks the state machine for a step and hands it
/// to a worker, spawning up to `level_of_parallelism` workers. When no step
/// is enabled but workers are active, it waits for a wake signal (a posted
/// event or a finished worker). When no step is enabled, no worker is
/// active and the machine reports finished, the run is over and the exit
/// status is derived from the event log.
pub struct ParallelExecutionManager {
    machine: Arc<TaskStateMachine>,
    driver: Arc<dyn EngineDriver>,
    ui: Arc<dyn EventLogger>,
    options: Arc<RunOptions>,
    diagnostics: Option<Arc<StructuredLogWriter>>,
    wake_tx: mpsc::UnboundedSender<WakeSignal>,
    wake_rx: mpsc::UnboundedReceiver<WakeSignal>,
}

impl ParallelExecutionManager {
    pub fn new(
        machine: Arc<TaskStateMachine>,
        driver: Arc<dyn EngineDriver>,
        ui: Arc<dyn EventLogger>,
        options: RunOptions,
    ) -> Self {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();

        Self {
            machine,
            driver,
            ui,
            options: Arc::new(options),
            diagnostics: None,
            wake_tx,
            wake_rx,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<StructuredLogWriter>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// A sink for posting events from outside the worker loop (e.g. a
    /// signal handler posting `UserInterruptedExecution`). Obeys the same
    /// UI-first, state-machine-second ordering as worker sinks.
    pub fn event_sink(&self) -> EventSink {
        EventSink::new(
            Arc::clone(&self.ui),
            Arc::clone(&self.machine),
            self.wake_tx.clone(),
        )
    }

    pub async fn run(mut self) -> TaskExitStatus {
        info!(
            task = %self.options.task_name,
            level_of_parallelism = self.options.level_of_parallelism,
            "starting task execution"
        );

        let mut active: usize = 0;

        loop {
            while active < self.options.level_of_parallelism {
                match self.machine.pop_next_step(active > 0) {
                    Some(step) => {
                        self.ui.on_starting_task_step(&step);
                        self.diagnose(Severity::Debug, "Starting step.", &step.to_string());
                        active += 1;
                        self.spawn_worker(step);
                    }
                    None => break,
                }
            }

            if active == 0 {
                if self.machine.is_finished() {
                    break;
                }

                // pop_next_step(false) either returned a step or forced the
                // Running → CleaningUp transition, so an unfinished machine
                // with nothing to do cannot happen. Bail out rather than
                // wait for a wake-up that will never come.
                warn!("no step enabled and no worker active, but the state machine is not finished");
                break;
            }

            match self.wake_rx.recv().await {
                Some(WakeSignal::WorkerFinished) => {
                    active -= 1;
                    debug!(active, "worker finished");
                }
                Some(WakeSignal::EventPosted) => {}
                None => break,
            }
        }

        let events = self.machine.events();
        let status = TaskExitStatus::from_events(&events, self.machine.graph());

        info!(task = %self.options.task_name, ?status, "task execution finished");
        if let Some(diagnostics) = &self.diagnostics {
            diagnostics.log(
                Severity::Info,
                "Task execution finished.",
                &[
                    ("task", json!(self.options.task_name)),
                    ("events", json!(events.len())),
                ],
            );
        }

        status
    }

    fn spawn_worker(&self, step: crate::events::Step) {
        let sink = self.event_sink();
        let driver = Arc::clone(&self.driver);
        let graph = Arc::clone(self.machine.graph());
        let options = Arc::clone(&self.options);
        let wake = self.wake_tx.clone();

        let worker = tokio::spawn(async move {
            run_step(&step, &sink, driver.as_ref(), &graph, &options).await
        });

        let sink = self.event_sink();
        tokio::spawn(async move {
            match worker.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    // A bug or precondition violation, not an engine
                    // refusal: surface it exactly once as a task-level
                    // failure.
                    sink.post(TaskEvent::ExecutionFailed {
                        message: format!("{error:#}"),
                    });
                }
                Err(join_error) => {
                    sink.post(TaskEvent::ExecutionFailed {
                        message: format!("step worker panicked: {join_error}"),
                    });
                }
            }

            let _ = wake.send(WakeSignal::WorkerFinished);
        });
    }

    fn diagnose(&self, severity: Severity, message: &str, step: &str) {
        if let Some(diagnostics) = &self.diagnostics {
            diagnostics.log(severity, message, &[("step", json!(step))]);
        }
    }
}
