//! A scriptable in-memory [`EngineDriver`] for tests.
//!
//! The fake records every operation in order, can inject failures and
//! delays per operation, can park operations on a barrier (to prove that
//! two operations really do run concurrently), and tracks the maximum
//! number of operations that were ever in flight at once (to prove the
//! parallelism bound).
//!
//! Operations are keyed by short strings such as `"pull_image postgres:13"`
//! or `"create_container app"`; container ids are derived from container
//! names as `"<name>-id"` so tests can predict them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Barrier;

use taskdock::engine::{
    BuildProgress, ContainerCreationRequest, DriverError, EngineDriver,
};
use taskdock::task::{Container, HealthCheckOptions};

#[derive(Default)]
pub struct FakeEngineDriver {
    operations: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, String>>,
    delays: Mutex<HashMap<String, Duration>>,
    barriers: Mutex<HashMap<String, Arc<Barrier>>>,
    created_requests: Mutex<Vec<ContainerCreationRequest>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    run_exit_code: AtomicI64,
}

impl FakeEngineDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the operation with this key fail with the given message.
    pub fn fail_on(&self, key: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(key.to_string(), message.to_string());
    }

    /// Delay the operation with this key before it completes.
    pub fn delay_on(&self, key: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(key.to_string(), delay);
    }

    /// Park the operation with this key on a barrier. Registering the same
    /// barrier for two keys proves the two operations overlap in time:
    /// neither can finish until both have started.
    pub fn barrier_on(&self, key: &str, barrier: Arc<Barrier>) {
        self.barriers
            .lock()
            .unwrap()
            .insert(key.to_string(), barrier);
    }

    /// Exit code reported by `run_container` (default 0).
    pub fn set_run_exit_code(&self, code: i64) {
        self.run_exit_code.store(code, Ordering::SeqCst);
    }

    /// Every operation performed so far, in order.
    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().unwrap().clone()
    }

    pub fn operation_index(&self, key: &str) -> Option<usize> {
        self.operations.lock().unwrap().iter().position(|op| op == key)
    }

    /// The largest number of operations that were ever in flight at once.
    pub fn max_concurrent_operations(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Container creation requests, in order.
    pub fn created_requests(&self) -> Vec<ContainerCreationRequest> {
        self.created_requests.lock().unwrap().clone()
    }

    async fn operation(&self, key: String) -> Result<(), DriverError> {
        self.operations.lock().unwrap().push(key.clone());

        let n = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(n, Ordering::SeqCst);

        let barrier = self.barriers.lock().unwrap().get(&key).cloned();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }

        let delay = self.delays.lock().unwrap().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        let failure = self.failures.lock().unwrap().get(&key).cloned();
        match failure {
            Some(message) => Err(DriverError::Api(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EngineDriver for FakeEngineDriver {
    async fn build_image(
        &self,
        container: &Container,
        _on_progress: &(dyn Fn(BuildProgress) + Send + Sync),
    ) -> Result<String, DriverError> {
        self.operation(format!("build_image {}", container.name))
            .await?;
        Ok(format!("{}-image", container.name))
    }

    async fn pull_image(
        &self,
        image: &str,
        _on_progress: &(dyn Fn(String) + Send + Sync),
    ) -> Result<(), DriverError> {
        self.operation(format!("pull_image {image}")).await
    }

    async fn create_network(&self, name: &str) -> Result<String, DriverError> {
        self.operation(format!("create_network {name}")).await?;
        Ok("net-1".to_string())
    }

    async fn create_container(
        &self,
        request: &ContainerCreationRequest,
    ) -> Result<String, DriverError> {
        self.operation(format!("create_container {}", request.container_name))
            .await?;
        self.created_requests.lock().unwrap().push(request.clone());
        Ok(format!("{}-id", request.container_name))
    }

    async fn start_container(&self, container_id: &str) -> Result<(), DriverError> {
        self.operation(format!("start_container {container_id}")).await
    }

    async fn wait_for_healthy(
        &self,
        container_id: &str,
        _check: &HealthCheckOptions,
    ) -> Result<(), DriverError> {
        self.operation(format!("wait_for_healthy {container_id}")).await
    }

    async fn run_container(
        &self,
        container_id: &str,
        _on_output: Arc<dyn for<'a> Fn(&'a str) + Send + Sync>,
    ) -> Result<i64, DriverError> {
        self.operation(format!("run_container {container_id}")).await?;
        Ok(self.run_exit_code.load(Ordering::SeqCst))
    }

    async fn stop_container(&self, container_id: &str) -> Result<(), DriverError> {
        self.operation(format!("stop_container {container_id}")).await
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), DriverError> {
        self.operation(format!("remove_container {container_id}")).await
    }

    async fn delete_network(&self, network_id: &str) -> Result<(), DriverError> {
        self.operation(format!("delete_network {network_id}")).await
    }
}
