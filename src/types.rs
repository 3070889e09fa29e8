use serde::Deserialize;

/// What to do with resources that were created before a task failed.
///
/// - `Cleanup` (default): stop and remove everything that was created, then
///   delete the task network.
/// - `DoNotCleanup`: leave containers and the network behind so they can be
///   inspected; the exit status reports what remained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviourAfterFailure {
    Cleanup,
    DoNotCleanup,
}

impl Default for BehaviourAfterFailure {
    fn default() -> Self {
        BehaviourAfterFailure::Cleanup
    }
}
