//! Live run tracking: status snapshots, prompt delivery, cancellation.

use forge_types::{OperationId, StepRecord, WorkflowState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Snapshot of one run's progress, safe to hand to callers.
#[derive(Clone, Debug)]
pub struct RunStatus {
    pub operation: OperationId,
    pub state: WorkflowState,
    pub steps: Vec<StepRecord>,
    /// Prompt key the run is suspended on, if any
    pub pending_prompt: Option<String>,
}

pub(crate) struct RunInner {
    pub state: WorkflowState,
    pub steps: Vec<StepRecord>,
    pub pending_prompt: Option<String>,
    pub inputs: HashMap<String, String>,
    pub cancel_requested: bool,
}

/// Shared state for one in-flight run. The executor task mutates it; the
/// caller-facing registry reads it and wakes the task via `notify`.
pub(crate) struct RunShared {
    pub operation: OperationId,
    pub inner: Mutex<RunInner>,
    pub notify: Notify,
}

impl RunShared {
    pub fn new(operation: OperationId, steps: Vec<StepRecord>) -> Arc<Self> {
        Arc::new(Self {
            operation,
            inner: Mutex::new(RunInner {
                state: WorkflowState::Pending,
                steps,
                pending_prompt: None,
                inputs: HashMap::new(),
                cancel_requested: false,
            }),
            notify: Notify::new(),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, RunInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn status(&self) -> RunStatus {
        let inner = self.lock();
        RunStatus {
            operation: self.operation.clone(),
            state: inner.state,
            steps: inner.steps.clone(),
            pending_prompt: inner.pending_prompt.clone(),
        }
    }
}

/// Registry of in-flight runs, keyed by operation id.
#[derive(Default)]
pub(crate) struct RunRegistry {
    runs: Mutex<HashMap<OperationId, Arc<RunShared>>>,
}

impl RunRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<OperationId, Arc<RunShared>>> {
        match self.runs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn register(&self, run: Arc<RunShared>) {
        self.lock().insert(run.operation.clone(), run);
    }

    pub fn remove(&self, operation: &OperationId) {
        self.lock().remove(operation);
    }

    pub fn get(&self, operation: &OperationId) -> Option<Arc<RunShared>> {
        self.lock().get(operation).cloned()
    }
}
