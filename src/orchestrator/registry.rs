//! Registry of activations and batches currently running.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use crate::error::{Result, TaskloopError};
use crate::types::ExecutionId;

type Runs = HashMap<ExecutionId, CancellationToken>;

/// Tracks at most one running activation or batch per execution.
#[derive(Debug, Clone, Default)]
pub struct ActiveRuns {
    runs: Arc<Mutex<Runs>>,
}

impl ActiveRuns {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Runs> {
        self.runs.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Claim the slot for `execution_id`. The slot is released when the
    /// returned guard drops.
    pub fn register(&self, execution_id: ExecutionId) -> Result<RunGuard> {
        let mut runs = self.lock();
        if runs.contains_key(&execution_id) {
            return Err(TaskloopError::InvalidState(format!(
                "execution {execution_id} is already running"
            )));
        }
        let token = CancellationToken::new();
        runs.insert(execution_id, token.clone());
        Ok(RunGuard {
            execution_id,
            token,
            runs: self.clone(),
        })
    }

    pub fn is_active(&self, execution_id: ExecutionId) -> bool {
        self.lock().contains_key(&execution_id)
    }

    /// Trip the token of a running execution. Returns whether one was running.
    pub fn cancel(&self, execution_id: ExecutionId) -> bool {
        match self.lock().get(&execution_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for token in self.lock().values() {
            token.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ownership of a registry slot, held by the running task.
#[derive(Debug)]
pub struct RunGuard {
    execution_id: ExecutionId,
    token: CancellationToken,
    runs: ActiveRuns,
}

impl RunGuard {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.runs.lock().remove(&self.execution_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn one_run_per_execution() {
        let runs = ActiveRuns::new();
        let id = Uuid::new_v4();
        let guard = runs.register(id).unwrap();
        assert!(runs.register(id).is_err());
        assert!(runs.is_active(id));
        drop(guard);
        assert!(!runs.is_active(id));
        assert!(runs.register(id).is_ok());
    }

    #[test]
    fn cancel_trips_the_token() {
        let runs = ActiveRuns::new();
        let id = Uuid::new_v4();
        let guard = runs.register(id).unwrap();
        assert!(runs.cancel(id));
        assert!(guard.token().is_cancelled());
        assert!(!runs.cancel(Uuid::new_v4()));
    }

    #[test]
    fn cancel_all_reaches_every_run() {
        let runs = ActiveRuns::new();
        let a = runs.register(Uuid::new_v4()).unwrap();
        let b = runs.register(Uuid::new_v4()).unwrap();
        assert_eq!(runs.len(), 2);
        runs.cancel_all();
        assert!(a.token().is_cancelled() && b.token().is_cancelled());
    }
}
