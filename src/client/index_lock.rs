//! In-process lock that serializes analyze runs per project
//!
//! The first caller for a project runs the pipeline. Callers arriving while it runs
//! subscribe to a broadcast channel and receive the same result.

use crate::types::AnalyzeResponse;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tokio::sync::broadcast;

/// What waiters receive: the run's response, or its error chain as text
pub(crate) type SharedAnalyzeResult = Result<AnalyzeResponse, String>;

pub(crate) type IndexLocks = Arc<RwLock<HashMap<String, IndexingOperation>>>;

/// State for an in-progress analyze run
pub(crate) struct IndexingOperation {
    result_tx: broadcast::Sender<SharedAnalyzeResult>,
    /// Cleared before the result is broadcast, so a finished entry awaiting removal
    /// is never subscribed to
    active: Arc<AtomicBool>,
}

pub(crate) enum IndexLockResult {
    /// This caller runs the pipeline
    Acquired(IndexLockGuard),
    /// Another run for the project is in progress
    WaitForResult(broadcast::Receiver<SharedAnalyzeResult>),
}

/// Held by the running caller; removes the map entry on release or drop
pub(crate) struct IndexLockGuard {
    project_id: String,
    locks_map: IndexLocks,
    result_tx: broadcast::Sender<SharedAnalyzeResult>,
    active: Arc<AtomicBool>,
    released: bool,
}

/// Try to become the runner for `project_id`
pub(crate) async fn try_acquire(locks_map: &IndexLocks, project_id: &str) -> IndexLockResult {
    let mut ops = locks_map.write().await;

    if let Some(existing) = ops.get(project_id) {
        if existing.active.load(Ordering::Acquire) {
            tracing::info!(
                "Analyze already in progress for project {}, waiting for result",
                project_id
            );
            return IndexLockResult::WaitForResult(existing.result_tx.subscribe());
        }
        tracing::debug!("Removing finished analyze lock for project {}", project_id);
        ops.remove(project_id);
    }

    // One result per run
    let (result_tx, _) = broadcast::channel(1);
    let active = Arc::new(AtomicBool::new(true));
    ops.insert(
        project_id.to_string(),
        IndexingOperation {
            result_tx: result_tx.clone(),
            active: active.clone(),
        },
    );

    IndexLockResult::Acquired(IndexLockGuard {
        project_id: project_id.to_string(),
        locks_map: locks_map.clone(),
        result_tx,
        active,
        released: false,
    })
}

impl IndexLockGuard {
    pub(crate) fn broadcast_result(&self, result: &SharedAnalyzeResult) {
        self.active.store(false, Ordering::Release);
        // No receivers is fine
        let _ = self.result_tx.send(result.clone());
    }

    /// Remove the lock entry before returning to the caller
    pub(crate) async fn release(mut self) {
        let mut ops = self.locks_map.write().await;
        remove_if_owned(&mut ops, &self.project_id, &self.active);
        self.released = true;
    }
}

/// A newer run may already have replaced a finished entry; leave that one alone
fn remove_if_owned(
    ops: &mut HashMap<String, IndexingOperation>,
    project_id: &str,
    active: &Arc<AtomicBool>,
) {
    if ops
        .get(project_id)
        .is_some_and(|op| Arc::ptr_eq(&op.active, active))
    {
        ops.remove(project_id);
    }
}

impl Drop for IndexLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        // Reached on panic or cancellation of the running future
        self.active.store(false, Ordering::Release);
        let _ = self
            .result_tx
            .send(Err("Analyze run was interrupted before completing".to_string()));

        tracing::warn!(
            "Analyze lock for project {} dropped without release",
            self.project_id
        );

        let project_id = self.project_id.clone();
        let locks_map = self.locks_map.clone();
        let active = self.active.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                remove_if_owned(&mut *locks_map.write().await, &project_id, &active);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalysisMode;

    fn response(project_id: &str) -> AnalyzeResponse {
        AnalyzeResponse {
            project_id: project_id.to_string(),
            mode: AnalysisMode::Full,
            files_processed: 2,
            chunks_indexed: 5,
            embeddings_generated: 5,
            changed_files: Vec::new(),
            chunks_pruned: 0,
            dependency_edges: 3,
            transitive_dependencies: 4,
            total_chunks: 5,
            revision: Some("abc".to_string()),
            duration_ms: 10,
            errors: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_second_caller_waits_for_broadcast() {
        let locks: IndexLocks = Arc::default();

        let guard = match try_acquire(&locks, "p").await {
            IndexLockResult::Acquired(guard) => guard,
            IndexLockResult::WaitForResult(_) => panic!("first caller should acquire"),
        };
        let mut receiver = match try_acquire(&locks, "p").await {
            IndexLockResult::WaitForResult(rx) => rx,
            IndexLockResult::Acquired(_) => panic!("second caller should wait"),
        };

        guard.broadcast_result(&Ok(response("p")));
        guard.release().await;

        let received = receiver.recv().await.unwrap().unwrap();
        assert_eq!(received.chunks_indexed, 5);
        assert!(locks.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_projects_lock_independently() {
        let locks: IndexLocks = Arc::default();
        let _a = try_acquire(&locks, "a").await;
        assert!(matches!(
            try_acquire(&locks, "b").await,
            IndexLockResult::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_finished_entry_is_replaced() {
        let locks: IndexLocks = Arc::default();
        let IndexLockResult::Acquired(guard) = try_acquire(&locks, "p").await else {
            panic!("expected to acquire");
        };
        guard.broadcast_result(&Ok(response("p")));

        // Result sent but entry not yet removed
        let IndexLockResult::Acquired(next) = try_acquire(&locks, "p").await else {
            panic!("finished run must not be waited on");
        };

        // The stale guard must not evict the newer run
        guard.release().await;
        assert!(matches!(
            try_acquire(&locks, "p").await,
            IndexLockResult::WaitForResult(_)
        ));
        next.release().await;
        assert!(locks.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_drop_without_release_notifies_waiters() {
        let locks: IndexLocks = Arc::default();
        let IndexLockResult::Acquired(guard) = try_acquire(&locks, "p").await else {
            panic!("expected to acquire");
        };
        let IndexLockResult::WaitForResult(mut receiver) = try_acquire(&locks, "p").await else {
            panic!("expected to wait");
        };

        drop(guard);

        let err = receiver.recv().await.unwrap().unwrap_err();
        assert!(err.contains("interrupted"));
    }
}
