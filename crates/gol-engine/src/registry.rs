//! Ordered registry of live worker handles.
//!
//! Order is significant: band `i` goes to the `i`-th live worker. Eviction
//! filters the sequence and never reorders the survivors.

use std::sync::Arc;

use gol_types::{ComputeNode, WorkerId};

#[derive(Clone)]
pub struct RegisteredWorker {
    pub id: WorkerId,
    pub node: Arc<dyn ComputeNode>,
}

#[derive(Default)]
pub struct WorkerRegistry {
    next_id: u64,
    workers: Vec<RegisteredWorker>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handle. Every call yields a fresh id, even for a node that
    /// was registered before.
    pub fn register(&mut self, node: Arc<dyn ComputeNode>) -> WorkerId {
        let id = WorkerId(self.next_id);
        self.next_id += 1;
        self.workers.push(RegisteredWorker { id, node });
        id
    }

    /// Remove every listed worker. Returns how many were actually removed.
    pub fn evict(&mut self, ids: &[WorkerId]) -> usize {
        let before = self.workers.len();
        self.workers.retain(|w| !ids.contains(&w.id));
        before - self.workers.len()
    }

    /// Copy of the live sequence, taken once per turn.
    pub fn snapshot(&self) -> Vec<RegisteredWorker> {
        self.workers.clone()
    }

    /// Remove and return every worker.
    pub fn drain(&mut self) -> Vec<RegisteredWorker> {
        std::mem::take(&mut self.workers)
    }

    pub fn ids(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|w| w.id).collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
