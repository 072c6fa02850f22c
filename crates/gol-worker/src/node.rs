// In-process ComputeNode backed by a shared StripPool.

use std::sync::Arc;

use async_trait::async_trait;

use gol_types::{BandRequest, BandResult, ComputeNode, GolError, Result};

use crate::pool::StripPool;

/// Runs bands on the local strip pool. The pool's blocking wait is moved
/// onto tokio's blocking threads so the calling task's runtime stays free.
#[derive(Clone)]
pub struct LocalNode {
    name: String,
    pool: Arc<StripPool>,
}

impl LocalNode {
    pub fn new(name: impl Into<String>, threads: usize) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            pool: Arc::new(StripPool::new(threads)?),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.threads()
    }
}

#[async_trait]
impl ComputeNode for LocalNode {
    fn label(&self) -> String {
        self.name.clone()
    }

    async fn next_state(&self, band: BandRequest) -> Result<BandResult> {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || pool.compute(band))
            .await
            .map_err(|e| GolError::Internal(format!("strip task panicked: {e}")))?
    }

    /// Nothing to tear down in-process; the pool stops when the last clone
    /// is dropped.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
