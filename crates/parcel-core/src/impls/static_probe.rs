//! StaticQueueProbe - 開発用のキュー深さ
//!
//! テストから深さを差し替えられる QueueProbe です。

use crate::ports::{ExecutionError, QueueProbe};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct StaticQueueProbe {
    depths: Mutex<HashMap<String, u64>>,
}

impl StaticQueueProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_depth(&self, queue_path: impl Into<String>, depth: u64) {
        self.depths.lock().await.insert(queue_path.into(), depth);
    }

    /// キューを消して到達不能にする
    pub async fn remove(&self, queue_path: &str) {
        self.depths.lock().await.remove(queue_path);
    }
}

#[async_trait]
impl QueueProbe for StaticQueueProbe {
    async fn depth(&self, queue_path: &str) -> Result<u64, ExecutionError> {
        self.depths
            .lock()
            .await
            .get(queue_path)
            .copied()
            .ok_or_else(|| ExecutionError::unavailable(queue_path, "queue not found"))
    }
}
