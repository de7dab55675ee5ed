//! QueueProbe port - キューの深さを計測する

use super::ExecutionError;
use async_trait::async_trait;

/// QueueProbe はキューに溜まっているメッセージ数を返す
///
/// # Thread Safety
/// - 複数の計測タスクから同時に呼ばれるため `Send + Sync` を要求
#[async_trait]
pub trait QueueProbe: Send + Sync {
    async fn depth(&self, queue_path: &str) -> Result<u64, ExecutionError>;
}
