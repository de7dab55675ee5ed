//! Ports - 外部の協調者へのインターフェース
//!
//! 再構築したドメインオブジェクトは、実行時にここで定義した trait を通して
//! 外部のシステム（画像処理パイプライン、キュー、時計）に触れます。
//! 実装は協調者側が持ちます。開発・テスト用の実装は `impls` にあります。
//!
//! 協調者が返したエラーは `ExecutionError` としてそのまま呼び出し側に返し、
//! 再構築の段階で握りつぶすことはありません。

pub mod clock;
pub mod page_imaging;
pub mod queue_probe;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::page_imaging::{PageImaging, PageRef};
pub use self::queue_probe::QueueProbe;

/// ExecutionError はドメインオブジェクトの実行時エラー
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("resource '{resource}' is unavailable: {reason}")]
    Unavailable { resource: String, reason: String },

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("collaborator failed: {0}")]
    Collaborator(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ExecutionError {
    pub fn unavailable(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            resource: resource.into(),
            reason: reason.into(),
        }
    }
}
