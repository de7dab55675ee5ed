//! PageImaging port - 画像処理パイプライン
//!
//! CombinePages の実行に使います。OCR やページ画像の実体は協調者側の責務です。

use super::ExecutionError;
use async_trait::async_trait;

/// 1 ページへの参照（ページ番号は 1 始まり）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageRef {
    pub document: String,
    pub page: u32,
}

impl PageRef {
    pub fn new(document: impl Into<String>, page: u32) -> Self {
        Self {
            document: document.into(),
            page,
        }
    }
}

/// PageImaging はドキュメントのページを読み書きする
#[async_trait]
pub trait PageImaging: Send + Sync {
    /// ドキュメントのページ数
    async fn page_count(&self, document: &str) -> Result<u32, ExecutionError>;

    /// `pages` を順番どおりに `output` へ書き出す
    ///
    /// `update_data` が true なら、書き出し後に索引データも更新する。
    async fn combine(
        &self,
        pages: &[PageRef],
        output: &str,
        update_data: bool,
    ) -> Result<(), ExecutionError>;
}
