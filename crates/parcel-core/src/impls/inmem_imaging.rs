//! InMemoryImaging - 開発用の画像処理パイプライン
//!
//! ドキュメント名とページ数だけを保持し、combine の呼び出しを記録します。

use crate::ports::{ExecutionError, PageImaging, PageRef};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// 記録された combine 呼び出し
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineCall {
    pub pages: Vec<PageRef>,
    pub output: String,
    pub update_data: bool,
}

/// InMemoryImaging は開発用の PageImaging
///
/// # 使用例
/// ```ignore
/// let imaging = InMemoryImaging::new().with_document("a.tif", 5);
/// settings.execute(&imaging).await?;
/// assert_eq!(imaging.calls().await.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryImaging {
    documents: HashMap<String, u32>,
    calls: Mutex<Vec<CombineCall>>,
}

impl InMemoryImaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, name: impl Into<String>, pages: u32) -> Self {
        self.documents.insert(name.into(), pages);
        self
    }

    pub async fn calls(&self) -> Vec<CombineCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl PageImaging for InMemoryImaging {
    async fn page_count(&self, document: &str) -> Result<u32, ExecutionError> {
        self.documents
            .get(document)
            .copied()
            .ok_or_else(|| ExecutionError::unavailable(document, "document not found"))
    }

    async fn combine(
        &self,
        pages: &[PageRef],
        output: &str,
        update_data: bool,
    ) -> Result<(), ExecutionError> {
        for page in pages {
            let count = self.page_count(&page.document).await?;
            if page.page == 0 || page.page > count {
                return Err(ExecutionError::Rejected(format!(
                    "{} has no page {}",
                    page.document, page.page
                )));
            }
        }
        self.calls.lock().await.push(CombineCall {
            pages: pages.to_vec(),
            output: output.to_string(),
            update_data,
        });
        Ok(())
    }
}
