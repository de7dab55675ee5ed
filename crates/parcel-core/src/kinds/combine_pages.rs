//! CombinePages - ファイル処理タスクの設定
//!
//! 複数ドキュメントのページ範囲を 1 つの出力ファイルにまとめます。
//!
//! ```json
//! {"Type":"CombinePages","Enabled":true,
//!  "Object":{"PageSources":[{"Document":"a.tif","Pages":"1-3"}],"OutputPath":"out.tif","UpdateData":false}}
//! ```

use crate::ports::{ExecutionError, PageImaging, PageRef};
use crate::typed::{DomainObject, Payload, ReconstructionError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PageSourceDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
}

/// CombinePages の DTO（唯一のバージョン）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CombinePagesTaskSettingsV1 {
    #[serde(default)]
    pub page_sources: Vec<PageSourceDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default)]
    pub update_data: bool,
}

impl Payload for CombinePagesTaskSettingsV1 {
    const TAG: &'static str = "CombinePages";
}

/// ページ範囲 (`"1-3"`, `"2"`, `"1,4-5"`)。ページ番号は 1 始まり
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRange {
    spans: Vec<(u32, u32)>,
}

impl PageRange {
    pub fn single(page: u32) -> Result<Self, String> {
        Self::span(page, page)
    }

    pub fn span(first: u32, last: u32) -> Result<Self, String> {
        if first == 0 {
            return Err("page numbers start at 1".to_string());
        }
        if last < first {
            return Err(format!("range {first}-{last} is reversed"));
        }
        Ok(Self {
            spans: vec![(first, last)],
        })
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.spans.iter().flat_map(|&(first, last)| first..=last)
    }

    pub fn last_page(&self) -> u32 {
        self.spans.iter().map(|&(_, last)| last).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.spans
            .iter()
            .map(|&(first, last)| (last - first + 1) as usize)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

impl FromStr for PageRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut spans = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(format!("empty segment in '{s}'"));
            }
            let (first, last) = match part.split_once('-') {
                Some((a, b)) => (parse_page(a)?, parse_page(b)?),
                None => {
                    let page = parse_page(part)?;
                    (page, page)
                }
            };
            spans.extend(Self::span(first, last)?.spans);
        }
        Ok(Self { spans })
    }
}

fn parse_page(raw: &str) -> Result<u32, String> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| format!("'{}' is not a page number", raw.trim()))
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, &(first, last)) in self.spans.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if first == last {
                write!(f, "{first}")?;
            } else {
                write!(f, "{first}-{last}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSource {
    pub document: String,
    pub pages: PageRange,
}

/// CombinePages のドメインオブジェクト
///
/// 実行時だけの状態は持たないため、往復で全フィールドが保存されます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinePagesSettings {
    pub page_sources: Vec<PageSource>,
    pub output_path: String,
    pub update_data: bool,
}

/// execute の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineReport {
    pub output_path: String,
    pub pages_written: usize,
    pub documents: usize,
}

impl CombinePagesSettings {
    /// 書き出すページを順番どおりに並べる
    pub fn plan(&self) -> Vec<PageRef> {
        self.page_sources
            .iter()
            .flat_map(|source| {
                source
                    .pages
                    .pages()
                    .map(move |page| PageRef::new(source.document.clone(), page))
            })
            .collect()
    }

    /// 各ドキュメントのページ数を確認してから combine を依頼する
    pub async fn execute(&self, imaging: &dyn PageImaging) -> Result<CombineReport, ExecutionError> {
        for source in &self.page_sources {
            let count = imaging.page_count(&source.document).await?;
            if source.pages.last_page() > count {
                return Err(ExecutionError::Rejected(format!(
                    "{} has {count} pages, range {} is out of bounds",
                    source.document, source.pages
                )));
            }
        }
        let pages = self.plan();
        imaging
            .combine(&pages, &self.output_path, self.update_data)
            .await?;
        tracing::debug!(output = %self.output_path, pages = pages.len(), "combined pages");

        let mut documents: Vec<&str> = self.page_sources.iter().map(|s| s.document.as_str()).collect();
        documents.sort_unstable();
        documents.dedup();
        Ok(CombineReport {
            output_path: self.output_path.clone(),
            pages_written: pages.len(),
            documents: documents.len(),
        })
    }
}

impl DomainObject for CombinePagesSettings {
    const KIND: &'static str = "CombinePages";
    type Dto = CombinePagesTaskSettingsV1;

    fn to_dto(&self) -> CombinePagesTaskSettingsV1 {
        CombinePagesTaskSettingsV1 {
            page_sources: self
                .page_sources
                .iter()
                .map(|s| PageSourceDto {
                    document: Some(s.document.clone()),
                    pages: Some(s.pages.to_string()),
                })
                .collect(),
            output_path: Some(self.output_path.clone()),
            update_data: self.update_data,
        }
    }

    fn from_dto(dto: CombinePagesTaskSettingsV1) -> Result<Self, ReconstructionError> {
        let output_path = dto
            .output_path
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ReconstructionError::missing(Self::KIND, "OutputPath"))?;
        if dto.page_sources.is_empty() {
            return Err(ReconstructionError::invalid(
                Self::KIND,
                "PageSources",
                "at least one page source is required",
            ));
        }

        let mut page_sources = Vec::with_capacity(dto.page_sources.len());
        for (i, source) in dto.page_sources.into_iter().enumerate() {
            let document = source
                .document
                .ok_or_else(|| ReconstructionError::missing(Self::KIND, format!("PageSources[{i}].Document")))?;
            let pages = source
                .pages
                .ok_or_else(|| ReconstructionError::missing(Self::KIND, format!("PageSources[{i}].Pages")))?
                .parse::<PageRange>()
                .map_err(|reason| {
                    ReconstructionError::invalid(Self::KIND, format!("PageSources[{i}].Pages"), reason)
                })?;
            page_sources.push(PageSource { document, pages });
        }

        Ok(Self {
            page_sources,
            output_path,
            update_data: dto.update_data,
        })
    }
}
