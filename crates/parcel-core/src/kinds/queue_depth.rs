//! QueueDepth - 定期実行される環境計測
//!
//! # バージョン
//! - V1: `QueuePath`, `WarningThreshold`
//! - V2: `SampleLimit` を追加。V1 と、V2 でキーが無い / null の場合は無制限

use crate::ports::{Clock, ExecutionError, QueueProbe};
use crate::typed::{DomainObject, DtoVersions, Payload, ReconstructionError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueueDepthMeasureV1 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_threshold: Option<u64>,
}

impl Payload for QueueDepthMeasureV1 {
    const TAG: &'static str = "QueueDepthMeasureV1";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueueDepthMeasureV2 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_threshold: Option<u64>,
    /// None = 無制限
    #[serde(default)]
    pub sample_limit: Option<u32>,
}

impl Payload for QueueDepthMeasureV2 {
    const TAG: &'static str = "QueueDepthMeasureV2";
}

impl From<QueueDepthMeasureV1> for QueueDepthMeasureV2 {
    fn from(v1: QueueDepthMeasureV1) -> Self {
        Self {
            queue_path: v1.queue_path,
            warning_threshold: v1.warning_threshold,
            sample_limit: None,
        }
    }
}

/// 保持するサンプル数の上限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleLimit {
    #[default]
    Unlimited,
    Limited(u32),
}

impl SampleLimit {
    fn admits(&self, len: usize) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(n) => len <= *n as usize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Normal,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub at: DateTime<Utc>,
    pub depth: u64,
}

/// execute 1 回分の結果
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub queue_path: String,
    pub depth: u64,
    pub level: Level,
    pub sampled_at: DateTime<Utc>,
    pub samples_retained: usize,
    pub average_depth: f64,
}

/// QueueDepth 計測のドメインオブジェクト
///
/// `samples` は実行時だけの履歴で、DTO には保存されません。
/// `PartialEq` も永続化されるフィールドだけを比較します。
#[derive(Debug, Clone)]
pub struct QueueDepthMeasure {
    pub queue_path: String,
    pub warning_threshold: u64,
    pub sample_limit: SampleLimit,
    samples: VecDeque<Sample>,
}

impl PartialEq for QueueDepthMeasure {
    fn eq(&self, other: &Self) -> bool {
        self.queue_path == other.queue_path
            && self.warning_threshold == other.warning_threshold
            && self.sample_limit == other.sample_limit
    }
}

impl QueueDepthMeasure {
    pub fn new(queue_path: impl Into<String>, warning_threshold: u64, sample_limit: SampleLimit) -> Self {
        Self {
            queue_path: queue_path.into(),
            warning_threshold,
            sample_limit,
            samples: VecDeque::new(),
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn average_depth(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: u64 = self.samples.iter().map(|s| s.depth).sum();
        total as f64 / self.samples.len() as f64
    }

    /// キューの深さを 1 回計測して履歴に追加する
    pub async fn execute(
        &mut self,
        probe: &dyn QueueProbe,
        clock: &dyn Clock,
    ) -> Result<Measurement, ExecutionError> {
        let depth = probe.depth(&self.queue_path).await?;
        let sampled_at = clock.now();

        self.samples.push_back(Sample {
            at: sampled_at,
            depth,
        });
        while !self.sample_limit.admits(self.samples.len()) {
            self.samples.pop_front();
        }

        let level = if depth >= self.warning_threshold {
            Level::Warning
        } else {
            Level::Normal
        };
        if level == Level::Warning {
            tracing::debug!(queue = %self.queue_path, depth, threshold = self.warning_threshold, "queue depth above threshold");
        }

        Ok(Measurement {
            queue_path: self.queue_path.clone(),
            depth,
            level,
            sampled_at,
            samples_retained: self.samples.len(),
            average_depth: self.average_depth(),
        })
    }
}

impl DomainObject for QueueDepthMeasure {
    const KIND: &'static str = "QueueDepthMeasure";
    type Dto = QueueDepthMeasureV2;

    fn to_dto(&self) -> QueueDepthMeasureV2 {
        QueueDepthMeasureV2 {
            queue_path: Some(self.queue_path.clone()),
            warning_threshold: Some(self.warning_threshold),
            sample_limit: match self.sample_limit {
                SampleLimit::Unlimited => None,
                SampleLimit::Limited(n) => Some(n),
            },
        }
    }

    fn from_dto(dto: QueueDepthMeasureV2) -> Result<Self, ReconstructionError> {
        let queue_path = dto
            .queue_path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ReconstructionError::missing(Self::KIND, "QueuePath"))?;
        let warning_threshold = dto
            .warning_threshold
            .ok_or_else(|| ReconstructionError::missing(Self::KIND, "WarningThreshold"))?;
        let sample_limit = match dto.sample_limit {
            None => SampleLimit::Unlimited,
            Some(0) => {
                return Err(ReconstructionError::invalid(
                    Self::KIND,
                    "SampleLimit",
                    "must be greater than zero",
                ));
            }
            Some(n) => SampleLimit::Limited(n),
        };
        Ok(Self::new(queue_path, warning_threshold, sample_limit))
    }

    fn dto_versions() -> DtoVersions<Self> {
        DtoVersions::current().accept::<QueueDepthMeasureV1>()
    }
}
