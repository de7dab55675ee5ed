//! Kinds - 組み込みの設定オブジェクト
//!
//! - **CombinePages**: ファイル処理タスクの設定
//! - **QueueDepthMeasure**: 定期的な環境計測（V1 / V2）
//! - **RequiredFieldRule**: ルールパイプラインの検証ルール（V1 / V2）

pub mod combine_pages;
pub mod queue_depth;
pub mod required_field;

pub use self::combine_pages::{CombinePagesSettings, CombinePagesTaskSettingsV1, CombineReport, PageRange};
pub use self::queue_depth::{
    Level, Measurement, QueueDepthMeasure, QueueDepthMeasureV1, QueueDepthMeasureV2, SampleLimit,
};
pub use self::required_field::{
    Record, RequiredFieldRule, RequiredFieldRuleV1, RequiredFieldRuleV2, RuleOutcome, evaluate_all,
};

use crate::typed::{Payload, RegistryBuilder, RegistryError};

/// 組み込みの type tag（旧バージョンを含む）
pub const BUILTIN_TAGS: &[&str] = &[
    CombinePagesTaskSettingsV1::TAG,
    QueueDepthMeasureV1::TAG,
    QueueDepthMeasureV2::TAG,
    RequiredFieldRuleV1::TAG,
    RequiredFieldRuleV2::TAG,
];

/// 組み込みの DTO をすべて登録する
pub fn register_builtin(builder: RegistryBuilder) -> Result<RegistryBuilder, RegistryError> {
    builder
        .register::<CombinePagesTaskSettingsV1>()?
        .register::<QueueDepthMeasureV1>()?
        .register::<QueueDepthMeasureV2>()?
        .register::<RequiredFieldRuleV1>()?
        .register::<RequiredFieldRuleV2>()
}
