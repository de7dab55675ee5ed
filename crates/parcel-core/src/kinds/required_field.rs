//! RequiredField - 入力レコードの検証ルール
//!
//! V1 はフィールド名だけを持ち、V2 でメッセージと空白の扱いが追加されました。
//! V1 を読み込むときは V2 の既定値を埋めます。

use crate::typed::{Configured, Described, DomainObject, DtoVersions, Payload, ReconstructionError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequiredFieldRuleV1 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
}

impl Payload for RequiredFieldRuleV1 {
    const TAG: &'static str = "RequiredFieldRuleV1";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequiredFieldRuleV2 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_whitespace: Option<bool>,
}

impl Payload for RequiredFieldRuleV2 {
    const TAG: &'static str = "RequiredFieldRuleV2";
}

impl From<RequiredFieldRuleV1> for RequiredFieldRuleV2 {
    fn from(v1: RequiredFieldRuleV1) -> Self {
        Self {
            message: v1.field_name.as_deref().map(default_message),
            field_name: v1.field_name,
            trim_whitespace: Some(true),
        }
    }
}

fn default_message(field: &str) -> String {
    format!("{field} is required")
}

/// 検証対象のレコード（フィールド名 → 値）
pub type Record = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Passed,
    Failed { field: String, message: String },
}

impl RuleOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredFieldRule {
    pub field_name: String,
    pub message: String,
    pub trim_whitespace: bool,
}

impl RequiredFieldRule {
    pub fn new(field_name: impl Into<String>) -> Self {
        let field_name = field_name.into();
        Self {
            message: default_message(&field_name),
            field_name,
            trim_whitespace: true,
        }
    }

    pub fn evaluate(&self, record: &Record) -> RuleOutcome {
        let present = record.get(&self.field_name).is_some_and(|value| {
            if self.trim_whitespace {
                !value.trim().is_empty()
            } else {
                !value.is_empty()
            }
        });
        if present {
            RuleOutcome::Passed
        } else {
            RuleOutcome::Failed {
                field: self.field_name.clone(),
                message: self.message.clone(),
            }
        }
    }
}

/// 有効なルールだけを評価し、失敗したものを返す
pub fn evaluate_all(rules: &[Configured<RequiredFieldRule>], record: &Record) -> Vec<RuleOutcome> {
    rules
        .iter()
        .filter(|rule| rule.is_enabled())
        .map(|rule| rule.object().evaluate(record))
        .filter(|outcome| !outcome.is_passed())
        .collect()
}

impl DomainObject for RequiredFieldRule {
    const KIND: &'static str = "RequiredFieldRule";
    type Dto = RequiredFieldRuleV2;

    fn to_dto(&self) -> RequiredFieldRuleV2 {
        RequiredFieldRuleV2 {
            field_name: Some(self.field_name.clone()),
            message: Some(self.message.clone()),
            trim_whitespace: Some(self.trim_whitespace),
        }
    }

    fn from_dto(dto: RequiredFieldRuleV2) -> Result<Self, ReconstructionError> {
        let field_name = dto
            .field_name
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| ReconstructionError::missing(Self::KIND, "FieldName"))?;
        Ok(Self {
            message: dto.message.unwrap_or_else(|| default_message(&field_name)),
            trim_whitespace: dto.trim_whitespace.unwrap_or(true),
            field_name,
        })
    }

    fn dto_versions() -> DtoVersions<Self> {
        DtoVersions::current().accept::<RequiredFieldRuleV1>()
    }
}
