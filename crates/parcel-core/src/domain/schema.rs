//! ストアのスキーマ状態 - 各ストアの `Settings` テーブルに記録される

use std::collections::BTreeMap;

/// スキーマバージョンを保持する設定行の名前
pub const SCHEMA_VERSION_SETTING: &str = "SchemaVersion";

/// 現在のスキーママネージャ ID を保持する設定行の名前
pub const SCHEMA_MANAGER_SETTING: &str = "SchemaManagerId";

/// 1 つのストアの `(CurrentVersion, UpgradeManagerId, Settings)` のスナップショット
///
/// `settings` には管理用の 2 行も含めた全行が入ります。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSchemaState {
    pub current_version: u32,
    pub manager_id: String,
    pub settings: BTreeMap<String, String>,
}

impl StoreSchemaState {
    pub fn setting(&self, name: &str) -> Option<&str> {
        self.settings.get(name).map(String::as_str)
    }

    /// `SchemaVersion` と `SchemaManagerId` を除いた設定
    pub fn user_settings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.settings
            .iter()
            .filter(|(k, _)| k.as_str() != SCHEMA_VERSION_SETTING && k.as_str() != SCHEMA_MANAGER_SETTING)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// ストアを開いている間の ladder 上の位置
///
/// `Unopened → VersionRead → {UpToDate | Upgrading(n) → … → UpToDate} → Open`,
/// `Unopenable` には `VersionRead` とどの `Upgrading` からも遷移します。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderState {
    Unopened,
    /// 0 は `Settings` テーブルがまだ無いことを表す
    VersionRead(u32),
    /// 指定バージョンへのステップを適用中
    Upgrading(u32),
    UpToDate,
    Open,
    Unopenable,
}

impl LadderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Open | Self::Unopenable)
    }
}

/// ストアを開いたときに起きたこと
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenReport {
    /// 開く前に記録されていたバージョン。新規ストアなら 0
    pub from_version: u32,
    pub to_version: u32,
    /// 最新構造の作成 DDL を実行したら true
    pub created: bool,
    /// 適用したステップの目標バージョン (適用順)
    pub applied_steps: Vec<u32>,
}

impl OpenReport {
    pub fn was_upgraded(&self) -> bool {
        !self.applied_steps.is_empty()
    }
}
