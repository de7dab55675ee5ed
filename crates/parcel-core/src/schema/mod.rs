//! Schema - SQLite ストアのスキーマバージョン管理
//!
//! 各ストアは `Settings(Name, Value)` テーブルに `SchemaVersion` と `SchemaManagerId` を持ちます。
//! `SchemaLadder` はストアを開くたびに記録されたバージョンを読み、
//! 最新バージョンまでのアップグレードステップを昇順に適用します。

pub mod config;
pub mod error;
pub mod ladder;
mod settings;
pub mod store;
pub mod task_settings;

pub use self::config::{JournalMode, StoreConfig};
pub use self::error::{MigrationError, SchemaError};
pub use self::ladder::{DataMigration, SchemaLadder, SchemaLadderBuilder};
pub use self::store::StoreHandle;
pub use self::task_settings::{StoredSetting, TaskSettingsRepository};
