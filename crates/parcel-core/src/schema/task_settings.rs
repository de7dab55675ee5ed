//! TaskSettings ストア - 名前付きのタスク設定を envelope のまま保存する
//!
//! # バージョン
//! - v1: `TaskSettings(Id, Name, Payload)`
//! - v2: `Enabled`, `Description` 列を追加
//! - v3: `TypeTag` 列とインデックスを追加。既存行は envelope の `Type` から埋める
//!
//! `Payload` 列が正で、`Enabled` / `Description` / `TypeTag` は検索用に書き出した写しです。

use super::config::StoreConfig;
use super::error::{MigrationError, SchemaError};
use super::ladder::SchemaLadder;
use super::store::StoreHandle;
use crate::domain::{Envelope, ParcelError};
use crate::typed::{Configured, DomainObject, DynPayload, EnvelopeCodec, Payload, peek_envelope};
use rusqlite::{OptionalExtension, Transaction, params};

pub const MANAGER_ID: &str = "parcel.task-settings";

const CREATE_V3: &str = include_str!("../../sql/task_settings/create_v3.sql");
const V1: &str = include_str!("../../sql/task_settings/v1.sql");
const V2: &str = include_str!("../../sql/task_settings/v2.sql");
const V3: &str = include_str!("../../sql/task_settings/v3.sql");

pub fn ladder() -> Result<SchemaLadder, SchemaError> {
    SchemaLadder::builder(MANAGER_ID)
        .create(CREATE_V3)
        .step(1, V1)
        .step(2, V2)
        .step_with(3, V3, backfill_metadata)
        .default_setting("RetentionDays", "30")
        .build()
}

/// v3 のデータ移行: 各行の envelope からメタデータ列を埋める
///
/// 読めない envelope が 1 行でもあればステップごと失敗させる。
fn backfill_metadata(tx: &Transaction<'_>) -> Result<(), MigrationError> {
    let mut stmt = tx.prepare("SELECT Id, Payload FROM TaskSettings")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);
    for (id, payload) in rows {
        let (tag, details) = peek_envelope(payload.as_bytes())
            .map_err(|e| format!("TaskSettings row {id}: {e}"))?;
        let details = details.unwrap_or_default();
        tx.execute(
            "UPDATE TaskSettings SET TypeTag = ?1, Enabled = ?2, Description = ?3 WHERE Id = ?4",
            params![tag.as_str(), details.enabled, details.description, id],
        )?;
    }
    Ok(())
}

/// 保存済みの 1 行
#[derive(Debug, Clone)]
pub struct StoredSetting {
    pub id: i64,
    pub name: String,
    pub envelope: Envelope<DynPayload>,
}

/// TaskSettingsRepository は envelope を codec 経由で読み書きする
#[derive(Debug)]
pub struct TaskSettingsRepository {
    store: StoreHandle,
    codec: EnvelopeCodec,
}

impl TaskSettingsRepository {
    pub fn new(store: StoreHandle, codec: EnvelopeCodec) -> Self {
        Self { store, codec }
    }

    pub fn open(config: &StoreConfig, codec: EnvelopeCodec) -> Result<Self, ParcelError> {
        let store = ladder()?.open(config)?;
        Ok(Self::new(store, codec))
    }

    pub fn open_in_memory(codec: EnvelopeCodec) -> Result<Self, ParcelError> {
        let store = ladder()?.open_in_memory()?;
        Ok(Self::new(store, codec))
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn insert<P: Payload>(&self, name: &str, envelope: &Envelope<P>) -> Result<i64, ParcelError> {
        let payload = self.codec.encode_string(envelope)?;
        self.write_row(name, envelope, payload)
    }

    pub fn insert_dyn(&self, name: &str, envelope: &Envelope<DynPayload>) -> Result<i64, ParcelError> {
        let payload = self.codec.encode_dyn_string(envelope)?;
        self.write_row(name, envelope, payload)
    }

    /// ドメインオブジェクトを現行 DTO の described envelope として保存する
    pub fn save<D: DomainObject>(&self, name: &str, configured: &Configured<D>) -> Result<i64, ParcelError> {
        self.insert(name, &configured.to_envelope())
    }

    fn write_row<P>(&self, name: &str, envelope: &Envelope<P>, payload: String) -> Result<i64, ParcelError> {
        self.store.connection().execute(
            "INSERT INTO TaskSettings (Name, Payload, Enabled, Description, TypeTag)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                name,
                payload,
                envelope.is_enabled(),
                envelope.description(),
                envelope.type_tag().as_str()
            ],
        )?;
        Ok(self.store.connection().last_insert_rowid())
    }

    pub fn get(&self, name: &str) -> Result<Option<StoredSetting>, ParcelError> {
        let row: Option<(i64, String, String)> = self
            .store
            .connection()
            .query_row(
                "SELECT Id, Name, Payload FROM TaskSettings WHERE Name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        row.map(|row| self.decode_row(row)).transpose()
    }

    /// 名前の設定を読み込んでドメインオブジェクトを組み立てる
    pub fn load<D: DomainObject>(&self, name: &str) -> Result<Option<Configured<D>>, ParcelError> {
        match self.get(name)? {
            Some(stored) => Ok(Some(Configured::from_envelope(stored.envelope)?)),
            None => Ok(None),
        }
    }

    pub fn list(&self) -> Result<Vec<StoredSetting>, ParcelError> {
        self.query_rows("SELECT Id, Name, Payload FROM TaskSettings ORDER BY Id", [])
    }

    pub fn list_by_tag(&self, tag: &str) -> Result<Vec<StoredSetting>, ParcelError> {
        self.query_rows(
            "SELECT Id, Name, Payload FROM TaskSettings WHERE TypeTag = ?1 ORDER BY Id",
            params![tag],
        )
    }

    /// envelope の `Enabled` と列の両方を書き換える。該当行が無ければ false
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<bool, ParcelError> {
        let tx = self.store.connection_mut().transaction()?;
        let payload: Option<String> = tx
            .query_row(
                "SELECT Payload FROM TaskSettings WHERE Name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        let Some(payload) = payload else {
            return Ok(false);
        };

        let envelope = self.codec.decode_str(&payload)?.with_enabled(enabled);
        let payload = self.codec.encode_dyn_string(&envelope)?;
        tx.execute(
            "UPDATE TaskSettings SET Payload = ?1, Enabled = ?2 WHERE Name = ?3",
            params![payload, enabled, name],
        )?;
        tx.commit()?;
        tracing::debug!(name, enabled, "task setting toggled");
        Ok(true)
    }

    pub fn remove(&self, name: &str) -> Result<bool, ParcelError> {
        let removed = self
            .store
            .connection()
            .execute("DELETE FROM TaskSettings WHERE Name = ?1", params![name])?;
        Ok(removed > 0)
    }

    fn query_rows(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<StoredSetting>, ParcelError> {
        let mut stmt = self.store.connection().prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<(i64, String, String)>, _>>()?;
        rows.into_iter().map(|row| self.decode_row(row)).collect()
    }

    fn decode_row(&self, (id, name, payload): (i64, String, String)) -> Result<StoredSetting, ParcelError> {
        let envelope = self.codec.decode_str(&payload)?;
        Ok(StoredSetting { id, name, envelope })
    }
}
