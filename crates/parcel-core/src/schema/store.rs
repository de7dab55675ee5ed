//! StoreHandle - 開いた（最新バージョンの）ストア

use super::error::SchemaError;
use super::settings;
use crate::domain::schema::{
    OpenReport, SCHEMA_MANAGER_SETTING, SCHEMA_VERSION_SETTING, StoreSchemaState,
};
use rusqlite::Connection;

/// StoreHandle は ladder を通過したストアへの接続を持つ
#[derive(Debug)]
pub struct StoreHandle {
    conn: Connection,
    report: OpenReport,
}

impl StoreHandle {
    pub(crate) fn new(conn: Connection, report: OpenReport) -> Self {
        Self { conn, report }
    }

    pub fn report(&self) -> &OpenReport {
        &self.report
    }

    pub fn version(&self) -> u32 {
        self.report.to_version
    }

    pub fn schema_state(&self) -> Result<StoreSchemaState, SchemaError> {
        let settings = settings::read_all(&self.conn)?;
        let current_version =
            settings::parse_version(settings.get(SCHEMA_VERSION_SETTING).cloned())?;
        let manager_id = settings
            .get(SCHEMA_MANAGER_SETTING)
            .cloned()
            .unwrap_or_default();
        Ok(StoreSchemaState {
            current_version,
            manager_id,
            settings,
        })
    }

    pub fn setting(&self, name: &str) -> Result<Option<String>, SchemaError> {
        settings::read_setting(&self.conn, name)
    }

    /// ユーザー設定を書き込む。`SchemaVersion` / `SchemaManagerId` は ladder だけが書く
    pub fn set_setting(&self, name: &str, value: &str) -> Result<(), SchemaError> {
        if name == SCHEMA_VERSION_SETTING || name == SCHEMA_MANAGER_SETTING {
            return Err(SchemaError::invalid_setting(name, value));
        }
        settings::write_setting(&self.conn, name, value)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }
}
