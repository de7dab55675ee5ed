//! Settings テーブルの読み書き
//!
//! `Settings(Name TEXT, Value TEXT)` の 2 列だけを持ちます。
//! `Transaction` は `Connection` に deref するので、どちらからでも呼べます。

use super::error::SchemaError;
use crate::domain::schema::SCHEMA_VERSION_SETTING;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;

pub(crate) const SETTINGS_TABLE_DDL: &str =
    "CREATE TABLE Settings (Name TEXT NOT NULL PRIMARY KEY, Value TEXT NOT NULL);";

pub(crate) fn table_exists(conn: &Connection, name: &str) -> Result<bool, SchemaError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 LIMIT 1",
            params![name],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

pub(crate) fn read_setting(conn: &Connection, name: &str) -> Result<Option<String>, SchemaError> {
    Ok(conn
        .query_row(
            "SELECT Value FROM Settings WHERE Name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?)
}

pub(crate) fn write_setting(conn: &Connection, name: &str, value: &str) -> Result<(), SchemaError> {
    conn.execute(
        "INSERT INTO Settings (Name, Value) VALUES (?1, ?2)
         ON CONFLICT(Name) DO UPDATE SET Value = excluded.Value",
        params![name, value],
    )?;
    Ok(())
}

pub(crate) fn read_all(conn: &Connection) -> Result<BTreeMap<String, String>, SchemaError> {
    let mut stmt = conn.prepare("SELECT Name, Value FROM Settings")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut settings = BTreeMap::new();
    for row in rows {
        let (name, value) = row?;
        settings.insert(name, value);
    }
    Ok(settings)
}

pub(crate) fn parse_version(value: Option<String>) -> Result<u32, SchemaError> {
    let value = value.unwrap_or_default();
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| SchemaError::invalid_setting(SCHEMA_VERSION_SETTING, value))
}

/// 記録されているスキーマバージョン。Settings テーブルが無ければ 0
pub(crate) fn recorded_version(conn: &Connection) -> Result<u32, SchemaError> {
    if !table_exists(conn, "Settings")? {
        return Ok(0);
    }
    parse_version(read_setting(conn, SCHEMA_VERSION_SETTING)?)
}
