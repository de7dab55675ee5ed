//! SchemaError - ストアを開く / アップグレードする際のエラー

use rusqlite::ErrorCode;

/// データ移行関数が返すエラー
pub type MigrationError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("upgrade step to schema version {version} failed: {source}")]
    Step {
        version: u32,
        #[source]
        source: MigrationError,
    },

    #[error("store schema version {found} is newer than the latest known version {latest}")]
    UnsupportedFutureVersion { found: u32, latest: u32 },

    #[error("store is locked by another writer")]
    StoreBusy,

    #[error("schema ladder has no upgrade step for version {0}")]
    IncompleteLadder(u32),

    #[error("schema ladder registers version {0} twice")]
    DuplicateStep(u32),

    #[error("setting '{name}' has an invalid value '{value}'")]
    InvalidSetting { name: String, value: String },

    #[error("store open task failed: {0}")]
    OpenTask(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[source] rusqlite::Error),
}

impl SchemaError {
    pub(crate) fn step(version: u32, source: impl Into<MigrationError>) -> Self {
        Self::Step {
            version,
            source: source.into(),
        }
    }

    pub(crate) fn invalid_setting(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidSetting {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED は StoreBusy に寄せる
impl From<rusqlite::Error> for SchemaError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Self::StoreBusy,
            _ => Self::Sqlite(err),
        }
    }
}
