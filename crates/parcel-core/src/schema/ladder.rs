//! SchemaLadder - ストアのスキーマを最新バージョンまで引き上げる
//!
//! # 状態遷移
//! `Unopened → VersionRead → {UpToDate | Upgrading(n) → … → UpToDate} → Open`
//! 失敗した場合は `Unopenable` で終わり、エラーを返します。
//!
//! # 学習ポイント
//! - ステップごとに `IMMEDIATE` トランザクションを張り、その中でバージョンを読み直す
//!   （別プロセスが先に適用したステップは二重に適用しない）
//! - `SchemaVersion` は最後にコミットしたステップの値のまま残る
//! - 未来のバージョンは何も書き換えずに拒否する

use super::config::StoreConfig;
use super::error::{MigrationError, SchemaError};
use super::settings;
use super::store::StoreHandle;
use crate::domain::schema::{LadderState, OpenReport, SCHEMA_MANAGER_SETTING, SCHEMA_VERSION_SETTING};
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::sync::Arc;

/// DDL の後に同じトランザクション内で実行されるデータ移行
pub type DataMigration = fn(&Transaction<'_>) -> Result<(), MigrationError>;

#[derive(Clone)]
struct UpgradeStep {
    version: u32,
    ddl: String,
    migrate: Option<DataMigration>,
}

impl std::fmt::Debug for UpgradeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeStep")
            .field("version", &self.version)
            .field("migrate", &self.migrate.is_some())
            .finish()
    }
}

/// SchemaLadderBuilder は ladder を組み立てる
///
/// ```ignore
/// let ladder = SchemaLadder::builder("parcel.task-settings")
///     .create(include_str!("create_v3.sql"))
///     .step(1, include_str!("v1.sql"))
///     .step(2, include_str!("v2.sql"))
///     .step_with(3, include_str!("v3.sql"), fill_type_tags)
///     .default_setting("RetentionDays", "30")
///     .build()?;
/// ```
#[derive(Debug)]
pub struct SchemaLadderBuilder {
    manager_id: String,
    create: Option<String>,
    steps: BTreeMap<u32, UpgradeStep>,
    duplicate: Option<u32>,
    defaults: BTreeMap<String, String>,
}

impl SchemaLadderBuilder {
    pub fn new(manager_id: impl Into<String>) -> Self {
        Self {
            manager_id: manager_id.into(),
            create: None,
            steps: BTreeMap::new(),
            duplicate: None,
            defaults: BTreeMap::new(),
        }
    }

    /// 空のストアに最新構造をそのまま作る DDL。無ければ全ステップを順に流す
    pub fn create(mut self, ddl: impl Into<String>) -> Self {
        self.create = Some(ddl.into());
        self
    }

    pub fn step(self, version: u32, ddl: impl Into<String>) -> Self {
        self.push(version, ddl.into(), None)
    }

    pub fn step_with(self, version: u32, ddl: impl Into<String>, migrate: DataMigration) -> Self {
        self.push(version, ddl.into(), Some(migrate))
    }

    /// 新規作成時に書き込む設定
    pub fn default_setting(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    fn push(mut self, version: u32, ddl: String, migrate: Option<DataMigration>) -> Self {
        let step = UpgradeStep {
            version,
            ddl,
            migrate,
        };
        if self.steps.insert(version, step).is_some() {
            self.duplicate.get_or_insert(version);
        }
        self
    }

    pub fn build(self) -> Result<SchemaLadder, SchemaError> {
        if let Some(version) = self.duplicate {
            return Err(SchemaError::DuplicateStep(version));
        }
        if self.steps.contains_key(&0) {
            return Err(SchemaError::IncompleteLadder(0));
        }
        let latest = self.steps.keys().next_back().copied().unwrap_or(0);
        if latest == 0 {
            return Err(SchemaError::IncompleteLadder(1));
        }
        if let Some(missing) = (1..=latest).find(|v| !self.steps.contains_key(v)) {
            return Err(SchemaError::IncompleteLadder(missing));
        }
        if let Some((name, value)) = self
            .defaults
            .iter()
            .find(|(name, _)| *name == SCHEMA_VERSION_SETTING || *name == SCHEMA_MANAGER_SETTING)
        {
            return Err(SchemaError::invalid_setting(name.clone(), value.clone()));
        }
        Ok(SchemaLadder {
            manager_id: self.manager_id,
            create: self.create,
            steps: self.steps.into_values().collect(),
            defaults: self.defaults,
        })
    }
}

/// SchemaLadder は 1 種類のストアのアップグレード手順
///
/// 構築済みの ladder は `1..=latest` のすべてのステップを持ちます。
#[derive(Debug, Clone)]
pub struct SchemaLadder {
    manager_id: String,
    create: Option<String>,
    /// version 昇順。`steps[i].version == i + 1`
    steps: Vec<UpgradeStep>,
    defaults: BTreeMap<String, String>,
}

impl SchemaLadder {
    pub fn builder(manager_id: impl Into<String>) -> SchemaLadderBuilder {
        SchemaLadderBuilder::new(manager_id)
    }

    pub fn manager_id(&self) -> &str {
        &self.manager_id
    }

    pub fn latest(&self) -> u32 {
        self.steps.len() as u32
    }

    pub fn open(&self, config: &StoreConfig) -> Result<StoreHandle, SchemaError> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if config.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        let conn = Connection::open_with_flags(&config.path, flags)?;
        conn.busy_timeout(config.busy_timeout())?;
        // journal_mode はファイルに残るので、未来のバージョンはその前に拒否する
        self.reject_future_version(&conn)?;
        let mode: String = conn.pragma_update_and_check(
            None,
            "journal_mode",
            config.journal_mode.as_pragma(),
            |row| row.get(0),
        )?;
        tracing::debug!(path = %config.path.display(), journal_mode = %mode, "opening store");
        self.open_connection(conn)
    }

    fn reject_future_version(&self, conn: &Connection) -> Result<(), SchemaError> {
        let found = settings::recorded_version(conn)?;
        let latest = self.latest();
        if found > latest {
            tracing::warn!(
                manager_id = %self.manager_id,
                found,
                latest,
                "store was written by a newer schema"
            );
            return Err(SchemaError::UnsupportedFutureVersion { found, latest });
        }
        Ok(())
    }

    pub fn open_in_memory(&self) -> Result<StoreHandle, SchemaError> {
        self.open_connection(Connection::open_in_memory()?)
    }

    /// 非同期の呼び出し側向け。ブロッキングな open を spawn_blocking で実行する
    pub async fn open_async(self: Arc<Self>, config: StoreConfig) -> Result<StoreHandle, SchemaError> {
        tokio::task::spawn_blocking(move || self.open(&config))
            .await
            .map_err(|e| SchemaError::OpenTask(e.to_string()))?
    }

    /// 既存の接続に対して ladder を実行する
    pub fn open_connection(&self, mut conn: Connection) -> Result<StoreHandle, SchemaError> {
        let mut report = OpenReport {
            from_version: 0,
            to_version: 0,
            created: false,
            applied_steps: Vec::new(),
        };
        let mut state = LadderState::Unopened;
        while !state.is_terminal() {
            state = match self.advance(state, &mut conn, &mut report) {
                Ok(next) => next,
                Err(err) => {
                    tracing::warn!(
                        manager_id = %self.manager_id,
                        state = ?state,
                        next = ?LadderState::Unopenable,
                        error = %err,
                        "store cannot be opened"
                    );
                    return Err(err);
                }
            };
        }

        if report.created || report.was_upgraded() {
            tracing::info!(
                manager_id = %self.manager_id,
                from = report.from_version,
                to = report.to_version,
                created = report.created,
                "store schema brought up to date"
            );
        }
        Ok(StoreHandle::new(conn, report))
    }

    fn advance(
        &self,
        state: LadderState,
        conn: &mut Connection,
        report: &mut OpenReport,
    ) -> Result<LadderState, SchemaError> {
        let latest = self.latest();
        let next = match state {
            LadderState::Unopened => {
                let version = settings::recorded_version(conn)?;
                report.from_version = version;
                LadderState::VersionRead(version)
            }
            LadderState::VersionRead(0) => match self.create_structure(conn)? {
                None => {
                    report.created = true;
                    LadderState::UpToDate
                }
                // 別の opener が先に作った
                Some(version) => LadderState::VersionRead(version),
            },
            LadderState::VersionRead(found) if found > latest => {
                return Err(SchemaError::UnsupportedFutureVersion { found, latest });
            }
            LadderState::VersionRead(found) if found == latest => LadderState::UpToDate,
            LadderState::VersionRead(found) => LadderState::Upgrading(found + 1),
            LadderState::Upgrading(target) => {
                if self.apply_step(conn, target)? {
                    report.applied_steps.push(target);
                }
                if target >= latest {
                    LadderState::UpToDate
                } else {
                    LadderState::Upgrading(target + 1)
                }
            }
            LadderState::UpToDate => {
                report.to_version = latest;
                LadderState::Open
            }
            LadderState::Open | LadderState::Unopenable => state,
        };
        Ok(next)
    }

    /// 最新構造を 1 トランザクションで作る。既に作られていればそのバージョンを返す
    fn create_structure(&self, conn: &mut Connection) -> Result<Option<u32>, SchemaError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let version = settings::recorded_version(&tx)?;
        if version != 0 {
            return Ok(Some(version));
        }

        let latest = self.latest();
        tx.execute_batch(settings::SETTINGS_TABLE_DDL)
            .map_err(|e| SchemaError::step(latest, e))?;
        match &self.create {
            Some(ddl) => tx
                .execute_batch(ddl)
                .map_err(|e| SchemaError::step(latest, e))?,
            None => {
                for step in &self.steps {
                    Self::run_step(&tx, step)?;
                }
            }
        }
        for (name, value) in &self.defaults {
            settings::write_setting(&tx, name, value)?;
        }
        self.record_version(&tx, latest)?;
        tx.commit()?;
        tracing::debug!(manager_id = %self.manager_id, version = latest, "created store structure");
        Ok(None)
    }

    /// target へのステップを適用する。既に適用済みなら false
    fn apply_step(&self, conn: &mut Connection, target: u32) -> Result<bool, SchemaError> {
        let step = self
            .steps
            .get(target as usize - 1)
            .ok_or(SchemaError::IncompleteLadder(target))?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let recorded = settings::recorded_version(&tx)?;
        if recorded >= target {
            tracing::debug!(manager_id = %self.manager_id, version = target, recorded, "step already applied");
            return Ok(false);
        }

        Self::run_step(&tx, step)?;
        self.record_version(&tx, target)?;
        tx.commit()?;
        tracing::debug!(manager_id = %self.manager_id, version = target, "applied upgrade step");
        Ok(true)
    }

    fn run_step(tx: &Transaction<'_>, step: &UpgradeStep) -> Result<(), SchemaError> {
        tx.execute_batch(&step.ddl)
            .map_err(|e| SchemaError::step(step.version, e))?;
        if let Some(migrate) = step.migrate {
            migrate(tx).map_err(|e| SchemaError::step(step.version, e))?;
        }
        Ok(())
    }

    fn record_version(&self, tx: &Transaction<'_>, version: u32) -> Result<(), SchemaError> {
        settings::write_setting(tx, SCHEMA_VERSION_SETTING, &version.to_string())?;
        settings::write_setting(tx, SCHEMA_MANAGER_SETTING, &self.manager_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::config::JournalMode;
    use rstest::rstest;
    use std::time::Duration;

    fn table_for(version: u32) -> String {
        format!("CREATE TABLE Step{version} (Id INTEGER PRIMARY KEY, Note TEXT);")
    }

    /// version n で Step{n} テーブルを作る ladder
    fn ladder_to(latest: u32) -> SchemaLadder {
        (1..=latest)
            .fold(SchemaLadder::builder("test.ladder"), |b, v| b.step(v, table_for(v)))
            .default_setting("RetentionDays", "30")
            .build()
            .unwrap()
    }

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})")).unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    fn tables(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    /// ladder_to(version) で作られたのと同じ状態の接続
    fn store_at(version: u32) -> Connection {
        ladder_to(version).open_in_memory().unwrap().into_connection()
    }

    #[test]
    fn fresh_store_is_created_at_latest() {
        let store = ladder_to(3).open_in_memory().unwrap();
        let report = store.report();
        assert!(report.created);
        assert_eq!(report.from_version, 0);
        assert_eq!(report.to_version, 3);
        assert!(report.applied_steps.is_empty());

        let state = store.schema_state().unwrap();
        assert_eq!(state.current_version, 3);
        assert_eq!(state.manager_id, "test.ladder");
        assert_eq!(state.setting("RetentionDays"), Some("30"));
    }

    #[test]
    fn create_ddl_is_used_for_fresh_stores() {
        let ladder = SchemaLadder::builder("test.ladder")
            .create("CREATE TABLE Latest (Id INTEGER PRIMARY KEY);")
            .step(1, table_for(1))
            .step(2, table_for(2))
            .build()
            .unwrap();
        let store = ladder.open_in_memory().unwrap();
        assert_eq!(tables(store.connection()), vec!["Latest", "Settings"]);
    }

    #[test]
    fn settings_table_has_two_text_columns() {
        let store = ladder_to(1).open_in_memory().unwrap();
        assert_eq!(columns(store.connection(), "Settings"), vec!["Name", "Value"]);
    }

    #[test]
    fn opening_at_latest_applies_nothing() {
        let ladder = ladder_to(3);
        let conn = store_at(3);
        let store = ladder.open_connection(conn).unwrap();
        assert!(!store.report().created);
        assert!(!store.report().was_upgraded());
        assert_eq!(store.schema_state().unwrap().current_version, 3);
    }

    #[test]
    fn old_store_is_upgraded_through_every_step() {
        let ladder = ladder_to(8);
        let store = ladder.open_connection(store_at(3)).unwrap();

        assert_eq!(store.report().from_version, 3);
        assert_eq!(store.report().applied_steps, vec![4, 5, 6, 7, 8]);
        assert_eq!(store.schema_state().unwrap().current_version, 8);
        let tables = tables(store.connection());
        for v in 1..=8 {
            assert!(tables.contains(&format!("Step{v}")), "missing Step{v}");
        }
    }

    #[rstest]
    #[case(1)]
    #[case(4)]
    #[case(7)]
    fn monotone_from_any_version(#[case] from: u32) {
        let store = ladder_to(8).open_connection(store_at(from)).unwrap();
        let expected: Vec<u32> = (from + 1..=8).collect();
        assert_eq!(store.report().applied_steps, expected);
    }

    #[test]
    fn steps_see_the_previous_columns() {
        let ladder = SchemaLadder::builder("test.ladder")
            .step(1, "CREATE TABLE Items (Id INTEGER PRIMARY KEY);")
            .step(2, "ALTER TABLE Items ADD COLUMN Name TEXT;")
            .step(3, "ALTER TABLE Items ADD COLUMN Enabled INTEGER NOT NULL DEFAULT 1;")
            .build()
            .unwrap();
        let v1 = SchemaLadder::builder("test.ladder")
            .step(1, "CREATE TABLE Items (Id INTEGER PRIMARY KEY);")
            .build()
            .unwrap()
            .open_in_memory()
            .unwrap()
            .into_connection();

        let store = ladder.open_connection(v1).unwrap();
        assert_eq!(columns(store.connection(), "Items"), vec!["Id", "Name", "Enabled"]);
    }

    #[test]
    fn future_version_is_rejected_without_mutation() {
        fn journal_mode(path: &std::path::Path) -> String {
            Connection::open(path)
                .unwrap()
                .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                .unwrap()
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.db");
        let newer = StoreConfig::at(&path).with_journal_mode(JournalMode::Delete);
        ladder_to(9).open(&newer).unwrap();
        let before = settings::read_all(&Connection::open(&path).unwrap()).unwrap();
        assert_eq!(journal_mode(&path), "delete");

        // 既定の設定 (WAL) で開こうとしてもファイルには触れない
        let err = ladder_to(8).open(&StoreConfig::at(&path)).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UnsupportedFutureVersion { found: 9, latest: 8 }
        ));

        assert_eq!(journal_mode(&path), "delete");
        assert!(!dir.path().join("future.db-wal").exists());
        let conn = Connection::open(&path).unwrap();
        assert_eq!(settings::read_all(&conn).unwrap(), before);
        assert_eq!(settings::recorded_version(&conn).unwrap(), 9);
    }

    #[test]
    fn failing_step_leaves_last_committed_version() {
        fn boom(_: &Transaction<'_>) -> Result<(), MigrationError> {
            Err("data migration failed".into())
        }
        let ladder = (1..=4)
            .fold(SchemaLadder::builder("test.ladder"), |b, v| b.step(v, table_for(v)))
            .step_with(5, table_for(5), boom)
            .step(6, table_for(6))
            .build()
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::at(dir.path().join("store.db"));
        ladder_to(3).open(&config).unwrap();

        let err = ladder.open(&config).unwrap_err();
        assert!(matches!(err, SchemaError::Step { version: 5, .. }));

        let conn = Connection::open(&config.path).unwrap();
        assert_eq!(settings::recorded_version(&conn).unwrap(), 4);
        let tables = tables(&conn);
        assert!(tables.contains(&"Step4".to_string()));
        assert!(!tables.contains(&"Step5".to_string()));
    }

    #[test]
    fn failing_ddl_reports_its_version() {
        let ladder = SchemaLadder::builder("test.ladder")
            .step(1, table_for(1))
            .step(2, "ALTER TABLE Missing ADD COLUMN X TEXT;")
            .build()
            .unwrap();
        let err = ladder.open_connection(store_at(1)).unwrap_err();
        assert!(matches!(err, SchemaError::Step { version: 2, .. }));
    }

    #[rstest]
    #[case::gap(vec![1, 2, 4], 3)]
    #[case::no_first(vec![2, 3], 1)]
    #[case::empty(vec![], 1)]
    fn incomplete_ladders_are_rejected(#[case] versions: Vec<u32>, #[case] missing: u32) {
        let builder = versions
            .into_iter()
            .fold(SchemaLadder::builder("test.ladder"), |b, v| b.step(v, table_for(v)));
        assert!(matches!(
            builder.build(),
            Err(SchemaError::IncompleteLadder(v)) if v == missing
        ));
    }

    #[test]
    fn duplicate_step_is_rejected() {
        let result = SchemaLadder::builder("test.ladder")
            .step(1, table_for(1))
            .step(1, table_for(1))
            .build();
        assert!(matches!(result, Err(SchemaError::DuplicateStep(1))));
    }

    #[test]
    fn bookkeeping_names_are_not_default_settings() {
        let result = SchemaLadder::builder("test.ladder")
            .step(1, table_for(1))
            .default_setting(SCHEMA_VERSION_SETTING, "7")
            .build();
        assert!(matches!(result, Err(SchemaError::InvalidSetting { .. })));
    }

    #[test]
    fn unparseable_version_is_invalid() {
        let conn = store_at(2);
        settings::write_setting(&conn, SCHEMA_VERSION_SETTING, "two").unwrap();
        assert!(matches!(
            ladder_to(2).open_connection(conn),
            Err(SchemaError::InvalidSetting { value, .. }) if value == "two"
        ));
    }

    #[test]
    fn manager_id_is_rewritten_on_upgrade() {
        let conn = store_at(1);
        settings::write_setting(&conn, SCHEMA_MANAGER_SETTING, "legacy.manager").unwrap();
        let ladder = (1..=2)
            .fold(SchemaLadder::builder("next.manager"), |b, v| b.step(v, table_for(v)))
            .build()
            .unwrap();
        let store = ladder.open_connection(conn).unwrap();
        assert_eq!(store.schema_state().unwrap().manager_id, "next.manager");
    }

    #[test]
    fn user_settings_survive_upgrades() {
        let store = ladder_to(2).open_in_memory().unwrap();
        store.set_setting("Owner", "ops").unwrap();
        let store = ladder_to(5).open_connection(store.into_connection()).unwrap();
        assert_eq!(store.setting("Owner").unwrap().as_deref(), Some("ops"));
        assert_eq!(store.setting("RetentionDays").unwrap().as_deref(), Some("30"));
    }

    #[test]
    fn bookkeeping_settings_cannot_be_overwritten() {
        let store = ladder_to(1).open_in_memory().unwrap();
        assert!(store.set_setting(SCHEMA_VERSION_SETTING, "99").is_err());
        assert_eq!(store.schema_state().unwrap().current_version, 1);
    }

    #[test]
    fn competing_writer_makes_open_busy() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            StoreConfig::at(dir.path().join("busy.db")).with_busy_timeout(Duration::from_millis(50));
        ladder_to(1).open(&config).unwrap();

        let holder = Connection::open(&config.path).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE;").unwrap();

        let err = ladder_to(2).open(&config).unwrap_err();
        assert!(matches!(err, SchemaError::StoreBusy));

        holder.execute_batch("ROLLBACK;").unwrap();
        let store = ladder_to(2).open(&config).unwrap();
        assert_eq!(store.report().applied_steps, vec![2]);
    }

    #[test]
    fn missing_file_without_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::at(dir.path().join("absent.db")).with_create_if_missing(false);
        assert!(matches!(ladder_to(1).open(&config), Err(SchemaError::Sqlite(_))));
    }

    #[tokio::test]
    async fn open_async_runs_the_ladder() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::at(dir.path().join("async.db"));
        let ladder = Arc::new(ladder_to(2));
        let store = ladder.clone().open_async(config.clone()).await.unwrap();
        assert!(store.report().created);
        drop(store);

        let again = ladder.open_async(config).await.unwrap();
        assert!(!again.report().created);
        assert_eq!(again.version(), 2);
    }
}
