//! Database schema and migrations
//!
//! The unified database is created and upgraded through an ordered list of
//! migrations. Applied versions are recorded in the `schema_version` table,
//! so re-running any migration is a no-op.

use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;

use crate::config::StoreConfig;
use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i64 = 3;

/// A database migration
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Version number
    pub version: i64,
    /// One-line description recorded in `schema_version`
    pub description: &'static str,
}

/// Migration definitions, in application order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Create epics, stories, sprints, workflow_executions, state_changes tables",
    },
    Migration {
        version: 2,
        description: "Create workflow_context and context_usage tables",
    },
    Migration {
        version: 3,
        description: "Unify legacy state and context databases into gao_dev.db",
    },
];

/// V1: Core state schema — tables, indexes, and triggers.
const STATE_SCHEMA_SQL: &str = r#"
-- ============================================
-- Core tables
-- ============================================

CREATE TABLE IF NOT EXISTS epics (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    epic_num         INTEGER NOT NULL UNIQUE,
    name             TEXT NOT NULL,
    feature          TEXT,
    goal             TEXT,
    description      TEXT,
    status           TEXT NOT NULL DEFAULT 'planned'
                     CHECK (status IN ('planned', 'active', 'completed', 'cancelled')),
    total_points     INTEGER NOT NULL DEFAULT 0,
    completed_points INTEGER NOT NULL DEFAULT 0,
    owner            TEXT,
    created_by       TEXT,
    created_at       TEXT NOT NULL DEFAULT (datetime('now')),
    started_at       TEXT,
    completed_at     TEXT,
    updated_at       TEXT NOT NULL DEFAULT (datetime('now')),
    file_path        TEXT,
    content_hash     TEXT,
    metadata         TEXT
);

CREATE TABLE IF NOT EXISTS stories (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    epic_num         INTEGER NOT NULL
                     REFERENCES epics(epic_num) ON DELETE CASCADE ON UPDATE CASCADE,
    story_num        INTEGER NOT NULL,
    title            TEXT NOT NULL,
    description      TEXT,
    status           TEXT NOT NULL DEFAULT 'pending'
                     CHECK (status IN ('pending', 'in_progress', 'done', 'blocked', 'cancelled')),
    priority         TEXT NOT NULL DEFAULT 'P1'
                     CHECK (priority IN ('P0', 'P1', 'P2', 'P3')),
    points           INTEGER NOT NULL DEFAULT 0,
    owner            TEXT,
    created_by       TEXT,
    created_at       TEXT NOT NULL DEFAULT (datetime('now')),
    started_at       TEXT,
    completed_at     TEXT,
    updated_at       TEXT NOT NULL DEFAULT (datetime('now')),
    due_date         TEXT,
    file_path        TEXT,
    content_hash     TEXT,
    metadata         TEXT,
    tags             TEXT,

    UNIQUE (epic_num, story_num)
);

CREATE TABLE IF NOT EXISTS sprints (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    sprint_num       INTEGER NOT NULL UNIQUE,
    name             TEXT NOT NULL,
    goal             TEXT,
    status           TEXT NOT NULL DEFAULT 'planned'
                     CHECK (status IN ('planned', 'active', 'completed', 'cancelled')),
    start_date       TEXT NOT NULL,
    end_date         TEXT NOT NULL,
    created_at       TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at       TEXT NOT NULL DEFAULT (datetime('now')),
    planned_points   INTEGER NOT NULL DEFAULT 0,
    completed_points INTEGER NOT NULL DEFAULT 0,
    velocity         REAL,
    metadata         TEXT,

    CHECK (end_date > start_date)
);

-- One sprint per story at most; rows disappear with either side.
CREATE TABLE IF NOT EXISTS story_assignments (
    sprint_num       INTEGER NOT NULL
                     REFERENCES sprints(sprint_num) ON DELETE CASCADE,
    epic_num         INTEGER NOT NULL,
    story_num        INTEGER NOT NULL,
    assigned_at      TEXT NOT NULL DEFAULT (datetime('now')),

    PRIMARY KEY (epic_num, story_num),
    FOREIGN KEY (epic_num, story_num)
        REFERENCES stories(epic_num, story_num)
        ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS workflow_executions (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    workflow_name    TEXT NOT NULL,
    phase            TEXT,
    epic_num         INTEGER NOT NULL DEFAULT 0,
    story_num        INTEGER NOT NULL DEFAULT 0,
    status           TEXT NOT NULL DEFAULT 'started'
                     CHECK (status IN ('started', 'running', 'completed', 'failed', 'cancelled')),
    executor         TEXT,
    started_at       TEXT NOT NULL DEFAULT (datetime('now')),
    completed_at     TEXT,
    duration_ms      INTEGER,
    output           TEXT,
    error_message    TEXT,
    exit_code        INTEGER,
    metadata         TEXT,
    context_snapshot TEXT
);

-- Append-only audit trail; rows are only ever inserted by triggers.
CREATE TABLE IF NOT EXISTS state_changes (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name       TEXT NOT NULL,
    record_id        INTEGER NOT NULL,
    field_name       TEXT NOT NULL,
    old_value        TEXT,
    new_value        TEXT,
    changed_by       TEXT,
    changed_at       TEXT NOT NULL DEFAULT (datetime('now')),
    reason           TEXT
);

CREATE TABLE IF NOT EXISTS features (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    name             TEXT NOT NULL UNIQUE,
    scope            TEXT,
    status           TEXT NOT NULL DEFAULT 'planned',
    scale_level      INTEGER,
    description      TEXT,
    owner            TEXT,
    created_at       TEXT NOT NULL DEFAULT (datetime('now')),
    completed_at     TEXT,
    metadata         TEXT
);

CREATE TABLE IF NOT EXISTS features_audit (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    feature_id       INTEGER NOT NULL,
    operation        TEXT NOT NULL,
    old_value        TEXT,
    new_value        TEXT,
    changed_at       TEXT NOT NULL DEFAULT (datetime('now')),
    changed_by       TEXT
);

-- ============================================
-- Indexes
-- ============================================

CREATE INDEX IF NOT EXISTS idx_stories_status ON stories(status);
CREATE INDEX IF NOT EXISTS idx_stories_epic ON stories(epic_num);
CREATE INDEX IF NOT EXISTS idx_stories_priority ON stories(priority);
CREATE INDEX IF NOT EXISTS idx_stories_owner ON stories(owner);
CREATE INDEX IF NOT EXISTS idx_stories_epic_status ON stories(epic_num, status);
CREATE INDEX IF NOT EXISTS idx_epics_status ON epics(status);
CREATE INDEX IF NOT EXISTS idx_epics_feature ON epics(feature);
CREATE INDEX IF NOT EXISTS idx_sprints_status ON sprints(status);
CREATE INDEX IF NOT EXISTS idx_sprints_dates ON sprints(start_date, end_date);
CREATE INDEX IF NOT EXISTS idx_assignments_sprint ON story_assignments(sprint_num);
CREATE INDEX IF NOT EXISTS idx_assignments_story ON story_assignments(epic_num, story_num);
CREATE INDEX IF NOT EXISTS idx_workflow_story ON workflow_executions(epic_num, story_num);
CREATE INDEX IF NOT EXISTS idx_workflow_status ON workflow_executions(status);
CREATE INDEX IF NOT EXISTS idx_workflow_name ON workflow_executions(workflow_name);
CREATE INDEX IF NOT EXISTS idx_changes_record ON state_changes(table_name, record_id);
CREATE INDEX IF NOT EXISTS idx_features_scope ON features(scope);
CREATE INDEX IF NOT EXISTS idx_features_status ON features(status);
CREATE INDEX IF NOT EXISTS idx_features_scale_level ON features(scale_level);
CREATE INDEX IF NOT EXISTS idx_features_audit_feature_id ON features_audit(feature_id);

-- ============================================
-- Triggers: timestamps
-- ============================================

CREATE TRIGGER IF NOT EXISTS update_epic_timestamp
AFTER UPDATE ON epics
BEGIN
    UPDATE epics SET updated_at = datetime('now') WHERE id = NEW.id;
END;

CREATE TRIGGER IF NOT EXISTS update_story_timestamp
AFTER UPDATE ON stories
BEGIN
    UPDATE stories SET updated_at = datetime('now') WHERE id = NEW.id;
END;

CREATE TRIGGER IF NOT EXISTS update_sprint_timestamp
AFTER UPDATE ON sprints
BEGIN
    UPDATE sprints SET updated_at = datetime('now') WHERE id = NEW.id;
END;

-- ============================================
-- Triggers: epic point recomputation
--
-- completed_points follows stories across the 'done' boundary in both
-- directions. Inserts never fire these; the store creates stories as
-- 'pending' and transitions them, so every point movement is an UPDATE.
-- ============================================

CREATE TRIGGER IF NOT EXISTS update_epic_points_on_story_status
AFTER UPDATE OF status ON stories
WHEN NEW.status = 'done' AND OLD.status != 'done'
BEGIN
    UPDATE epics
    SET completed_points = completed_points + NEW.points
    WHERE epic_num = NEW.epic_num;
END;

CREATE TRIGGER IF NOT EXISTS update_epic_points_on_story_status_revert
AFTER UPDATE OF status ON stories
WHEN OLD.status = 'done' AND NEW.status != 'done'
BEGIN
    UPDATE epics
    SET completed_points = completed_points - OLD.points
    WHERE epic_num = OLD.epic_num;
END;

-- ============================================
-- Triggers: status audit trail
-- ============================================

CREATE TRIGGER IF NOT EXISTS log_story_status_change
AFTER UPDATE OF status ON stories
BEGIN
    INSERT INTO state_changes (table_name, record_id, field_name, old_value, new_value)
    VALUES ('stories', NEW.id, 'status', OLD.status, NEW.status);
END;

CREATE TRIGGER IF NOT EXISTS log_epic_status_change
AFTER UPDATE OF status ON epics
BEGIN
    INSERT INTO state_changes (table_name, record_id, field_name, old_value, new_value)
    VALUES ('epics', NEW.id, 'status', OLD.status, NEW.status);
END;

CREATE TRIGGER IF NOT EXISTS log_sprint_status_change
AFTER UPDATE OF status ON sprints
BEGIN
    INSERT INTO state_changes (table_name, record_id, field_name, old_value, new_value)
    VALUES ('sprints', NEW.id, 'status', OLD.status, NEW.status);
END;

-- ============================================
-- Triggers: features lifecycle and audit
-- ============================================

CREATE TRIGGER IF NOT EXISTS features_completed_at_update
AFTER UPDATE OF status ON features
WHEN NEW.status = 'completed' AND OLD.status != 'completed'
BEGIN
    UPDATE features SET completed_at = datetime('now') WHERE id = NEW.id;
END;

CREATE TRIGGER IF NOT EXISTS features_audit_insert
AFTER INSERT ON features
BEGIN
    INSERT INTO features_audit (feature_id, operation, new_value)
    VALUES (NEW.id, 'INSERT', NEW.status);
END;

CREATE TRIGGER IF NOT EXISTS features_audit_update
AFTER UPDATE ON features
BEGIN
    INSERT INTO features_audit (feature_id, operation, old_value, new_value)
    VALUES (NEW.id, 'UPDATE', OLD.status, NEW.status);
END;

CREATE TRIGGER IF NOT EXISTS features_audit_delete
AFTER DELETE ON features
BEGIN
    INSERT INTO features_audit (feature_id, operation, old_value)
    VALUES (OLD.id, 'DELETE', OLD.status);
END;
"#;

/// V2: Canonical context tables (targets of the unification migration).
const CONTEXT_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS workflow_context (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    workflow_id      TEXT NOT NULL,
    epic_num         INTEGER,
    story_num        INTEGER,
    phase            TEXT,
    content          TEXT,
    created_at       TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS context_usage (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    workflow_id      TEXT,
    agent            TEXT,
    tokens_used      INTEGER,
    created_at       TEXT NOT NULL DEFAULT (datetime('now')),
    metadata         TEXT
);
"#;

/// Tables migrated from the legacy state database
const LEGACY_STATE_TABLES: &[&str] = &[
    "epics",
    "stories",
    "sprints",
    "story_assignments",
    "workflow_executions",
    "state_changes",
];

/// Tables migrated from the legacy context database
const LEGACY_CONTEXT_TABLES: &[&str] = &["workflow_context", "context_usage"];

/// Create the database file (and parent directories) and run all pending
/// migrations. Initialization is the only path that creates the file; the
/// state store itself refuses to open a missing database.
pub fn initialize(config: &StoreConfig) -> Result<()> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut conn = Connection::open(&config.db_path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON")?;
    run_migrations(&mut conn, config)
}

/// Run all pending migrations against an open connection.
pub fn run_migrations(conn: &mut Connection, config: &StoreConfig) -> Result<()> {
    ensure_version_table(conn)?;

    let current = current_version(conn)?;
    tracing::info!(
        current_version = current,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for migration in MIGRATIONS {
        if is_applied(conn, migration.version)? {
            continue;
        }
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "Running migration"
        );
        match migration.version {
            1 => apply_sql_migration(conn, migration, STATE_SCHEMA_SQL)?,
            2 => apply_sql_migration(conn, migration, CONTEXT_SCHEMA_SQL)?,
            3 => apply_unify_migration(conn, config, migration, config.backup_legacy_on_migrate)?,
            v => {
                return Err(crate::error::Error::Transaction(format!(
                    "no handler for migration version {}",
                    v
                )))
            }
        }
    }

    Ok(())
}

/// Get the highest applied schema version (0 when none)
pub fn current_version(conn: &Connection) -> Result<i64> {
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))?;
    Ok(version.unwrap_or(0))
}

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL DEFAULT (datetime('now')),
            description TEXT
        )",
    )?;
    Ok(())
}

fn is_applied(conn: &Connection, version: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM schema_version WHERE version = ?1",
        [version],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

fn record_version(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version, description) VALUES (?1, ?2)",
        params![migration.version, migration.description],
    )?;
    Ok(())
}

fn apply_sql_migration(conn: &mut Connection, migration: &Migration, sql: &str) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(sql)?;
    record_version(&tx, migration)?;
    tx.commit()?;
    Ok(())
}

/// V3: merge the legacy databases into the unified file.
///
/// Foreign keys are disabled for the duration of the copy (ATTACH + bulk
/// insert cannot satisfy cross-table ordering), then re-enabled and checked.
/// Violations are logged, not fatal; downgrade is unsupported — recovery is
/// by restoring the timestamped backups this step writes.
fn apply_unify_migration(
    conn: &mut Connection,
    config: &StoreConfig,
    migration: &Migration,
    backup: bool,
) -> Result<()> {
    // Ensure the copy targets exist even on a database that predates the
    // context-table migration; everything here is CREATE IF NOT EXISTS.
    conn.execute_batch(CONTEXT_SCHEMA_SQL)?;

    let has_state_db = config.legacy_state_db_path.exists();
    let has_context_db = config.legacy_context_db_path.exists();

    if !has_state_db && !has_context_db {
        tracing::info!("No legacy databases found, nothing to migrate");
        record_version(conn, migration)?;
        return Ok(());
    }

    conn.execute_batch("PRAGMA foreign_keys = OFF")?;

    let copy_result = (|| -> Result<()> {
        if has_state_db {
            copy_legacy_database(
                conn,
                &config.legacy_state_db_path,
                "source_state",
                LEGACY_STATE_TABLES,
            )?;
        }
        if has_context_db {
            copy_legacy_database(
                conn,
                &config.legacy_context_db_path,
                "source_context",
                LEGACY_CONTEXT_TABLES,
            )?;
        }
        Ok(())
    })();

    conn.execute_batch("PRAGMA foreign_keys = ON")?;
    copy_result?;

    for (table, count) in check_foreign_keys(conn)? {
        tracing::warn!(table = %table, violations = count, "Foreign key violations after unification");
    }

    if backup {
        backup_legacy_databases(config)?;
    }

    record_version(conn, migration)?;
    tracing::info!(target = %config.db_path.display(), "Database unification complete");
    Ok(())
}

/// Attach a legacy database and copy each listed table into the unified
/// file. A table is copied only when the target is still empty, so the
/// migration is idempotent; schema drift is handled by inserting only the
/// columns both sides share.
fn copy_legacy_database(
    conn: &Connection,
    source_path: &Path,
    alias: &str,
    tables: &[&str],
) -> Result<()> {
    tracing::info!(source = %source_path.display(), "Migrating legacy database");
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {}", alias),
        [source_path.to_string_lossy().into_owned()],
    )?;

    let result = (|| -> Result<()> {
        for table in tables {
            copy_table_if_empty(conn, alias, table)?;
        }
        Ok(())
    })();

    conn.execute(&format!("DETACH DATABASE {}", alias), [])?;
    result
}

fn copy_table_if_empty(conn: &Connection, alias: &str, table: &str) -> Result<()> {
    let exists: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
            alias
        ),
        [table],
        |r| r.get(0),
    )?;
    if exists == 0 {
        tracing::warn!(table = table, source = alias, "Table not found in legacy database");
        return Ok(());
    }

    let target_count: i64 =
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
    if target_count > 0 {
        tracing::info!(table = table, count = target_count, "Target table already has data, skipping");
        return Ok(());
    }

    let source_columns = table_columns(conn, &format!("{}.{}", alias, table))?;
    let target_columns = table_columns(conn, table)?;
    let common: Vec<&String> = source_columns
        .iter()
        .filter(|c| target_columns.contains(c))
        .collect();

    if common.is_empty() {
        tracing::warn!(table = table, "No common columns with legacy table, skipping");
        return Ok(());
    }

    let column_list = common
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute(
        &format!(
            "INSERT INTO {table} ({cols}) SELECT {cols} FROM {alias}.{table}",
            table = table,
            cols = column_list,
            alias = alias
        ),
        [],
    )?;

    let migrated: i64 =
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
    tracing::info!(table = table, count = migrated, columns = common.len(), "Table migrated");
    Ok(())
}

fn table_columns(conn: &Connection, qualified_table: &str) -> Result<Vec<String>> {
    let pragma_sql = match qualified_table.split_once('.') {
        Some((schema, table)) => format!("PRAGMA {}.table_info({})", schema, table),
        None => format!("PRAGMA table_info({})", qualified_table),
    };
    let mut stmt = conn.prepare(&pragma_sql)?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// Run `foreign_key_check` per table; returns `(table, violation_count)`
/// for every table with violations.
fn check_foreign_keys(conn: &Connection) -> Result<Vec<(String, usize)>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut violations = Vec::new();
    for table in tables {
        let mut check = conn.prepare(&format!("PRAGMA foreign_key_check({})", table))?;
        let count = check.query_map([], |_| Ok(()))?.count();
        if count > 0 {
            violations.push((table, count));
        }
    }
    Ok(violations)
}

fn backup_legacy_databases(config: &StoreConfig) -> Result<()> {
    std::fs::create_dir_all(&config.backup_dir)?;
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");

    if config.legacy_state_db_path.exists() {
        let backup_path = config
            .backup_dir
            .join(format!("gao-dev-state_{}.db", timestamp));
        std::fs::copy(&config.legacy_state_db_path, &backup_path)?;
        tracing::info!(
            original = %config.legacy_state_db_path.display(),
            backup = %backup_path.display(),
            "Legacy database backed up"
        );
    }
    if config.legacy_context_db_path.exists() {
        let backup_path = config
            .backup_dir
            .join(format!("context_usage_{}.db", timestamp));
        std::fs::copy(&config.legacy_context_db_path, &backup_path)?;
        tracing::info!(
            original = %config.legacy_context_db_path.display(),
            backup = %backup_path.display(),
            "Legacy database backed up"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fresh_db(dir: &TempDir) -> (StoreConfig, Connection) {
        let config = StoreConfig::rooted_at(dir.path());
        initialize(&config).unwrap();
        let conn = Connection::open(&config.db_path).unwrap();
        (config, conn)
    }

    #[test]
    fn test_migrations_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::rooted_at(dir.path());

        initialize(&config).unwrap();
        initialize(&config).unwrap();

        let conn = Connection::open(&config.db_path).unwrap();
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_all_tables_created() {
        let dir = TempDir::new().unwrap();
        let (_config, conn) = fresh_db(&dir);

        let tables = [
            "epics",
            "stories",
            "sprints",
            "story_assignments",
            "workflow_executions",
            "state_changes",
            "features",
            "features_audit",
            "schema_version",
            "workflow_context",
            "context_usage",
        ];
        for table in tables {
            let exists: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_all_triggers_created() {
        let dir = TempDir::new().unwrap();
        let (_config, conn) = fresh_db(&dir);

        let triggers = [
            "update_epic_timestamp",
            "update_story_timestamp",
            "update_sprint_timestamp",
            "update_epic_points_on_story_status",
            "update_epic_points_on_story_status_revert",
            "log_story_status_change",
            "log_epic_status_change",
            "log_sprint_status_change",
            "features_completed_at_update",
            "features_audit_insert",
            "features_audit_update",
            "features_audit_delete",
        ];
        for trigger in triggers {
            let exists: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='trigger' AND name=?",
                    [trigger],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Trigger {} should exist", trigger);
        }
    }

    #[test]
    fn test_schema_creation_performance() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::rooted_at(dir.path());

        let start = std::time::Instant::now();
        initialize(&config).unwrap();
        let elapsed = start.elapsed();

        assert!(
            elapsed.as_millis() < 100,
            "Schema creation took {:?} (expected <100ms)",
            elapsed
        );
    }

    #[test]
    fn test_unique_constraints() {
        let dir = TempDir::new().unwrap();
        let (_config, conn) = fresh_db(&dir);
        conn.execute_batch("PRAGMA foreign_keys = ON").unwrap();

        conn.execute("INSERT INTO epics (epic_num, name) VALUES (1, 'Epic 1')", [])
            .unwrap();
        assert!(conn
            .execute("INSERT INTO epics (epic_num, name) VALUES (1, 'Epic 2')", [])
            .is_err());

        conn.execute(
            "INSERT INTO stories (epic_num, story_num, title) VALUES (1, 1, 'Story 1')",
            [],
        )
        .unwrap();
        assert!(conn
            .execute(
                "INSERT INTO stories (epic_num, story_num, title) VALUES (1, 1, 'Story 2')",
                [],
            )
            .is_err());
    }

    #[test]
    fn test_check_constraints() {
        let dir = TempDir::new().unwrap();
        let (_config, conn) = fresh_db(&dir);
        conn.execute_batch("PRAGMA foreign_keys = ON").unwrap();

        conn.execute("INSERT INTO epics (epic_num, name) VALUES (1, 'Epic 1')", [])
            .unwrap();

        // Status and priority enumerations
        assert!(conn
            .execute(
                "INSERT INTO epics (epic_num, name, status) VALUES (5, 'Epic 5', 'invalid')",
                [],
            )
            .is_err());
        assert!(conn
            .execute(
                "INSERT INTO stories (epic_num, story_num, title, status) VALUES (1, 6, 'S', 'invalid')",
                [],
            )
            .is_err());
        assert!(conn
            .execute(
                "INSERT INTO stories (epic_num, story_num, title, priority) VALUES (1, 7, 'S', 'P4')",
                [],
            )
            .is_err());

        // Sprint date ordering
        conn.execute(
            "INSERT INTO sprints (sprint_num, name, start_date, end_date) \
             VALUES (1, 'Sprint 1', '2025-01-01', '2025-01-15')",
            [],
        )
        .unwrap();
        assert!(conn
            .execute(
                "INSERT INTO sprints (sprint_num, name, start_date, end_date) \
                 VALUES (2, 'Sprint 2', '2025-01-15', '2025-01-01')",
                [],
            )
            .is_err());
        assert!(conn
            .execute(
                "INSERT INTO sprints (sprint_num, name, start_date, end_date) \
                 VALUES (3, 'Sprint 3', '2025-01-01', '2025-01-01')",
                [],
            )
            .is_err());
    }

    #[test]
    fn test_cascades() {
        let dir = TempDir::new().unwrap();
        let (_config, conn) = fresh_db(&dir);
        conn.execute_batch("PRAGMA foreign_keys = ON").unwrap();

        conn.execute("INSERT INTO epics (epic_num, name) VALUES (1, 'Epic 1')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO stories (epic_num, story_num, title) VALUES (1, 1, 'Story 1')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO sprints (sprint_num, name, start_date, end_date) \
             VALUES (1, 'Sprint 1', '2025-01-01', '2025-01-15')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO story_assignments (sprint_num, epic_num, story_num) VALUES (1, 1, 1)",
            [],
        )
        .unwrap();

        // Renumbering the epic propagates to stories and assignments
        conn.execute("UPDATE epics SET epic_num = 2 WHERE epic_num = 1", [])
            .unwrap();
        let epic_num: i64 = conn
            .query_row("SELECT epic_num FROM stories WHERE story_num = 1", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(epic_num, 2);

        // Deleting the sprint removes the assignment
        conn.execute("DELETE FROM sprints WHERE sprint_num = 1", [])
            .unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM story_assignments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);

        // Deleting the epic removes its stories
        conn.execute("DELETE FROM epics WHERE epic_num = 2", [])
            .unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM stories", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_audit_trigger_on_status_update() {
        let dir = TempDir::new().unwrap();
        let (_config, conn) = fresh_db(&dir);
        conn.execute_batch("PRAGMA foreign_keys = ON").unwrap();

        conn.execute("INSERT INTO epics (epic_num, name) VALUES (1, 'Epic 1')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO stories (epic_num, story_num, title, points) VALUES (1, 1, 'Story 1', 3)",
            [],
        )
        .unwrap();

        // Direct INSERT produces no audit rows
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM state_changes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);

        conn.execute("UPDATE stories SET status = 'done' WHERE epic_num = 1 AND story_num = 1", [])
            .unwrap();

        let (old_value, new_value): (String, String) = conn
            .query_row(
                "SELECT old_value, new_value FROM state_changes \
                 WHERE table_name = 'stories' AND field_name = 'status'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(old_value, "pending");
        assert_eq!(new_value, "done");

        // Points followed the transition into 'done'
        let completed: i64 = conn
            .query_row("SELECT completed_points FROM epics WHERE epic_num = 1", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(completed, 3);

        // And back out again
        conn.execute(
            "UPDATE stories SET status = 'in_progress' WHERE epic_num = 1 AND story_num = 1",
            [],
        )
        .unwrap();
        let completed: i64 = conn
            .query_row("SELECT completed_points FROM epics WHERE epic_num = 1", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(completed, 0);
    }

    #[test]
    fn test_unify_migration_copies_legacy_data() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::rooted_at(dir.path());

        // Build a legacy state database with one epic
        {
            let legacy = Connection::open(&config.legacy_state_db_path).unwrap();
            legacy
                .execute_batch(
                    "CREATE TABLE epics (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        epic_num INTEGER NOT NULL UNIQUE,
                        name TEXT NOT NULL,
                        status TEXT NOT NULL DEFAULT 'planned',
                        total_points INTEGER NOT NULL DEFAULT 0,
                        completed_points INTEGER NOT NULL DEFAULT 0,
                        legacy_only_column TEXT
                    );
                    INSERT INTO epics (epic_num, name, status, legacy_only_column)
                    VALUES (7, 'Legacy Epic', 'active', 'dropped');",
                )
                .unwrap();
        }

        initialize(&config).unwrap();

        let conn = Connection::open(&config.db_path).unwrap();
        let (name, status): (String, String) = conn
            .query_row(
                "SELECT name, status FROM epics WHERE epic_num = 7",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(name, "Legacy Epic");
        assert_eq!(status, "active");

        // Legacy file was backed up
        let backups: Vec<_> = std::fs::read_dir(&config.backup_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(backups.len(), 1);

        // Re-running the migration leaves the copied row alone
        let mut conn = Connection::open(&config.db_path).unwrap();
        run_migrations(&mut conn, &config).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM epics", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unify_backup_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::rooted_at(dir.path());
        config.backup_legacy_on_migrate = false;

        {
            let legacy = Connection::open(&config.legacy_state_db_path).unwrap();
            legacy
                .execute_batch(
                    "CREATE TABLE epics (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        epic_num INTEGER NOT NULL UNIQUE,
                        name TEXT NOT NULL
                    );
                    INSERT INTO epics (epic_num, name) VALUES (3, 'No Backup');",
                )
                .unwrap();
        }

        initialize(&config).unwrap();

        // Data landed, but no backup copies were written
        let conn = Connection::open(&config.db_path).unwrap();
        let name: String = conn
            .query_row("SELECT name FROM epics WHERE epic_num = 3", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "No Backup");
        assert!(!config.backup_dir.exists());
    }
}
