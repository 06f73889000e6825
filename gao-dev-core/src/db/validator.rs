//! Schema validator
//!
//! Compares an existing database against the expected set of tables,
//! indexes, triggers, and per-table columns. Missing required items are
//! errors; extra items are warnings.

use rusqlite::Connection;
use std::collections::HashSet;
use std::path::Path;

use crate::error::Result;

/// Tables every unified database must contain
pub const EXPECTED_TABLES: &[&str] = &[
    "epics",
    "stories",
    "sprints",
    "story_assignments",
    "workflow_executions",
    "state_changes",
    "schema_version",
    "features",
    "features_audit",
    "workflow_context",
    "context_usage",
];

/// Indexes every unified database must contain
pub const EXPECTED_INDEXES: &[&str] = &[
    "idx_stories_status",
    "idx_stories_epic",
    "idx_stories_priority",
    "idx_stories_owner",
    "idx_stories_epic_status",
    "idx_epics_status",
    "idx_epics_feature",
    "idx_sprints_status",
    "idx_sprints_dates",
    "idx_assignments_sprint",
    "idx_assignments_story",
    "idx_workflow_story",
    "idx_workflow_status",
    "idx_workflow_name",
    "idx_changes_record",
    "idx_features_scope",
    "idx_features_status",
    "idx_features_scale_level",
    "idx_features_audit_feature_id",
];

/// Triggers every unified database must contain
pub const EXPECTED_TRIGGERS: &[&str] = &[
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

/// Expected columns per table
const EXPECTED_COLUMNS: &[(&str, &[&str])] = &[
    (
        "epics",
        &[
            "id",
            "epic_num",
            "name",
            "feature",
            "goal",
            "description",
            "status",
            "total_points",
            "completed_points",
            "owner",
            "created_by",
            "created_at",
            "started_at",
            "completed_at",
            "updated_at",
            "file_path",
            "content_hash",
            "metadata",
        ],
    ),
    (
        "stories",
        &[
            "id",
            "epic_num",
            "story_num",
            "title",
            "description",
            "status",
            "priority",
            "points",
            "owner",
            "created_by",
            "created_at",
            "started_at",
            "completed_at",
            "updated_at",
            "due_date",
            "file_path",
            "content_hash",
            "metadata",
            "tags",
        ],
    ),
    (
        "sprints",
        &[
            "id",
            "sprint_num",
            "name",
            "goal",
            "status",
            "start_date",
            "end_date",
            "created_at",
            "updated_at",
            "planned_points",
            "completed_points",
            "velocity",
            "metadata",
        ],
    ),
    (
        "story_assignments",
        &["sprint_num", "epic_num", "story_num", "assigned_at"],
    ),
    (
        "workflow_executions",
        &[
            "id",
            "workflow_name",
            "phase",
            "epic_num",
            "story_num",
            "status",
            "executor",
            "started_at",
            "completed_at",
            "duration_ms",
            "output",
            "error_message",
            "exit_code",
            "metadata",
            "context_snapshot",
        ],
    ),
    (
        "state_changes",
        &[
            "id",
            "table_name",
            "record_id",
            "field_name",
            "old_value",
            "new_value",
            "changed_by",
            "changed_at",
            "reason",
        ],
    ),
    (
        "features",
        &[
            "id",
            "name",
            "scope",
            "status",
            "scale_level",
            "description",
            "owner",
            "created_at",
            "completed_at",
            "metadata",
        ],
    ),
    (
        "features_audit",
        &[
            "id",
            "feature_id",
            "operation",
            "old_value",
            "new_value",
            "changed_at",
            "changed_by",
        ],
    ),
];

/// Outcome of one validation pass
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ValidationReport {
    pub tables_valid: bool,
    pub indexes_valid: bool,
    pub triggers_valid: bool,
    pub columns_valid: bool,
    pub foreign_keys_enabled: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// A store is valid iff all four structural groups check out and no
    /// errors were collected.
    pub fn is_valid(&self) -> bool {
        self.tables_valid
            && self.indexes_valid
            && self.triggers_valid
            && self.columns_valid
            && self.errors.is_empty()
    }
}

/// Validates that a database schema matches the expected structure.
pub struct SchemaValidator;

impl SchemaValidator {
    /// Validate the database at `db_path`.
    pub fn validate(db_path: &Path) -> Result<ValidationReport> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        Self::validate_connection(&conn)
    }

    /// Validate an already-open connection.
    pub fn validate_connection(conn: &Connection) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();

        let fk_enabled: i64 = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0))?;
        report.foreign_keys_enabled = fk_enabled == 1;
        if !report.foreign_keys_enabled {
            report
                .warnings
                .push("Foreign keys not enabled. Run PRAGMA foreign_keys = ON".to_string());
        }

        // Tables
        let tables = Self::master_names(conn, "table")?;
        let expected: HashSet<&str> = EXPECTED_TABLES.iter().copied().collect();
        let mut missing: Vec<&&str> = EXPECTED_TABLES
            .iter()
            .filter(|t| !tables.contains(**t))
            .collect();
        missing.sort();
        let mut extra: Vec<&String> = tables
            .iter()
            .filter(|t| !expected.contains(t.as_str()) && *t != "sqlite_sequence")
            .collect();
        extra.sort();

        if !missing.is_empty() {
            report.errors.push(format!("Missing tables: {:?}", missing));
        } else {
            report.tables_valid = true;
        }
        if !extra.is_empty() {
            report.warnings.push(format!("Unexpected tables: {:?}", extra));
        }

        // Columns per required table
        let mut columns_valid = true;
        for (table, expected_cols) in EXPECTED_COLUMNS {
            if !tables.contains(*table) {
                continue;
            }
            let actual = Self::table_columns(conn, table)?;
            let mut missing_cols: Vec<&&str> = expected_cols
                .iter()
                .filter(|c| !actual.contains(**c))
                .collect();
            missing_cols.sort();
            let expected_set: HashSet<&str> = expected_cols.iter().copied().collect();
            let mut extra_cols: Vec<&String> = actual
                .iter()
                .filter(|c| !expected_set.contains(c.as_str()))
                .collect();
            extra_cols.sort();

            if !missing_cols.is_empty() {
                report.errors.push(format!(
                    "Table {} missing columns: {:?}",
                    table, missing_cols
                ));
                columns_valid = false;
            }
            if !extra_cols.is_empty() {
                report.warnings.push(format!(
                    "Table {} has extra columns: {:?}",
                    table, extra_cols
                ));
            }
        }
        report.columns_valid = columns_valid;

        // Indexes
        let indexes = Self::master_names(conn, "index")?;
        let expected: HashSet<&str> = EXPECTED_INDEXES.iter().copied().collect();
        let mut missing: Vec<&&str> = EXPECTED_INDEXES
            .iter()
            .filter(|i| !indexes.contains(**i))
            .collect();
        missing.sort();
        let mut extra: Vec<&String> = indexes
            .iter()
            .filter(|i| !expected.contains(i.as_str()) && !i.starts_with("sqlite_"))
            .collect();
        extra.sort();

        if !missing.is_empty() {
            report.errors.push(format!("Missing indexes: {:?}", missing));
        } else {
            report.indexes_valid = true;
        }
        if !extra.is_empty() {
            report
                .warnings
                .push(format!("Unexpected indexes: {:?}", extra));
        }

        // Triggers
        let triggers = Self::master_names(conn, "trigger")?;
        let expected: HashSet<&str> = EXPECTED_TRIGGERS.iter().copied().collect();
        let mut missing: Vec<&&str> = EXPECTED_TRIGGERS
            .iter()
            .filter(|t| !triggers.contains(**t))
            .collect();
        missing.sort();
        let mut extra: Vec<&String> = triggers
            .iter()
            .filter(|t| !expected.contains(t.as_str()))
            .collect();
        extra.sort();

        if !missing.is_empty() {
            report
                .errors
                .push(format!("Missing triggers: {:?}", missing));
        } else {
            report.triggers_valid = true;
        }
        if !extra.is_empty() {
            report
                .warnings
                .push(format!("Unexpected triggers: {:?}", extra));
        }

        if !report.errors.is_empty() {
            tracing::error!(errors = ?report.errors, "Schema validation failed");
        } else if !report.warnings.is_empty() {
            tracing::warn!(warnings = ?report.warnings, "Schema validation warnings");
        } else {
            tracing::info!("Schema validation passed");
        }

        Ok(report)
    }

    fn master_names(conn: &Connection, kind: &str) -> Result<HashSet<String>> {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = ?1 AND name NOT LIKE 'sqlite_%'",
        )?;
        let names = stmt
            .query_map([kind], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(names)
    }

    fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(columns)
    }
}
