//! Learning index storage and maintenance
//!
//! Learnings live in the documents database, separate from the state
//! store. [`LearningIndex`] owns the schema and the minimal write surface;
//! [`LearningMaintenanceJob`] is the periodic batch job that keeps the
//! index relevant: decay updates, low-confidence deactivation,
//! supersession, and application pruning.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use crate::db::store::parse_timestamp;
use crate::error::{Error, Result};
use crate::types::{Learning, LearningApplication, LearningStatus};

/// Days after which the decay curve reaches ~0.68
const DECAY_HALF_LIFE_DAYS: f64 = 180.0;

/// Applications older than this many days are pruned
const APPLICATION_RETENTION_DAYS: i64 = 365;

const LEARNING_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS learning_index (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    topic             TEXT NOT NULL,
    category          TEXT NOT NULL,
    content           TEXT NOT NULL,
    confidence_score  REAL NOT NULL DEFAULT 0.5
                      CHECK (confidence_score >= 0.0 AND confidence_score <= 1.0),
    success_rate      REAL NOT NULL DEFAULT 0.0
                      CHECK (success_rate >= 0.0 AND success_rate <= 1.0),
    application_count INTEGER NOT NULL DEFAULT 0,
    decay_factor      REAL NOT NULL DEFAULT 1.0
                      CHECK (decay_factor >= 0.5 AND decay_factor <= 1.0),
    status            TEXT NOT NULL DEFAULT 'active'
                      CHECK (status IN ('active', 'inactive', 'superseded')),
    superseded_by     INTEGER REFERENCES learning_index(id),
    indexed_at        TEXT NOT NULL DEFAULT (datetime('now')),
    metadata          TEXT,

    CHECK (status != 'superseded' OR superseded_by IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_learning_status ON learning_index(status);
CREATE INDEX IF NOT EXISTS idx_learning_category ON learning_index(category);

CREATE TABLE IF NOT EXISTS learning_applications (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    learning_id INTEGER NOT NULL REFERENCES learning_index(id) ON DELETE CASCADE,
    applied_at  TEXT NOT NULL DEFAULT (datetime('now')),
    outcome     TEXT
);

CREATE INDEX IF NOT EXISTS idx_learning_applications_learning
    ON learning_applications(learning_id);
CREATE INDEX IF NOT EXISTS idx_learning_applications_applied
    ON learning_applications(applied_at);
"#;

/// Parameters for indexing a new learning
#[derive(Debug, Clone)]
pub struct NewLearning {
    pub topic: String,
    pub category: String,
    pub content: String,
    pub confidence_score: f64,
    pub success_rate: f64,
    pub application_count: i64,
    /// Defaults to now when unset
    pub indexed_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl NewLearning {
    pub fn new(
        topic: impl Into<String>,
        category: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            category: category.into(),
            content: content.into(),
            confidence_score: 0.5,
            success_rate: 0.0,
            application_count: 0,
            indexed_at: None,
            metadata: serde_json::json!({}),
        }
    }
}

/// Storage for the learning index.
///
/// Opening creates the schema when missing; the index lives in the
/// documents database and never touches the state store's file.
pub struct LearningIndex {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl LearningIndex {
    /// Open (or create) the learning index at the given path.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        conn.execute_batch(LEARNING_SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Path of the backing database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Index a new learning in `active` state.
    pub fn add_learning(&self, new: NewLearning) -> Result<Learning> {
        let indexed_at = new.indexed_at.unwrap_or_else(Utc::now);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO learning_index (
                topic, category, content, confidence_score, success_rate,
                application_count, status, indexed_at, metadata
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7, ?8)",
            params![
                new.topic,
                new.category,
                new.content,
                new.confidence_score,
                new.success_rate,
                new.application_count,
                indexed_at.to_rfc3339(),
                new.metadata.to_string(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        Self::get_learning_on(&conn, id)
    }

    /// Get a learning by id.
    pub fn get_learning(&self, id: i64) -> Result<Learning> {
        let conn = self.conn.lock().unwrap();
        Self::get_learning_on(&conn, id)
    }

    fn get_learning_on(conn: &Connection, id: i64) -> Result<Learning> {
        conn.query_row(
            "SELECT * FROM learning_index WHERE id = ?1",
            params![id],
            row_to_learning,
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("Learning {} not found", id)))
    }

    /// Record one observed use of a learning and bump its counter.
    pub fn record_application(
        &self,
        learning_id: i64,
        outcome: Option<&str>,
        applied_at: Option<DateTime<Utc>>,
    ) -> Result<LearningApplication> {
        let applied_at = applied_at.unwrap_or_else(Utc::now);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO learning_applications (learning_id, applied_at, outcome)
             VALUES (?1, ?2, ?3)",
            params![learning_id, applied_at.to_rfc3339(), outcome],
        )?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "UPDATE learning_index SET application_count = application_count + 1 WHERE id = ?1",
            params![learning_id],
        )?;
        let application = conn.query_row(
            "SELECT * FROM learning_applications WHERE id = ?1",
            params![id],
            row_to_application,
        )?;
        Ok(application)
    }
}

/// Report from one maintenance run
#[derive(Debug, Clone, serde::Serialize)]
pub struct MaintenanceReport {
    pub decay_updates: usize,
    pub deactivated: usize,
    pub superseded: usize,
    pub pruned_applications: usize,
    pub execution_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// Automated maintenance job for the learning index.
///
/// The four stages run sequentially inside a single transaction per
/// invocation; any stage failure aborts the whole run with rollback. The
/// job owns one connection behind a mutex, so concurrent callers serialize
/// rather than interleave.
pub struct LearningMaintenanceJob {
    conn: Mutex<Connection>,
}

impl LearningMaintenanceJob {
    /// Open the job over the documents database, creating the learning
    /// schema when missing.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        conn.execute_batch(LEARNING_SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a full maintenance cycle.
    ///
    /// With `dry_run` set, nothing is mutated; the report carries count
    /// estimates from read-only queries. The supersession figure in
    /// dry-run mode is an approximation (about 10% of same-category
    /// groups of size > 1), not an exact prediction.
    pub fn run_maintenance(&self, dry_run: bool, verbose: bool) -> Result<MaintenanceReport> {
        let start = Instant::now();
        let timestamp = Utc::now();

        tracing::info!(dry_run, verbose, "Learning maintenance started");

        let mut conn = self.conn.lock().unwrap();

        let report = if dry_run {
            MaintenanceReport {
                decay_updates: Self::count_active(&conn)?,
                deactivated: Self::count_low_confidence(&conn)?,
                superseded: Self::estimate_supersede_candidates(&conn)?,
                pruned_applications: Self::count_old_applications(&conn)?,
                execution_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                timestamp,
            }
        } else {
            let tx = conn.transaction()?;
            let decay_updates = Self::update_decay_factors(&tx, verbose)?;
            let deactivated = Self::deactivate_low_confidence(&tx, verbose)?;
            let superseded = Self::supersede_outdated(&tx, verbose)?;
            let pruned_applications = Self::prune_old_applications(&tx, verbose)?;
            tx.commit()?;

            MaintenanceReport {
                decay_updates,
                deactivated,
                superseded,
                pruned_applications,
                execution_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                timestamp,
            }
        };

        tracing::info!(
            dry_run,
            decay_updates = report.decay_updates,
            deactivated = report.deactivated,
            superseded = report.superseded,
            pruned_applications = report.pruned_applications,
            execution_time_ms = report.execution_time_ms,
            "Learning maintenance completed"
        );

        Ok(report)
    }

    /// Stage 1: refresh the decay factor of every active learning.
    fn update_decay_factors(conn: &Connection, verbose: bool) -> Result<usize> {
        let mut stmt =
            conn.prepare("SELECT id, indexed_at FROM learning_index WHERE status = 'active'")?;
        let learnings = stmt
            .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        let mut updated = 0usize;
        for (id, indexed_at) in learnings {
            let decay = calculate_decay(parse_timestamp(&indexed_at), Utc::now());
            conn.execute(
                "UPDATE learning_index SET decay_factor = ?1 WHERE id = ?2",
                params![decay, id],
            )?;
            updated += 1;

            if verbose && updated <= 5 {
                tracing::debug!(learning_id = id, decay_factor = decay, "Decay updated");
            }
        }
        Ok(updated)
    }

    /// Stage 2: deactivate learnings that stayed unconvincing after
    /// enough applications.
    fn deactivate_low_confidence(conn: &Connection, verbose: bool) -> Result<usize> {
        let mut stmt = conn.prepare(
            "SELECT id, topic, confidence_score, success_rate, application_count, metadata
             FROM learning_index
             WHERE status = 'active'
               AND confidence_score < 0.2
               AND success_rate < 0.3
               AND application_count >= 5",
        )?;
        let candidates = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, f64>(2)?,
                    r.get::<_, f64>(3)?,
                    r.get::<_, i64>(4)?,
                    r.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        let mut deactivated = 0usize;
        for (id, topic, confidence, success_rate, applications, metadata) in candidates {
            let mut metadata: serde_json::Value = metadata
                .as_deref()
                .and_then(|m| serde_json::from_str(m).ok())
                .unwrap_or_else(|| serde_json::json!({}));
            if let Some(map) = metadata.as_object_mut() {
                map.insert(
                    "deactivated_reason".to_string(),
                    serde_json::json!("Low confidence after 5+ applications"),
                );
                map.insert(
                    "deactivated_at".to_string(),
                    serde_json::json!(Utc::now().to_rfc3339()),
                );
            }

            conn.execute(
                "UPDATE learning_index SET status = 'inactive', metadata = ?1 WHERE id = ?2",
                params![metadata.to_string(), id],
            )?;
            deactivated += 1;

            if verbose {
                tracing::info!(
                    learning_id = id,
                    topic = %topic,
                    confidence,
                    success_rate,
                    applications,
                    "Learning deactivated"
                );
            }
        }
        Ok(deactivated)
    }

    /// Stage 3: per category, mark older learnings superseded when a
    /// newer one outperforms them by more than 0.2 confidence. Each older
    /// learning is superseded at most once per run; the newest qualifying
    /// learning wins.
    fn supersede_outdated(conn: &Connection, verbose: bool) -> Result<usize> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT category FROM learning_index
             WHERE status = 'active' AND superseded_by IS NULL",
        )?;
        let categories = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        let mut superseded_ids: HashSet<i64> = HashSet::new();
        for category in categories {
            let mut stmt = conn.prepare(
                "SELECT id, topic, confidence_score FROM learning_index
                 WHERE category = ?1 AND status = 'active' AND superseded_by IS NULL
                 ORDER BY indexed_at DESC",
            )?;
            let learnings = stmt
                .query_map(params![category], |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, f64>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            drop(stmt);

            for (i, (newer_id, newer_topic, newer_confidence)) in learnings.iter().enumerate() {
                for (older_id, older_topic, older_confidence) in learnings.iter().skip(i + 1) {
                    if superseded_ids.contains(older_id) {
                        continue;
                    }
                    let confidence_delta = newer_confidence - older_confidence;
                    if confidence_delta > 0.2 {
                        conn.execute(
                            "UPDATE learning_index
                             SET superseded_by = ?1, status = 'superseded'
                             WHERE id = ?2",
                            params![newer_id, older_id],
                        )?;
                        superseded_ids.insert(*older_id);

                        if verbose {
                            tracing::info!(
                                old_id = older_id,
                                old_topic = %older_topic,
                                new_id = newer_id,
                                new_topic = %newer_topic,
                                confidence_delta,
                                "Learning superseded"
                            );
                        }
                    }
                }
            }
        }
        Ok(superseded_ids.len())
    }

    /// Stage 4: delete applications older than the retention window.
    fn prune_old_applications(conn: &Connection, verbose: bool) -> Result<usize> {
        let cutoff = (Utc::now() - Duration::days(APPLICATION_RETENTION_DAYS)).to_rfc3339();
        let pruned = conn.execute(
            "DELETE FROM learning_applications WHERE applied_at < ?1",
            params![cutoff],
        )?;
        if verbose && pruned > 0 {
            tracing::info!(count = pruned, cutoff = %cutoff, "Applications pruned");
        }
        Ok(pruned)
    }

    // Dry-run preview queries

    fn count_active(conn: &Connection) -> Result<usize> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM learning_index WHERE status = 'active'",
            [],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    fn count_low_confidence(conn: &Connection) -> Result<usize> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM learning_index
             WHERE status = 'active'
               AND confidence_score < 0.2
               AND success_rate < 0.3
               AND application_count >= 5",
            [],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    /// Approximate supersession count: ~10% of the members of
    /// same-category groups with more than one active learning.
    fn estimate_supersede_candidates(conn: &Connection) -> Result<usize> {
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(cnt), 0) FROM (
                SELECT COUNT(*) AS cnt FROM learning_index
                WHERE status = 'active' AND superseded_by IS NULL
                GROUP BY category
                HAVING cnt > 1
            )",
            [],
            |r| r.get(0),
        )?;
        Ok((total as f64 * 0.1) as usize)
    }

    fn count_old_applications(conn: &Connection) -> Result<usize> {
        let cutoff = (Utc::now() - Duration::days(APPLICATION_RETENTION_DAYS)).to_rfc3339();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM learning_applications WHERE applied_at < ?1",
            params![cutoff],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }
}

/// Smooth exponential decay: `0.5 + 0.5 · exp(−days / 180)`, clamped to
/// [0.5, 1.0]. No cliffs: 0d → 1.00, 30d → 0.92, 90d → 0.81, 180d → 0.68,
/// 365d → 0.56.
pub fn calculate_decay(indexed_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days_old = now.signed_duration_since(indexed_at).num_days() as f64;
    let decay = 0.5 + 0.5 * (-days_old / DECAY_HALF_LIFE_DAYS).exp();
    decay.clamp(0.5, 1.0)
}

fn row_to_learning(row: &Row) -> rusqlite::Result<Learning> {
    let status: String = row.get("status")?;
    let indexed_at: String = row.get("indexed_at")?;
    let metadata: Option<String> = row.get("metadata")?;

    Ok(Learning {
        id: row.get("id")?,
        topic: row.get("topic")?,
        category: row.get("category")?,
        content: row.get("content")?,
        confidence_score: row.get("confidence_score")?,
        success_rate: row.get("success_rate")?,
        application_count: row.get("application_count")?,
        decay_factor: row.get("decay_factor")?,
        status: status.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
        })?,
        superseded_by: row.get("superseded_by")?,
        indexed_at: parse_timestamp(&indexed_at),
        metadata: metadata
            .as_deref()
            .and_then(|m| serde_json::from_str(m).ok())
            .unwrap_or_else(|| serde_json::json!({})),
    })
}

fn row_to_application(row: &Row) -> rusqlite::Result<LearningApplication> {
    let applied_at: String = row.get("applied_at")?;
    Ok(LearningApplication {
        id: row.get("id")?,
        learning_id: row.get("learning_id")?,
        applied_at: parse_timestamp(&applied_at),
        outcome: row.get("outcome")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn index(dir: &TempDir) -> LearningIndex {
        LearningIndex::open(dir.path().join("documents.db")).unwrap()
    }

    fn job(index: &LearningIndex) -> LearningMaintenanceJob {
        LearningMaintenanceJob::new(index.db_path()).unwrap()
    }

    #[test]
    fn test_decay_curve_shape() {
        let now = Utc::now();
        let at = |days: i64| now - Duration::days(days);

        assert!((calculate_decay(at(0), now) - 1.0).abs() < 0.01);
        assert!((calculate_decay(at(30), now) - 0.92).abs() < 0.01);
        assert!((calculate_decay(at(90), now) - 0.81).abs() < 0.01);
        assert!((calculate_decay(at(180), now) - 0.68).abs() < 0.01);
        assert!((calculate_decay(at(365), now) - 0.56).abs() < 0.01);
        // Never drops below the floor
        assert!(calculate_decay(at(10_000), now) >= 0.5);
    }

    #[test]
    fn test_decay_is_monotone_in_age() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        let mut older = NewLearning::new("older", "process", "text");
        older.indexed_at = Some(Utc::now() - Duration::days(200));
        let older = index.add_learning(older).unwrap();

        let mut newer = NewLearning::new("newer", "process", "text");
        newer.indexed_at = Some(Utc::now() - Duration::days(20));
        let newer = index.add_learning(newer).unwrap();

        job(&index).run_maintenance(false, false).unwrap();

        let older = index.get_learning(older.id).unwrap();
        let newer = index.get_learning(newer.id).unwrap();
        assert!(older.decay_factor <= newer.decay_factor);
        assert!(older.decay_factor >= 0.5);
        assert!(newer.decay_factor <= 1.0);
    }

    #[test]
    fn test_deactivation_criteria() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        let mut weak = NewLearning::new("weak", "quality", "never worked");
        weak.confidence_score = 0.1;
        weak.success_rate = 0.2;
        weak.application_count = 6;
        let weak = index.add_learning(weak).unwrap();

        // Strong learning with identical application count stays active
        let mut strong = NewLearning::new("strong", "quality", "works well");
        strong.confidence_score = 0.9;
        strong.success_rate = 0.8;
        strong.application_count = 6;
        let strong = index.add_learning(strong).unwrap();

        let report = job(&index).run_maintenance(false, false).unwrap();
        assert_eq!(report.deactivated, 1);

        let weak = index.get_learning(weak.id).unwrap();
        assert_eq!(weak.status, LearningStatus::Inactive);
        assert_eq!(
            weak.metadata["deactivated_reason"],
            serde_json::json!("Low confidence after 5+ applications")
        );
        assert!(weak.metadata["deactivated_at"].is_string());

        let strong = index.get_learning(strong.id).unwrap();
        assert_eq!(strong.status, LearningStatus::Active);
    }

    #[test]
    fn test_supersession_within_category() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        let mut old = NewLearning::new("old wisdom", "architectural", "text");
        old.confidence_score = 0.4;
        old.indexed_at = Some(Utc::now() - Duration::days(100));
        let old = index.add_learning(old).unwrap();

        let mut new = NewLearning::new("new wisdom", "architectural", "text");
        new.confidence_score = 0.9;
        new.indexed_at = Some(Utc::now() - Duration::days(1));
        let new = index.add_learning(new).unwrap();

        // Different category is untouched despite lower confidence
        let mut other = NewLearning::new("other", "process", "text");
        other.confidence_score = 0.1;
        other.indexed_at = Some(Utc::now() - Duration::days(300));
        let other = index.add_learning(other).unwrap();

        let report = job(&index).run_maintenance(false, false).unwrap();
        assert_eq!(report.superseded, 1);

        let old = index.get_learning(old.id).unwrap();
        assert_eq!(old.status, LearningStatus::Superseded);
        assert_eq!(old.superseded_by, Some(new.id));

        assert_eq!(
            index.get_learning(new.id).unwrap().status,
            LearningStatus::Active
        );
        assert_eq!(
            index.get_learning(other.id).unwrap().status,
            LearningStatus::Active
        );
    }

    #[test]
    fn test_small_confidence_delta_does_not_supersede() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        let mut old = NewLearning::new("old", "team", "text");
        old.confidence_score = 0.5;
        old.indexed_at = Some(Utc::now() - Duration::days(50));
        let old = index.add_learning(old).unwrap();

        let mut new = NewLearning::new("new", "team", "text");
        new.confidence_score = 0.65;
        let _ = index.add_learning(new).unwrap();

        let report = job(&index).run_maintenance(false, false).unwrap();
        assert_eq!(report.superseded, 0);
        assert_eq!(
            index.get_learning(old.id).unwrap().status,
            LearningStatus::Active
        );
    }

    #[test]
    fn test_prune_old_applications() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        let learning = index
            .add_learning(NewLearning::new("pruned", "technical", "text"))
            .unwrap();
        index
            .record_application(
                learning.id,
                Some("success"),
                Some(Utc::now() - Duration::days(400)),
            )
            .unwrap();
        index
            .record_application(learning.id, Some("success"), None)
            .unwrap();

        let report = job(&index).run_maintenance(false, false).unwrap();
        assert_eq!(report.pruned_applications, 1);

        let learning = index.get_learning(learning.id).unwrap();
        assert_eq!(learning.application_count, 2);
    }

    #[test]
    fn test_dry_run_mutates_nothing() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        let mut weak = NewLearning::new("weak", "quality", "text");
        weak.confidence_score = 0.1;
        weak.success_rate = 0.2;
        weak.application_count = 6;
        weak.indexed_at = Some(Utc::now() - Duration::days(90));
        let weak = index.add_learning(weak).unwrap();
        index
            .record_application(
                weak.id,
                None,
                Some(Utc::now() - Duration::days(500)),
            )
            .unwrap();

        let report = job(&index).run_maintenance(true, false).unwrap();
        assert_eq!(report.decay_updates, 1);
        assert_eq!(report.deactivated, 1);
        assert_eq!(report.pruned_applications, 1);

        // Nothing actually changed
        let after = index.get_learning(weak.id).unwrap();
        assert_eq!(after.status, LearningStatus::Active);
        assert_eq!(after.decay_factor, 1.0);
        let count: i64 = {
            let conn = index.conn.lock().unwrap();
            conn.query_row("SELECT COUNT(*) FROM learning_applications", [], |r| {
                r.get(0)
            })
            .unwrap()
        };
        assert_eq!(count, 1);
    }

    #[test]
    fn test_maintenance_performance() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);
        for i in 0..1000 {
            let mut new = NewLearning::new(
                format!("learning-{}", i),
                format!("category-{}", i % 6),
                "text",
            );
            new.confidence_score = (i % 100) as f64 / 100.0;
            new.indexed_at = Some(Utc::now() - Duration::days(i % 400));
            index.add_learning(new).unwrap();
        }

        let start = std::time::Instant::now();
        job(&index).run_maintenance(false, false).unwrap();
        let elapsed = start.elapsed();
        assert!(
            elapsed.as_secs() < 5,
            "maintenance over 1000 learnings took {:?}",
            elapsed
        );
    }
}
