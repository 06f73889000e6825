//! Transactional state store
//!
//! [`StateTracker`] provides thread-safe CRUD for epics, stories, sprints,
//! and workflow executions. Every public operation borrows a connection
//! scoped to the call: open, enable foreign keys, run the body inside one
//! transaction, commit on success, roll back on any error. No partial
//! writes are ever observable.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::*;

/// Parameters for creating a story.
///
/// Only the identifying triple is required; everything else carries the
/// usual defaults (`pending`, `P1`, zero points).
#[derive(Debug, Clone)]
pub struct NewStory {
    pub epic_num: i64,
    pub story_num: i64,
    pub title: String,
    pub status: StoryStatus,
    pub owner: Option<String>,
    pub points: i64,
    pub priority: Priority,
    pub sprint: Option<i64>,
    pub content_hash: Option<String>,
}

impl NewStory {
    pub fn new(epic_num: i64, story_num: i64, title: impl Into<String>) -> Self {
        Self {
            epic_num,
            story_num,
            title: title.into(),
            status: StoryStatus::Pending,
            owner: None,
            points: 0,
            priority: Priority::P1,
            sprint: None,
            content_hash: None,
        }
    }
}

/// Burndown metrics for one sprint
#[derive(Debug, Clone, serde::Serialize)]
pub struct SprintBurndown {
    pub sprint_num: i64,
    pub total_points: i64,
    pub completed_points: i64,
    pub remaining_points: i64,
    pub completion_rate: f64,
}

/// Aggregated execution metrics for one workflow name
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkflowMetrics {
    pub workflow_name: String,
    pub total_executions: i64,
    pub successful: i64,
    pub failed: i64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
}

/// Thread-safe state tracker with comprehensive CRUD operations.
///
/// Construction fails when the database file does not exist; creating and
/// migrating the file is [`schema::initialize`](super::schema::initialize)'s
/// job, never an implicit side effect of opening the store.
#[derive(Clone)]
pub struct StateTracker {
    db_path: PathBuf,
}

impl StateTracker {
    /// Open a tracker over an existing database file.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if !db_path.exists() {
            return Err(Error::Connection(db_path.display().to_string()));
        }
        Ok(Self { db_path })
    }

    /// Path of the backing database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run one logical operation inside its own connection and transaction.
    ///
    /// The transaction commits only when the closure returns `Ok`; on error
    /// the drop of the transaction rolls everything back before the
    /// connection is released.
    pub(crate) fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = Connection::open(&self.db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let tx = conn.transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }

    // ============================================
    // Story operations
    // ============================================

    /// Create a new story.
    ///
    /// The row is inserted as `pending` and then transitioned to the
    /// requested status inside the same transaction, so the audit and
    /// point-recomputation triggers observe the transition like any other
    /// status change.
    pub fn create_story(&self, new: NewStory) -> Result<Story> {
        let now = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO stories (
                    epic_num, story_num, title, status, owner,
                    points, priority, content_hash, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    new.epic_num,
                    new.story_num,
                    new.title,
                    new.owner,
                    new.points,
                    new.priority.as_str(),
                    new.content_hash,
                    now,
                ],
            )?;

            if new.status != StoryStatus::Pending {
                conn.execute(
                    "UPDATE stories SET status = ?1 WHERE epic_num = ?2 AND story_num = ?3",
                    params![new.status.as_str(), new.epic_num, new.story_num],
                )?;
            }

            if let Some(sprint) = new.sprint {
                conn.execute(
                    "INSERT INTO story_assignments (sprint_num, epic_num, story_num) VALUES (?1, ?2, ?3)",
                    params![sprint, new.epic_num, new.story_num],
                )?;
            }
            Ok(())
        })?;

        // Query in a new transaction to observe the committed row
        self.get_story(new.epic_num, new.story_num)
    }

    /// Get a story by epic and story number.
    pub fn get_story(&self, epic_num: i64, story_num: i64) -> Result<Story> {
        self.with_connection(|conn| {
            let story = conn
                .query_row(
                    "SELECT * FROM stories WHERE epic_num = ?1 AND story_num = ?2",
                    params![epic_num, story_num],
                    row_to_story,
                )
                .optional()?
                .ok_or_else(|| Error::NotFound(format!("Story {}.{} not found", epic_num, story_num)))?;
            attach_sprint(conn, story)
        })
    }

    /// Update story status. Updating to the current status still succeeds
    /// and still produces one audit row.
    pub fn update_story_status(
        &self,
        epic_num: i64,
        story_num: i64,
        status: StoryStatus,
    ) -> Result<Story> {
        self.update_story_field(epic_num, story_num, "status", status.as_str())
    }

    /// Assign an owner to a story.
    pub fn update_story_owner(&self, epic_num: i64, story_num: i64, owner: &str) -> Result<Story> {
        self.update_story_field(epic_num, story_num, "owner", owner)
    }

    /// Update story points.
    pub fn update_story_points(&self, epic_num: i64, story_num: i64, points: i64) -> Result<Story> {
        self.with_connection(|conn| {
            let changed = conn.execute(
                "UPDATE stories SET points = ?1 WHERE epic_num = ?2 AND story_num = ?3",
                params![points, epic_num, story_num],
            )?;
            if changed == 0 {
                return Err(Error::NotFound(format!(
                    "Story {}.{} not found",
                    epic_num, story_num
                )));
            }
            Ok(())
        })?;
        self.get_story(epic_num, story_num)
    }

    /// Update the stored content hash of a story's markdown file.
    pub fn update_story_hash(&self, epic_num: i64, story_num: i64, content_hash: &str) -> Result<Story> {
        self.update_story_field(epic_num, story_num, "content_hash", content_hash)
    }

    fn update_story_field(
        &self,
        epic_num: i64,
        story_num: i64,
        field: &str,
        value: &str,
    ) -> Result<Story> {
        self.with_connection(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE stories SET {} = ?1 WHERE epic_num = ?2 AND story_num = ?3",
                    field
                ),
                params![value, epic_num, story_num],
            )?;
            if changed == 0 {
                return Err(Error::NotFound(format!(
                    "Story {}.{} not found",
                    epic_num, story_num
                )));
            }
            Ok(())
        })?;
        self.get_story(epic_num, story_num)
    }

    /// Get stories by status with pagination, ordered by `(epic, story)`.
    pub fn get_stories_by_status(
        &self,
        status: StoryStatus,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Story>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM stories WHERE status = ?1 \
                 ORDER BY epic_num, story_num LIMIT ?2 OFFSET ?3",
            )?;
            let stories = stmt
                .query_map(params![status.as_str(), limit, offset], row_to_story)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            stories
                .into_iter()
                .map(|s| attach_sprint(conn, s))
                .collect()
        })
    }

    /// Get all stories in an epic, ordered by story number.
    pub fn get_stories_by_epic(&self, epic_num: i64) -> Result<Vec<Story>> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM stories WHERE epic_num = ?1 ORDER BY story_num")?;
            let stories = stmt
                .query_map(params![epic_num], row_to_story)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            stories
                .into_iter()
                .map(|s| attach_sprint(conn, s))
                .collect()
        })
    }

    /// Get all stories assigned to a sprint.
    pub fn get_stories_by_sprint(&self, sprint_num: i64) -> Result<Vec<Story>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.* FROM stories s
                 JOIN story_assignments sa
                   ON s.epic_num = sa.epic_num AND s.story_num = sa.story_num
                 WHERE sa.sprint_num = ?1
                 ORDER BY s.epic_num, s.story_num",
            )?;
            let stories = stmt
                .query_map(params![sprint_num], row_to_story)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(stories
                .into_iter()
                .map(|mut s| {
                    s.sprint = Some(sprint_num);
                    s
                })
                .collect())
        })
    }

    /// All stories currently `in_progress`.
    pub fn get_stories_in_progress(&self) -> Result<Vec<Story>> {
        self.get_stories_by_status(StoryStatus::InProgress, 100, 0)
    }

    /// All stories currently `blocked`.
    pub fn get_blocked_stories(&self) -> Result<Vec<Story>> {
        self.get_stories_by_status(StoryStatus::Blocked, 100, 0)
    }

    // ============================================
    // Epic operations
    // ============================================

    /// Create a new epic.
    pub fn create_epic(
        &self,
        epic_num: i64,
        title: &str,
        feature: &str,
        total_points: i64,
    ) -> Result<Epic> {
        let now = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO epics (
                    epic_num, name, feature, status,
                    total_points, completed_points, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, 'active', ?4, 0, ?5, ?5)",
                params![epic_num, title, feature, total_points, now],
            )?;
            Ok(())
        })?;
        self.get_epic(epic_num)
    }

    /// Get an epic by number.
    pub fn get_epic(&self, epic_num: i64) -> Result<Epic> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT * FROM epics WHERE epic_num = ?1",
                params![epic_num],
                row_to_epic,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Epic {} not found", epic_num)))
        })
    }

    /// Epic completion percentage in [0, 100].
    pub fn get_epic_progress(&self, epic_num: i64) -> Result<f64> {
        Ok(self.get_epic(epic_num)?.progress())
    }

    /// Set epic total and completed points directly.
    ///
    /// The status triggers are authoritative for point movement during
    /// normal operation; this exists for the importer, which seeds both
    /// counters from legacy data in one step.
    pub fn update_epic_points(&self, epic_num: i64, total: i64, completed: i64) -> Result<Epic> {
        self.with_connection(|conn| {
            let changed = conn.execute(
                "UPDATE epics SET total_points = ?1, completed_points = ?2 WHERE epic_num = ?3",
                params![total, completed, epic_num],
            )?;
            if changed == 0 {
                return Err(Error::NotFound(format!("Epic {} not found", epic_num)));
            }
            Ok(())
        })?;
        self.get_epic(epic_num)
    }

    /// Update epic status.
    pub fn update_epic_status(&self, epic_num: i64, status: EpicStatus) -> Result<Epic> {
        self.with_connection(|conn| {
            let changed = conn.execute(
                "UPDATE epics SET status = ?1 WHERE epic_num = ?2",
                params![status.as_str(), epic_num],
            )?;
            if changed == 0 {
                return Err(Error::NotFound(format!("Epic {} not found", epic_num)));
            }
            Ok(())
        })?;
        self.get_epic(epic_num)
    }

    /// All epics with status `active`, ordered by epic number.
    pub fn get_active_epics(&self) -> Result<Vec<Epic>> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM epics WHERE status = 'active' ORDER BY epic_num")?;
            let epics = stmt
                .query_map([], row_to_epic)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(epics)
        })
    }

    /// All epics for a feature slug.
    pub fn get_epics_by_feature(&self, feature: &str) -> Result<Vec<Epic>> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM epics WHERE feature = ?1 ORDER BY epic_num")?;
            let epics = stmt
                .query_map(params![feature], row_to_epic)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(epics)
        })
    }

    /// Story completion rate for an epic: done stories / total stories
    /// (0 when the epic has no stories).
    pub fn get_epic_velocity(&self, epic_num: i64) -> Result<f64> {
        self.get_epic(epic_num)?;
        self.with_connection(|conn| {
            let (total, completed): (i64, i64) = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN status = 'done' THEN 1 ELSE 0 END), 0)
                 FROM stories WHERE epic_num = ?1",
                params![epic_num],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            if total == 0 {
                Ok(0.0)
            } else {
                Ok(completed as f64 / total as f64)
            }
        })
    }

    // ============================================
    // Sprint operations
    // ============================================

    /// Create a new sprint named `Sprint <N>`.
    ///
    /// `end_date` must be strictly after `start_date`; the check runs
    /// before any row is written (the schema enforces it again).
    pub fn create_sprint(
        &self,
        sprint_num: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Sprint> {
        if end_date <= start_date {
            return Err(Error::Validation(
                "end_date must be after start_date".to_string(),
            ));
        }
        let now = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO sprints (sprint_num, name, start_date, end_date, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?5)",
                params![
                    sprint_num,
                    format!("Sprint {}", sprint_num),
                    start_date.format("%Y-%m-%d").to_string(),
                    end_date.format("%Y-%m-%d").to_string(),
                    now,
                ],
            )?;
            Ok(())
        })?;
        self.get_sprint(sprint_num)
    }

    /// Get a sprint by number.
    pub fn get_sprint(&self, sprint_num: i64) -> Result<Sprint> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT * FROM sprints WHERE sprint_num = ?1",
                params![sprint_num],
                row_to_sprint,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Sprint {} not found", sprint_num)))
        })
    }

    /// The most recent sprint with status `active`, if any.
    pub fn get_current_sprint(&self) -> Result<Option<Sprint>> {
        self.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM sprints WHERE status = 'active' ORDER BY sprint_num DESC LIMIT 1",
                    [],
                    row_to_sprint,
                )
                .optional()?)
        })
    }

    /// Assign a story to a sprint, replacing any previous assignment.
    /// Removal of the old row, the insert, and the story touch are one
    /// transaction.
    pub fn assign_story_to_sprint(
        &self,
        epic_num: i64,
        story_num: i64,
        sprint_num: i64,
    ) -> Result<Story> {
        self.get_sprint(sprint_num)?;
        self.get_story(epic_num, story_num)?;

        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM story_assignments WHERE epic_num = ?1 AND story_num = ?2",
                params![epic_num, story_num],
            )?;
            conn.execute(
                "INSERT INTO story_assignments (sprint_num, epic_num, story_num) VALUES (?1, ?2, ?3)",
                params![sprint_num, epic_num, story_num],
            )?;
            conn.execute(
                "UPDATE stories SET updated_at = datetime('now') WHERE epic_num = ?1 AND story_num = ?2",
                params![epic_num, story_num],
            )?;
            Ok(())
        })?;
        self.get_story(epic_num, story_num)
    }

    /// Remove a story's sprint assignment, if any.
    pub fn unassign_story_from_sprint(&self, epic_num: i64, story_num: i64) -> Result<Story> {
        self.get_story(epic_num, story_num)?;
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM story_assignments WHERE epic_num = ?1 AND story_num = ?2",
                params![epic_num, story_num],
            )?;
            conn.execute(
                "UPDATE stories SET updated_at = datetime('now') WHERE epic_num = ?1 AND story_num = ?2",
                params![epic_num, story_num],
            )?;
            Ok(())
        })?;
        self.get_story(epic_num, story_num)
    }

    /// All stories in a sprint (alias of [`get_stories_by_sprint`]).
    ///
    /// [`get_stories_by_sprint`]: StateTracker::get_stories_by_sprint
    pub fn get_sprint_stories(&self, sprint_num: i64) -> Result<Vec<Story>> {
        self.get_stories_by_sprint(sprint_num)
    }

    /// Sprint velocity: sum of points over assigned stories that are done.
    pub fn get_sprint_velocity(&self, sprint_num: i64) -> Result<i64> {
        self.get_sprint(sprint_num)?;
        self.with_connection(|conn| {
            let velocity: i64 = conn.query_row(
                "SELECT COALESCE(SUM(s.points), 0)
                 FROM stories s
                 JOIN story_assignments sa
                   ON s.epic_num = sa.epic_num AND s.story_num = sa.story_num
                 WHERE sa.sprint_num = ?1 AND s.status = 'done'",
                params![sprint_num],
                |r| r.get(0),
            )?;
            Ok(velocity)
        })
    }

    /// Sprint story completion rate: done / total (0 when empty).
    pub fn get_sprint_completion_rate(&self, sprint_num: i64) -> Result<f64> {
        self.get_sprint(sprint_num)?;
        self.with_connection(|conn| {
            let (total, completed): (i64, i64) = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN s.status = 'done' THEN 1 ELSE 0 END), 0)
                 FROM stories s
                 JOIN story_assignments sa
                   ON s.epic_num = sa.epic_num AND s.story_num = sa.story_num
                 WHERE sa.sprint_num = ?1",
                params![sprint_num],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            if total == 0 {
                Ok(0.0)
            } else {
                Ok(completed as f64 / total as f64)
            }
        })
    }

    /// Burndown metrics for a sprint.
    pub fn get_sprint_burndown(&self, sprint_num: i64) -> Result<SprintBurndown> {
        self.get_sprint(sprint_num)?;
        let completion_rate = self.get_sprint_completion_rate(sprint_num)?;
        self.with_connection(|conn| {
            let (total_points, completed_points): (i64, i64) = conn.query_row(
                "SELECT COALESCE(SUM(s.points), 0),
                        COALESCE(SUM(CASE WHEN s.status = 'done' THEN s.points ELSE 0 END), 0)
                 FROM stories s
                 JOIN story_assignments sa
                   ON s.epic_num = sa.epic_num AND s.story_num = sa.story_num
                 WHERE sa.sprint_num = ?1",
                params![sprint_num],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            Ok(SprintBurndown {
                sprint_num,
                total_points,
                completed_points,
                remaining_points: total_points - completed_points,
                completion_rate,
            })
        })
    }

    // ============================================
    // Workflow operations
    // ============================================

    /// Record the start of a workflow execution in `running` state.
    pub fn track_workflow_execution(
        &self,
        workflow_id: &str,
        epic_num: i64,
        story_num: i64,
        workflow_name: &str,
    ) -> Result<WorkflowExecution> {
        let now = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO workflow_executions (
                    workflow_name, epic_num, story_num, status, executor, started_at
                )
                VALUES (?1, ?2, ?3, 'running', ?4, ?5)",
                params![workflow_name, epic_num, story_num, workflow_id, now],
            )?;
            Ok(())
        })?;
        self.get_workflow_execution(workflow_id)
    }

    /// Transition a workflow execution and persist its result payload.
    /// `duration_ms` is derived from the started/completed timestamps.
    pub fn update_workflow_status(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
        result: Option<&serde_json::Value>,
    ) -> Result<WorkflowExecution> {
        let completed_at = Utc::now();
        let result_str = result.map(|v| v.to_string());
        self.with_connection(|conn| {
            let started_at: Option<String> = conn
                .query_row(
                    "SELECT started_at FROM workflow_executions WHERE executor = ?1",
                    params![workflow_id],
                    |r| r.get(0),
                )
                .optional()?;
            let started_at = started_at.ok_or_else(|| {
                Error::NotFound(format!("Workflow execution {} not found", workflow_id))
            })?;

            let duration_ms = completed_at
                .signed_duration_since(parse_timestamp(&started_at))
                .num_milliseconds()
                .max(0);

            conn.execute(
                "UPDATE workflow_executions
                 SET status = ?1, completed_at = ?2, duration_ms = ?3, output = ?4
                 WHERE executor = ?5",
                params![
                    status.as_str(),
                    completed_at.to_rfc3339(),
                    duration_ms,
                    result_str,
                    workflow_id,
                ],
            )?;
            Ok(())
        })?;
        self.get_workflow_execution(workflow_id)
    }

    /// Get a workflow execution by its correlation key.
    pub fn get_workflow_execution(&self, workflow_id: &str) -> Result<WorkflowExecution> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT * FROM workflow_executions WHERE executor = ?1",
                params![workflow_id],
                row_to_workflow,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Workflow execution {} not found", workflow_id)))
        })
    }

    /// Workflow history for a story, newest first.
    pub fn get_story_workflow_history(
        &self,
        epic_num: i64,
        story_num: i64,
    ) -> Result<Vec<WorkflowExecution>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM workflow_executions
                 WHERE epic_num = ?1 AND story_num = ?2
                 ORDER BY started_at DESC",
            )?;
            let executions = stmt
                .query_map(params![epic_num, story_num], row_to_workflow)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(executions)
        })
    }

    /// All failed workflow executions, newest first.
    pub fn get_failed_workflows(&self) -> Result<Vec<WorkflowExecution>> {
        self.get_workflows_by_status(WorkflowStatus::Failed)
    }

    /// All executions still in `running` state (candidates for recovery
    /// after a process restart).
    pub fn get_running_workflows(&self) -> Result<Vec<WorkflowExecution>> {
        self.get_workflows_by_status(WorkflowStatus::Running)
    }

    fn get_workflows_by_status(&self, status: WorkflowStatus) -> Result<Vec<WorkflowExecution>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM workflow_executions WHERE status = ?1 ORDER BY started_at DESC",
            )?;
            let executions = stmt
                .query_map(params![status.as_str()], row_to_workflow)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(executions)
        })
    }

    /// Aggregate execution metrics for one workflow name.
    pub fn get_workflow_metrics(&self, workflow_name: &str) -> Result<WorkflowMetrics> {
        self.with_connection(|conn| {
            let (total, successful, failed, avg_duration): (i64, i64, i64, Option<f64>) = conn
                .query_row(
                    "SELECT COUNT(*),
                            COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                            COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
                            AVG(duration_ms)
                     FROM workflow_executions
                     WHERE workflow_name = ?1",
                    params![workflow_name],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
                )?;
            Ok(WorkflowMetrics {
                workflow_name: workflow_name.to_string(),
                total_executions: total,
                successful,
                failed,
                success_rate: if total > 0 {
                    successful as f64 / total as f64
                } else {
                    0.0
                },
                avg_duration_ms: avg_duration.unwrap_or(0.0),
            })
        })
    }
}

// ============================================
// Row mapping
// ============================================

/// Parse a stored timestamp, accepting both RFC 3339 (written by the store)
/// and `datetime('now')` output (written by triggers and defaults).
pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value.map(|v| parse_timestamp(&v))
}

fn parse_stored<T>(value: String) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    value.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
    })
}

fn row_to_story(row: &Row) -> rusqlite::Result<Story> {
    let status: String = row.get("status")?;
    let priority: String = row.get("priority")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Story {
        id: row.get("id")?,
        epic: row.get("epic_num")?,
        story_num: row.get("story_num")?,
        title: row.get("title")?,
        status: parse_stored(status)?,
        owner: row.get("owner")?,
        points: row.get("points")?,
        priority: parse_stored(priority)?,
        sprint: None,
        content_hash: row.get("content_hash")?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

/// Fill in the sprint assignment for a freshly mapped story.
fn attach_sprint(conn: &Connection, mut story: Story) -> Result<Story> {
    story.sprint = conn
        .query_row(
            "SELECT sprint_num FROM story_assignments WHERE epic_num = ?1 AND story_num = ?2",
            params![story.epic, story.story_num],
            |r| r.get(0),
        )
        .optional()?;
    Ok(story)
}

fn row_to_epic(row: &Row) -> rusqlite::Result<Epic> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Epic {
        id: row.get("id")?,
        epic_num: row.get("epic_num")?,
        title: row.get("name")?,
        feature: row.get::<_, Option<String>>("feature")?.unwrap_or_default(),
        status: parse_stored(status)?,
        total_points: row.get("total_points")?,
        completed_points: row.get("completed_points")?,
        file_path: row.get("file_path")?,
        content_hash: row.get("content_hash")?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn row_to_sprint(row: &Row) -> rusqlite::Result<Sprint> {
    let status: String = row.get("status")?;
    let start_date: String = row.get("start_date")?;
    let end_date: String = row.get("end_date")?;
    let created_at: String = row.get("created_at")?;

    let parse_date = |value: &str| {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
    };

    Ok(Sprint {
        id: row.get("id")?,
        sprint_num: row.get("sprint_num")?,
        name: row.get("name")?,
        start_date: parse_date(&start_date)?,
        end_date: parse_date(&end_date)?,
        status: parse_stored(status)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn row_to_workflow(row: &Row) -> rusqlite::Result<WorkflowExecution> {
    let status: String = row.get("status")?;
    let started_at: String = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;

    Ok(WorkflowExecution {
        id: row.get("id")?,
        workflow_id: row.get::<_, Option<String>>("executor")?.unwrap_or_default(),
        epic: row.get("epic_num")?,
        story_num: row.get("story_num")?,
        workflow_name: row.get("workflow_name")?,
        status: parse_stored(status)?,
        started_at: parse_timestamp(&started_at),
        completed_at: parse_opt_timestamp(completed_at),
        duration_ms: row.get("duration_ms")?,
        result: row.get("output")?,
        error_message: row.get("error_message")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::db::schema;
    use tempfile::TempDir;

    fn tracker(dir: &TempDir) -> StateTracker {
        let config = StoreConfig::rooted_at(dir.path());
        schema::initialize(&config).unwrap();
        StateTracker::new(&config.db_path).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_missing_database_is_a_connection_error() {
        let dir = TempDir::new().unwrap();
        let result = StateTracker::new(dir.path().join("missing.db"));
        assert!(matches!(result, Err(Error::Connection(_))));
    }

    #[test]
    fn test_story_crud() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        tracker.create_epic(1, "Epic 1", "feature-one", 0).unwrap();

        let story = tracker.create_story(NewStory::new(1, 1, "First story")).unwrap();
        assert_eq!(story.status, StoryStatus::Pending);
        assert_eq!(story.priority, Priority::P1);
        assert_eq!(story.full_id(), "1.1");

        let story = tracker
            .update_story_status(1, 1, StoryStatus::InProgress)
            .unwrap();
        assert_eq!(story.status, StoryStatus::InProgress);

        let story = tracker.update_story_owner(1, 1, "amelia").unwrap();
        assert_eq!(story.owner.as_deref(), Some("amelia"));

        let story = tracker.update_story_points(1, 1, 5).unwrap();
        assert_eq!(story.points, 5);

        let story = tracker.update_story_hash(1, 1, "abc123").unwrap();
        assert_eq!(story.content_hash.as_deref(), Some("abc123"));

        assert!(matches!(
            tracker.get_story(9, 9),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            tracker.update_story_status(9, 9, StoryStatus::Done),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_create_story_requires_epic() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let result = tracker.create_story(NewStory::new(42, 1, "Orphan"));
        assert!(matches!(result, Err(Error::Database(_))));
    }

    #[test]
    fn test_duplicate_story_rejected() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        tracker.create_epic(1, "Epic 1", "f", 0).unwrap();
        tracker.create_story(NewStory::new(1, 1, "One")).unwrap();
        assert!(tracker.create_story(NewStory::new(1, 1, "Two")).is_err());
    }

    #[test]
    fn test_done_story_moves_epic_points() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        tracker.create_epic(15, "State Tracking", "dls", 0).unwrap();

        let mut new = NewStory::new(15, 1, "Schema");
        new.status = StoryStatus::Done;
        new.points = 3;
        tracker.create_story(new).unwrap();

        let epic = tracker.get_epic(15).unwrap();
        assert_eq!(epic.completed_points, 3);

        // Transition out of done shrinks the counter again
        tracker
            .update_story_status(15, 1, StoryStatus::InProgress)
            .unwrap();
        assert_eq!(tracker.get_epic(15).unwrap().completed_points, 0);
    }

    #[test]
    fn test_same_status_update_still_audits() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        tracker.create_epic(1, "Epic 1", "f", 0).unwrap();
        tracker.create_story(NewStory::new(1, 1, "Story")).unwrap();

        tracker
            .update_story_status(1, 1, StoryStatus::Pending)
            .unwrap();

        let count: i64 = tracker
            .with_connection(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM state_changes \
                     WHERE table_name = 'stories' AND old_value = 'pending' AND new_value = 'pending'",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_sprint_lifecycle_and_metrics() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        tracker.create_epic(1, "Epic 1", "f", 0).unwrap();

        assert!(matches!(
            tracker.create_sprint(1, date("2025-01-15"), date("2025-01-01")),
            Err(Error::Validation(_))
        ));

        let sprint = tracker
            .create_sprint(1, date("2025-01-01"), date("2025-01-15"))
            .unwrap();
        assert_eq!(sprint.name, "Sprint 1");
        assert_eq!(sprint.status, SprintStatus::Active);

        let mut done = NewStory::new(1, 1, "Done story");
        done.status = StoryStatus::Done;
        done.points = 3;
        tracker.create_story(done).unwrap();
        let mut pending = NewStory::new(1, 2, "Pending story");
        pending.points = 5;
        tracker.create_story(pending).unwrap();

        tracker.assign_story_to_sprint(1, 1, 1).unwrap();
        let story = tracker.assign_story_to_sprint(1, 2, 1).unwrap();
        assert_eq!(story.sprint, Some(1));

        assert_eq!(tracker.get_sprint_velocity(1).unwrap(), 3);
        assert!((tracker.get_sprint_completion_rate(1).unwrap() - 0.5).abs() < f64::EPSILON);

        let burndown = tracker.get_sprint_burndown(1).unwrap();
        assert_eq!(burndown.total_points, 8);
        assert_eq!(burndown.completed_points, 3);
        assert_eq!(burndown.remaining_points, 5);

        let current = tracker.get_current_sprint().unwrap().unwrap();
        assert_eq!(current.sprint_num, 1);

        let story = tracker.unassign_story_from_sprint(1, 2).unwrap();
        assert_eq!(story.sprint, None);
        assert_eq!(tracker.get_stories_by_sprint(1).unwrap().len(), 1);
    }

    #[test]
    fn test_reassignment_replaces_existing_row() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        tracker.create_epic(1, "Epic 1", "f", 0).unwrap();
        tracker.create_story(NewStory::new(1, 1, "Story")).unwrap();
        tracker
            .create_sprint(1, date("2025-01-01"), date("2025-01-15"))
            .unwrap();
        tracker
            .create_sprint(2, date("2025-02-01"), date("2025-02-15"))
            .unwrap();

        tracker.assign_story_to_sprint(1, 1, 1).unwrap();
        let story = tracker.assign_story_to_sprint(1, 1, 2).unwrap();
        assert_eq!(story.sprint, Some(2));

        let count: i64 = tracker
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM story_assignments", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_epic_queries() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        tracker.create_epic(1, "Epic 1", "auth", 10).unwrap();
        tracker.create_epic(2, "Epic 2", "auth", 0).unwrap();
        tracker.create_epic(3, "Epic 3", "billing", 0).unwrap();
        tracker.update_epic_status(3, EpicStatus::Completed).unwrap();

        assert_eq!(tracker.get_active_epics().unwrap().len(), 2);
        assert_eq!(tracker.get_epics_by_feature("auth").unwrap().len(), 2);

        let mut done = NewStory::new(1, 1, "Done");
        done.status = StoryStatus::Done;
        tracker.create_story(done).unwrap();
        tracker.create_story(NewStory::new(1, 2, "Pending")).unwrap();
        assert!((tracker.get_epic_velocity(1).unwrap() - 0.5).abs() < f64::EPSILON);
        assert_eq!(tracker.get_epic_velocity(2).unwrap(), 0.0);

        let epic = tracker.update_epic_points(1, 10, 4).unwrap();
        assert_eq!(epic.completed_points, 4);
        assert!((epic.progress() - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_workflow_tracking() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);

        let execution = tracker
            .track_workflow_execution("wf-001", 1, 2, "create-prd")
            .unwrap();
        assert_eq!(execution.status, WorkflowStatus::Running);
        assert_eq!(execution.workflow_id, "wf-001");

        let running = tracker.get_running_workflows().unwrap();
        assert_eq!(running.len(), 1);

        let payload = serde_json::json!({"artifacts": ["docs/PRD.md"]});
        let execution = tracker
            .update_workflow_status("wf-001", WorkflowStatus::Completed, Some(&payload))
            .unwrap();
        assert_eq!(execution.status, WorkflowStatus::Completed);
        assert!(execution.completed_at.is_some());
        assert!(execution.duration_ms.is_some());
        assert!(execution.result.unwrap().contains("PRD.md"));

        assert!(tracker.get_running_workflows().unwrap().is_empty());

        tracker
            .track_workflow_execution("wf-002", 1, 2, "create-prd")
            .unwrap();
        tracker
            .update_workflow_status("wf-002", WorkflowStatus::Failed, None)
            .unwrap();

        let history = tracker.get_story_workflow_history(1, 2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(tracker.get_failed_workflows().unwrap().len(), 1);

        let metrics = tracker.get_workflow_metrics("create-prd").unwrap();
        assert_eq!(metrics.total_executions, 2);
        assert_eq!(metrics.successful, 1);
        assert_eq!(metrics.failed, 1);
        assert!((metrics.success_rate - 0.5).abs() < f64::EPSILON);

        assert!(matches!(
            tracker.update_workflow_status("missing", WorkflowStatus::Completed, None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_status_query_uses_index() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        tracker.create_epic(1, "Epic 1", "f", 0).unwrap();
        tracker.create_story(NewStory::new(1, 1, "Story")).unwrap();

        let plan: String = tracker
            .with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "EXPLAIN QUERY PLAN SELECT * FROM stories WHERE status = 'pending'",
                )?;
                let rows = stmt
                    .query_map([], |r| r.get::<_, String>(3))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows.join("\n"))
            })
            .unwrap();
        assert!(
            plan.contains("idx_stories_status"),
            "status lookup should use idx_stories_status, got plan: {}",
            plan
        );
    }

    #[test]
    fn test_trigger_latency() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        tracker.create_epic(1, "Epic 1", "f", 0).unwrap();
        let mut new = NewStory::new(1, 1, "Story");
        new.points = 3;
        tracker.create_story(new).unwrap();

        // Time the bare UPDATE inside an open transaction, so connection
        // setup and commit fsync stay out of the measurement.
        let mut conn = Connection::open(tracker.db_path()).unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON").unwrap();
        let tx = conn.transaction().unwrap();

        let start = std::time::Instant::now();
        tx.execute(
            "UPDATE stories SET status = 'done' WHERE epic_num = 1 AND story_num = 1",
            [],
        )
        .unwrap();
        let elapsed = start.elapsed();
        assert!(
            elapsed.as_millis() < 5,
            "status update with triggers took {:?}",
            elapsed
        );

        tx.commit().unwrap();

        // All three triggers fired during the timed statement
        let epic = tracker.get_epic(1).unwrap();
        assert_eq!(epic.completed_points, 3);
        let audit: i64 = tracker
            .with_connection(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM state_changes WHERE new_value = 'done'",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(audit, 1);
    }
}
