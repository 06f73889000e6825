//! Read-only query façade
//!
//! [`QueryBuilder`] layers ergonomic aggregates over the state store:
//! progress and velocity rollups, dense sprint/epic summaries, and a
//! single-call active-work view. It never writes.

use serde::Serialize;

use crate::db::store::StateTracker;
use crate::error::{Error, Result};
use crate::types::*;

/// Progress metrics for one epic
#[derive(Debug, Clone, Serialize)]
pub struct EpicProgress {
    pub epic_num: i64,
    /// Completed story points
    pub completed: i64,
    /// Total story points
    pub total: i64,
    /// Completion percentage in [0, 100]
    pub percentage: f64,
    pub stories_done: i64,
    pub stories_total: i64,
}

/// Dense summary of one sprint
#[derive(Debug, Clone, Serialize)]
pub struct SprintSummary {
    pub sprint_num: i64,
    pub sprint_name: String,
    /// Completed story points
    pub velocity: i64,
    pub total_points: i64,
    pub completed_points: i64,
    pub remaining_points: i64,
    pub completion_rate: f64,
    pub stories_done: i64,
    pub stories_total: i64,
    pub stories_in_progress: i64,
    pub stories_blocked: i64,
}

/// Dense summary of one epic
#[derive(Debug, Clone, Serialize)]
pub struct EpicSummary {
    pub epic_num: i64,
    pub title: String,
    pub feature: String,
    pub status: EpicStatus,
    pub progress: f64,
    pub total_points: i64,
    pub completed_points: i64,
    pub stories_total: i64,
    pub stories_done: i64,
    pub stories_in_progress: i64,
    pub stories_blocked: i64,
    pub stories_pending: i64,
    /// Story completion rate (done / total)
    pub velocity: f64,
}

/// Everything currently in flight, in a single call
#[derive(Debug, Clone, Serialize)]
pub struct ActiveWork {
    pub stories_in_progress: Vec<Story>,
    pub stories_blocked: Vec<Story>,
    pub active_epics: Vec<Epic>,
    pub current_sprint: Option<SprintSummary>,
}

/// Result of an ad-hoc read-only query
#[derive(Debug, Clone, Serialize)]
pub struct SelectResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Keywords that disqualify an ad-hoc query
const WRITE_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE", "DROP", "ALTER"];

/// Query builder for complex state queries.
///
/// All reads go through the store's per-operation connection discipline and
/// lean on the schema's indexes (status lookups use `idx_stories_status`).
pub struct QueryBuilder<'a> {
    tracker: &'a StateTracker,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(tracker: &'a StateTracker) -> Self {
        Self { tracker }
    }

    /// Get stories by status with an optional epic filter.
    ///
    /// Without an epic this delegates to the store's indexed status query;
    /// with one it filters the epic's slice in memory, which is small by
    /// construction.
    pub fn stories_by_status(
        &self,
        status: StoryStatus,
        epic_num: Option<i64>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Story>> {
        match epic_num {
            Some(epic) => {
                let stories = self.tracker.get_stories_by_epic(epic)?;
                Ok(stories
                    .into_iter()
                    .filter(|s| s.status == status)
                    .skip(offset)
                    .take(limit)
                    .collect())
            }
            None => self
                .tracker
                .get_stories_by_status(status, limit as i64, offset as i64),
        }
    }

    /// Epic progress: points, percentage, and story counts.
    pub fn epic_progress(&self, epic_num: i64) -> Result<EpicProgress> {
        let epic = self.tracker.get_epic(epic_num)?;
        let stories = self.tracker.get_stories_by_epic(epic_num)?;
        let stories_done = stories
            .iter()
            .filter(|s| s.status == StoryStatus::Done)
            .count() as i64;

        Ok(EpicProgress {
            epic_num,
            completed: epic.completed_points,
            total: epic.total_points,
            percentage: epic.progress(),
            stories_done,
            stories_total: stories.len() as i64,
        })
    }

    /// Sprint velocity (completed story points).
    pub fn sprint_velocity(&self, sprint_num: i64) -> Result<i64> {
        self.tracker.get_sprint_velocity(sprint_num)
    }

    /// All blocked stories.
    pub fn blocked_stories(&self, limit: usize, offset: usize) -> Result<Vec<Story>> {
        self.tracker
            .get_stories_by_status(StoryStatus::Blocked, limit as i64, offset as i64)
    }

    /// Stories that are done and therefore candidates for review.
    pub fn stories_needing_review(&self, limit: usize, offset: usize) -> Result<Vec<Story>> {
        self.tracker
            .get_stories_by_status(StoryStatus::Done, limit as i64, offset as i64)
    }

    /// Comprehensive sprint summary.
    pub fn sprint_summary(&self, sprint_num: i64) -> Result<SprintSummary> {
        let sprint = self.tracker.get_sprint(sprint_num)?;
        let burndown = self.tracker.get_sprint_burndown(sprint_num)?;
        let stories = self.tracker.get_stories_by_sprint(sprint_num)?;

        let count = |status: StoryStatus| stories.iter().filter(|s| s.status == status).count() as i64;

        Ok(SprintSummary {
            sprint_num,
            sprint_name: sprint.name,
            velocity: burndown.completed_points,
            total_points: burndown.total_points,
            completed_points: burndown.completed_points,
            remaining_points: burndown.remaining_points,
            completion_rate: burndown.completion_rate,
            stories_done: count(StoryStatus::Done),
            stories_total: stories.len() as i64,
            stories_in_progress: count(StoryStatus::InProgress),
            stories_blocked: count(StoryStatus::Blocked),
        })
    }

    /// Comprehensive epic summary.
    pub fn epic_summary(&self, epic_num: i64) -> Result<EpicSummary> {
        let epic = self.tracker.get_epic(epic_num)?;
        let stories = self.tracker.get_stories_by_epic(epic_num)?;
        let velocity = self.tracker.get_epic_velocity(epic_num)?;

        let count = |status: StoryStatus| stories.iter().filter(|s| s.status == status).count() as i64;

        Ok(EpicSummary {
            epic_num,
            title: epic.title.clone(),
            feature: epic.feature.clone(),
            status: epic.status,
            progress: epic.progress(),
            total_points: epic.total_points,
            completed_points: epic.completed_points,
            stories_total: stories.len() as i64,
            stories_done: count(StoryStatus::Done),
            stories_in_progress: count(StoryStatus::InProgress),
            stories_blocked: count(StoryStatus::Blocked),
            stories_pending: count(StoryStatus::Pending),
            velocity,
        })
    }

    /// All active work across epics and sprints, for status reports.
    pub fn all_active_work(&self) -> Result<ActiveWork> {
        let stories_in_progress = self.tracker.get_stories_in_progress()?;
        let stories_blocked = self.tracker.get_blocked_stories()?;
        let active_epics = self.tracker.get_active_epics()?;
        let current_sprint = match self.tracker.get_current_sprint()? {
            Some(sprint) => Some(self.sprint_summary(sprint.sprint_num)?),
            None => None,
        };

        Ok(ActiveWork {
            stories_in_progress,
            stories_blocked,
            active_epics,
            current_sprint,
        })
    }

    /// Execute an ad-hoc read-only query.
    ///
    /// Only SELECT statements are accepted; any write keyword anywhere in
    /// the text is rejected before the statement reaches the database.
    /// Column names come from the prepared statement's metadata.
    pub fn run_select(&self, sql: &str) -> Result<SelectResult> {
        let trimmed = sql.trim();
        if !trimmed.to_uppercase().starts_with("SELECT") {
            return Err(Error::Validation(
                "Only SELECT queries are allowed".to_string(),
            ));
        }
        let upper = trimmed.to_uppercase();
        for keyword in WRITE_KEYWORDS {
            if upper.contains(keyword) {
                return Err(Error::Validation(format!(
                    "Only SELECT queries are allowed (found {})",
                    keyword
                )));
            }
        }

        self.tracker.with_connection(|conn| {
            let mut stmt = conn.prepare(trimmed)?;
            let columns: Vec<String> = stmt
                .column_names()
                .iter()
                .map(|c| c.to_string())
                .collect();
            let column_count = columns.len();

            let rows = stmt
                .query_map([], |row| {
                    let mut values = Vec::with_capacity(column_count);
                    for i in 0..column_count {
                        let value = match row.get_ref(i)? {
                            rusqlite::types::ValueRef::Null => serde_json::Value::Null,
                            rusqlite::types::ValueRef::Integer(v) => serde_json::Value::from(v),
                            rusqlite::types::ValueRef::Real(v) => serde_json::Value::from(v),
                            rusqlite::types::ValueRef::Text(v) => {
                                serde_json::Value::from(String::from_utf8_lossy(v).to_string())
                            }
                            rusqlite::types::ValueRef::Blob(v) => {
                                serde_json::Value::from(hex::encode(v))
                            }
                        };
                        values.push(value);
                    }
                    Ok(values)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(SelectResult { columns, rows })
        })
    }
}
