//! Core domain types for gao-dev state tracking
//!
//! These types are plain value carriers produced by the state store. They
//! hold no database handles and are safe to pass across components.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Epic** | A named unit of work comprising multiple Stories under a feature slug |
//! | **Story** | The smallest work item, identified by `(epic, story_num)` |
//! | **Sprint** | A time-boxed window with start/end dates and assigned Stories |
//! | **WorkflowExecution** | Lifecycle record of one workflow run |
//! | **StateChange** | Append-only audit row recording one field transition |
//! | **Learning** | Indexed knowledge item subject to decay and supersession |

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Story
// ============================================

/// Status of a story
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Pending,
    InProgress,
    Done,
    Blocked,
    Cancelled,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Pending => "pending",
            StoryStatus::InProgress => "in_progress",
            StoryStatus::Done => "done",
            StoryStatus::Blocked => "blocked",
            StoryStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StoryStatus::Pending),
            "in_progress" => Ok(StoryStatus::InProgress),
            "done" => Ok(StoryStatus::Done),
            "blocked" => Ok(StoryStatus::Blocked),
            "cancelled" => Ok(StoryStatus::Cancelled),
            _ => Err(format!(
                "invalid story status '{}'. Must be one of: pending, in_progress, done, blocked, cancelled",
                s
            )),
        }
    }
}

/// Priority level for a story (P0 is highest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P0" => Ok(Priority::P0),
            "P1" => Ok(Priority::P1),
            "P2" => Ok(Priority::P2),
            "P3" => Ok(Priority::P3),
            _ => Err(format!(
                "invalid priority '{}'. Must be one of: P0, P1, P2, P3",
                s
            )),
        }
    }
}

/// An individual work item with status tracking, ownership, and sprint
/// assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    /// Database primary key
    pub id: i64,
    /// Epic number this story belongs to
    pub epic: i64,
    /// Story number within the epic
    pub story_num: i64,
    /// Story title
    pub title: String,
    /// Current status
    pub status: StoryStatus,
    /// Assigned owner/agent
    pub owner: Option<String>,
    /// Story points estimate
    pub points: i64,
    /// Priority level
    pub priority: Priority,
    /// Sprint number assignment (at most one sprint per story)
    pub sprint: Option<i64>,
    /// SHA-256 hex digest of the backing markdown file, if synced
    pub content_hash: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp (trigger-maintained)
    pub updated_at: DateTime<Utc>,
}

impl Story {
    /// Full story identifier in `epic.story` form (e.g. "12.3")
    pub fn full_id(&self) -> String {
        format!("{}.{}", self.epic, self.story_num)
    }
}

// ============================================
// Epic
// ============================================

/// Status of an epic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpicStatus {
    Planned,
    Active,
    Completed,
    Cancelled,
}

impl EpicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpicStatus::Planned => "planned",
            EpicStatus::Active => "active",
            EpicStatus::Completed => "completed",
            EpicStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for EpicStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EpicStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(EpicStatus::Planned),
            "active" => Ok(EpicStatus::Active),
            "completed" => Ok(EpicStatus::Completed),
            "cancelled" => Ok(EpicStatus::Cancelled),
            _ => Err(format!(
                "invalid epic status '{}'. Must be one of: planned, active, completed, cancelled",
                s
            )),
        }
    }
}

/// A collection of related stories with point tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epic {
    /// Database primary key
    pub id: i64,
    /// Epic number (globally unique)
    pub epic_num: i64,
    /// Epic title
    pub title: String,
    /// Feature slug this epic belongs to (kebab-case)
    pub feature: String,
    /// Epic status
    pub status: EpicStatus,
    /// Total story points in the epic
    pub total_points: i64,
    /// Completed story points (trigger-maintained)
    pub completed_points: i64,
    /// Path of the backing markdown file, if any
    pub file_path: Option<String>,
    /// SHA-256 hex digest of the backing file, if synced
    pub content_hash: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp (trigger-maintained)
    pub updated_at: DateTime<Utc>,
}

impl Epic {
    /// Completion percentage in [0, 100]; 0 when no points are planned.
    pub fn progress(&self) -> f64 {
        if self.total_points > 0 {
            (self.completed_points as f64 / self.total_points as f64) * 100.0
        } else {
            0.0
        }
    }
}

// ============================================
// Sprint
// ============================================

/// Status of a sprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SprintStatus {
    Planned,
    Active,
    Completed,
    Cancelled,
}

impl SprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SprintStatus::Planned => "planned",
            SprintStatus::Active => "active",
            SprintStatus::Completed => "completed",
            SprintStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SprintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SprintStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(SprintStatus::Planned),
            "active" => Ok(SprintStatus::Active),
            "completed" => Ok(SprintStatus::Completed),
            "cancelled" => Ok(SprintStatus::Cancelled),
            _ => Err(format!(
                "invalid sprint status '{}'. Must be one of: planned, active, completed, cancelled",
                s
            )),
        }
    }
}

/// A time-boxed iteration. `end_date` is always strictly after `start_date`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprint {
    /// Database primary key
    pub id: i64,
    /// Sprint number (unique)
    pub sprint_num: i64,
    /// Sprint name
    pub name: String,
    /// Sprint start date
    pub start_date: NaiveDate,
    /// Sprint end date
    pub end_date: NaiveDate,
    /// Sprint status
    pub status: SprintStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

// ============================================
// Workflow executions
// ============================================

/// Status of a workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Started,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Started => "started",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }

    /// Whether this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(WorkflowStatus::Started),
            "running" => Ok(WorkflowStatus::Running),
            "completed" => Ok(WorkflowStatus::Completed),
            "failed" => Ok(WorkflowStatus::Failed),
            "cancelled" => Ok(WorkflowStatus::Cancelled),
            _ => Err(format!(
                "invalid workflow status '{}'. Must be one of: started, running, completed, failed, cancelled",
                s
            )),
        }
    }
}

/// Lifecycle record of one workflow run.
///
/// `workflow_id` is an opaque correlation key supplied by the caller; the
/// store never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Database primary key
    pub id: i64,
    /// External correlation key (unique per execution)
    pub workflow_id: String,
    /// Epic number (0 if not epic-specific)
    pub epic: i64,
    /// Story number (0 if not story-specific)
    pub story_num: i64,
    /// Name of the executed workflow
    pub workflow_name: String,
    /// Execution status
    pub status: WorkflowStatus,
    /// Start timestamp
    pub started_at: DateTime<Utc>,
    /// Completion timestamp
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: Option<i64>,
    /// Execution result/output payload
    pub result: Option<String>,
    /// Error message for failed executions
    pub error_message: Option<String>,
}

// ============================================
// State changes (audit trail)
// ============================================

/// Append-only audit row recording one field transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    /// Database primary key
    pub id: i64,
    /// Table the change happened in
    pub table_name: String,
    /// Primary key of the changed row
    pub record_id: i64,
    /// Name of the changed field
    pub field_name: String,
    /// Value before the change
    pub old_value: Option<String>,
    /// Value after the change
    pub new_value: Option<String>,
    /// Who made the change, if known
    pub changed_by: Option<String>,
    /// When the change was recorded
    pub changed_at: DateTime<Utc>,
    /// Free-form reason
    pub reason: Option<String>,
}

// ============================================
// Learnings
// ============================================

/// Status of a learning in the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningStatus {
    Active,
    Inactive,
    Superseded,
}

impl LearningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningStatus::Active => "active",
            LearningStatus::Inactive => "inactive",
            LearningStatus::Superseded => "superseded",
        }
    }
}

impl std::fmt::Display for LearningStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LearningStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LearningStatus::Active),
            "inactive" => Ok(LearningStatus::Inactive),
            "superseded" => Ok(LearningStatus::Superseded),
            _ => Err(format!(
                "invalid learning status '{}'. Must be one of: active, inactive, superseded",
                s
            )),
        }
    }
}

/// An indexed knowledge item.
///
/// `decay_factor` is a multiplicative weight in [0.5, 1.0] expressing how
/// much to trust an aging learning; a superseded learning always carries a
/// non-null `superseded_by`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learning {
    /// Database primary key
    pub id: i64,
    /// Short topic label
    pub topic: String,
    /// Category used for supersession grouping
    pub category: String,
    /// Learning text
    pub content: String,
    /// Confidence score in [0, 1]
    pub confidence_score: f64,
    /// Observed success rate in [0, 1]
    pub success_rate: f64,
    /// Number of recorded applications
    pub application_count: i64,
    /// Age-based trust weight in [0.5, 1.0]
    pub decay_factor: f64,
    /// Lifecycle status
    pub status: LearningStatus,
    /// Id of the learning that superseded this one, if any
    pub superseded_by: Option<i64>,
    /// When the learning was indexed
    pub indexed_at: DateTime<Utc>,
    /// Free-form metadata
    pub metadata: serde_json::Value,
}

/// One observed use of a learning; pruned after a year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningApplication {
    /// Database primary key
    pub id: i64,
    /// Learning this application belongs to
    pub learning_id: i64,
    /// When the learning was applied
    pub applied_at: DateTime<Utc>,
    /// Outcome of the application, if recorded
    pub outcome: Option<String>,
}
