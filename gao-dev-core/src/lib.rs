//! # gao-dev-core
//!
//! Project state engine for gao-dev: records and evolves the lifecycle of
//! software-development work items (epics, stories, sprints, workflow
//! executions) and keeps human-readable markdown story files in lock-step
//! with a transactional, indexed SQLite store.
//!
//! This library provides:
//! - Versioned schema migrations and structural validation
//! - A thread-safe transactional state store with derived metrics
//! - Bidirectional markdown ⇄ database sync with conflict policies
//! - A one-shot importer for legacy YAML/markdown state
//! - The learning index and its periodic maintenance job
//! - Operation tracking for long-running external work
//!
//! ## Example
//!
//! ```rust,no_run
//! use gao_dev_core::{db, StateTracker, StoreConfig};
//!
//! let config = StoreConfig::resolve();
//! db::initialize(&config).expect("failed to initialize database");
//!
//! let tracker = StateTracker::new(&config.db_path).expect("failed to open store");
//! let epic = tracker.create_epic(15, "State Tracking", "dls", 0).unwrap();
//! assert_eq!(epic.completed_points, 0);
//! ```

// Re-export commonly used items at the crate root
pub use config::{Config, StoreConfig};
pub use db::{NewStory, SchemaValidator, StateTracker, ValidationReport};
pub use error::{Error, Result};
pub use importer::{ImportReport, StateImporter};
pub use learning::{LearningIndex, LearningMaintenanceJob, MaintenanceReport, NewLearning};
pub use ops::{OperationRecord, OperationTracker};
pub use query::QueryBuilder;
pub use sync::{ConflictPolicy, MarkdownSyncer, SyncOutcome, SyncReport};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod importer;
pub mod learning;
pub mod logging;
pub mod ops;
pub mod query;
pub mod sync;
pub mod types;
