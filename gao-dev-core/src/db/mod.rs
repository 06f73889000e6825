//! Database layer for gao-dev
//!
//! This module owns the physical SQLite store:
//! - Versioned schema migrations (including legacy database unification)
//! - Transactional CRUD through [`StateTracker`]
//! - Structural validation against the expected schema

pub mod schema;
pub mod store;
pub mod validator;

pub use schema::{initialize, run_migrations, Migration, MIGRATIONS, SCHEMA_VERSION};
pub use store::{NewStory, SprintBurndown, StateTracker, WorkflowMetrics};
pub use validator::{SchemaValidator, ValidationReport};
