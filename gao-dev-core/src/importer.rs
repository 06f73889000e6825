//! One-shot importer for legacy file-based state
//!
//! Migrates a legacy `sprint-status.yaml` plus directories of `story-*.md`
//! files into the database, with backup/rollback, duplicate tolerance, and
//! post-import validation. Intended to run once per project; every step is
//! idempotent enough to survive a retry.

use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::db::store::{NewStory, StateTracker};
use crate::error::{Error, Result};
use crate::sync::{MarkdownSyncer, SyncOutcome};
use crate::types::EpicStatus;

/// Report of an import operation
#[derive(Debug, Default)]
pub struct ImportReport {
    pub epics_created: usize,
    pub stories_created: usize,
    pub sprints_created: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub validation_errors: Vec<String>,
    pub duration_seconds: f64,
}

impl ImportReport {
    fn merge(&mut self, other: ImportReport) {
        self.epics_created += other.epics_created;
        self.stories_created += other.stories_created;
        self.sprints_created += other.sprints_created;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.validation_errors.extend(other.validation_errors);
    }
}

impl std::fmt::Display for ImportReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Import Report:\n  Epics created: {}\n  Stories created: {}\n  Sprints created: {}\n  Skipped: {}\n  Errors: {}\n  Warnings: {}\n  Validation errors: {}\n  Duration: {:.2}s",
            self.epics_created,
            self.stories_created,
            self.sprints_created,
            self.skipped,
            self.errors.len(),
            self.warnings.len(),
            self.validation_errors.len(),
            self.duration_seconds
        )
    }
}

/// Legacy sprint-status file shape. Top-level keys beyond these
/// (`sprint_name`, `phase`, `scale_level`) are accepted and ignored.
#[derive(Debug, Deserialize)]
struct SprintStatusFile {
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    epics: Vec<EpicEntry>,
}

#[derive(Debug, Deserialize)]
struct EpicEntry {
    #[serde(default)]
    epic_number: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    stories: Vec<StoryEntry>,
}

#[derive(Debug, Deserialize)]
struct StoryEntry {
    #[serde(default)]
    number: Option<i64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    owner: Option<String>,
}

/// Imports existing state data into the database.
///
/// Duplicates never fail a whole import; they become warnings and the
/// batch continues. With `dry_run` set, the full pipeline runs with all
/// database writes suppressed, so the report previews what an import
/// would do.
pub struct StateImporter {
    tracker: StateTracker,
    syncer: MarkdownSyncer,
    dry_run: bool,
    backup_path: Option<PathBuf>,
}

impl StateImporter {
    pub fn new(tracker: StateTracker, config: &crate::config::StoreConfig, dry_run: bool) -> Self {
        let syncer = MarkdownSyncer::new(tracker.clone(), config);
        Self {
            tracker,
            syncer,
            dry_run,
            backup_path: None,
        }
    }

    /// Import a legacy sprint-status YAML file: one sprint (next free
    /// number, two-week window) plus its epics and their stories.
    pub fn import_sprint_status(&self, sprint_status_path: &Path) -> ImportReport {
        let mut report = ImportReport::default();
        let start = Instant::now();

        if !sprint_status_path.exists() {
            report
                .errors
                .push(format!("File not found: {}", sprint_status_path.display()));
            report.duration_seconds = start.elapsed().as_secs_f64();
            return report;
        }

        match self.parse_sprint_status(sprint_status_path) {
            Ok(data) => {
                self.import_sprint(&data, &mut report);
                for epic_data in &data.epics {
                    if self.import_epic(epic_data, &mut report) {
                        report.epics_created += 1;
                    }
                }
            }
            Err(e) => report.errors.push(e.to_string()),
        }

        report.duration_seconds = start.elapsed().as_secs_f64();
        report
    }

    fn parse_sprint_status(&self, path: &Path) -> Result<SprintStatusFile> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Err(Error::Validation("Empty or invalid YAML file".to_string()));
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    fn import_sprint(&self, data: &SprintStatusFile, report: &mut ImportReport) {
        let start_date = data
            .start_date
            .clone()
            .unwrap_or_else(|| Utc::now().date_naive().format("%Y-%m-%d").to_string());
        let start_date = match NaiveDate::parse_from_str(&start_date, "%Y-%m-%d") {
            Ok(d) => d,
            Err(e) => {
                report
                    .errors
                    .push(format!("Invalid start_date '{}': {}", start_date, e));
                return;
            }
        };
        let end_date = start_date + Duration::days(14);

        if self.dry_run {
            report.sprints_created += 1;
            return;
        }

        match self
            .next_sprint_number()
            .and_then(|num| self.tracker.create_sprint(num, start_date, end_date))
        {
            Ok(_) => report.sprints_created += 1,
            Err(e) => report
                .warnings
                .push(format!("Sprint already exists or error: {}", e)),
        }
    }

    /// Import markdown story files from a directory tree.
    ///
    /// Files matching `story-*.md` are routed through the markdown syncer.
    /// In dry-run mode the files are only read and classified against the
    /// current store.
    pub fn import_story_files(&self, stories_dir: &Path, recursive: bool) -> ImportReport {
        let mut report = ImportReport::default();
        let start = Instant::now();

        let pattern = if recursive {
            stories_dir.join("**").join("story-*.md")
        } else {
            stories_dir.join("story-*.md")
        };
        let pattern = pattern.to_string_lossy().to_string();

        let paths = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                report
                    .errors
                    .push(format!("Failed to import story files: {}", e));
                report.duration_seconds = start.elapsed().as_secs_f64();
                return report;
            }
        };

        for entry in paths.flatten() {
            if !entry.is_file() {
                continue;
            }
            if self.dry_run {
                self.preview_story_file(&entry, &mut report);
                continue;
            }
            match self.syncer.sync_from_markdown(&entry) {
                Ok(SyncOutcome::Created { .. }) => report.stories_created += 1,
                Ok(SyncOutcome::Skipped { .. }) => report.skipped += 1,
                Ok(_) => {}
                Err(e) => {
                    let name = entry
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| entry.display().to_string());
                    report.errors.push(format!("{}: {}", name, e));
                }
            }
        }

        report.duration_seconds = start.elapsed().as_secs_f64();
        report
    }

    /// Classify one story file without writing: would it be created or
    /// skipped?
    fn preview_story_file(&self, path: &Path, report: &mut ImportReport) {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                report.errors.push(format!("{}: {}", path.display(), e));
                return;
            }
        };
        let (header, _) = crate::sync::frontmatter::parse(&content);
        let epic = header
            .get(&serde_yaml::Value::String("epic".into()))
            .and_then(|v| v.as_i64());
        let story = header
            .get(&serde_yaml::Value::String("story_num".into()))
            .and_then(|v| v.as_i64());
        match (epic, story) {
            (Some(e), Some(s)) => match self.tracker.get_story(e, s) {
                Ok(_) => report.skipped += 1,
                Err(_) => report.stories_created += 1,
            },
            _ => report.errors.push(format!(
                "{}: Missing epic or story_num in frontmatter",
                path.display()
            )),
        }
    }

    /// Full migration: optional backup, YAML import, markdown import,
    /// validation, and rollback from backup on unrecoverable failure.
    pub fn import_all(
        &mut self,
        sprint_status_path: &Path,
        stories_dirs: &[PathBuf],
        create_backup: bool,
    ) -> ImportReport {
        let mut report = ImportReport::default();
        let start = Instant::now();

        let run = (|| -> Result<ImportReport> {
            let mut report = ImportReport::default();

            if create_backup && !self.dry_run {
                self.backup_path = Some(self.create_backup()?);
            }

            report.merge(self.import_sprint_status(sprint_status_path));

            for stories_dir in stories_dirs {
                if stories_dir.exists() {
                    report.merge(self.import_story_files(stories_dir, true));
                } else {
                    report
                        .warnings
                        .push(format!("Directory not found: {}", stories_dir.display()));
                }
            }

            report.validation_errors.extend(self.validate_import()?);
            Ok(report)
        })();

        match run {
            Ok(inner) => report.merge(inner),
            Err(e) => {
                report.errors.push(format!("Import failed: {}", e));
                if let Some(backup) = &self.backup_path {
                    if backup.exists() {
                        if let Err(rollback_err) = self.rollback() {
                            report
                                .errors
                                .push(format!("Rollback failed: {}", rollback_err));
                        } else {
                            report
                                .warnings
                                .push("Rolled back to backup due to errors".to_string());
                        }
                    }
                }
            }
        }

        report.duration_seconds = start.elapsed().as_secs_f64();
        report
    }

    fn import_epic(&self, epic_data: &EpicEntry, report: &mut ImportReport) -> bool {
        let epic_num = match epic_data.epic_number {
            Some(n) => n,
            None => {
                report
                    .errors
                    .push("Failed to import epic: missing epic_number".to_string());
                return false;
            }
        };
        let name = epic_data
            .name
            .clone()
            .unwrap_or_else(|| format!("Epic {}", epic_num));
        let status = epic_data.status.as_deref().unwrap_or("active");
        let feature = kebab_slug(&name);

        let total_points: i64 = epic_data
            .stories
            .iter()
            .map(|s| parse_story_points(s.name.as_deref().unwrap_or("")))
            .sum();

        if !self.dry_run {
            // completed_points accumulates through the story status
            // triggers as the stories land below.
            let created = (|| -> Result<()> {
                self.tracker
                    .create_epic(epic_num, &name, &feature, total_points)?;
                let status: EpicStatus = status.parse().map_err(Error::Validation)?;
                self.tracker.update_epic_status(epic_num, status)?;
                Ok(())
            })();
            if let Err(e) = created {
                report
                    .warnings
                    .push(format!("Epic {} already exists or error: {}", epic_num, e));
                return false;
            }
        }

        for story_data in &epic_data.stories {
            self.import_story_from_yaml(epic_num, story_data, report);
        }

        true
    }

    fn import_story_from_yaml(
        &self,
        epic_num: i64,
        story_data: &StoryEntry,
        report: &mut ImportReport,
    ) {
        let story_num = match story_data.number {
            Some(n) => n,
            None => {
                report.errors.push(format!(
                    "Failed to import story in epic {}: missing number",
                    epic_num
                ));
                return;
            }
        };
        let name = story_data
            .name
            .clone()
            .unwrap_or_else(|| format!("Story {}.{}", epic_num, story_num));
        let points = parse_story_points(&name);

        if self.dry_run {
            report.stories_created += 1;
            return;
        }

        let created = (|| -> Result<()> {
            let mut new = NewStory::new(epic_num, story_num, name);
            if let Some(status) = &story_data.status {
                new.status = status.parse().map_err(Error::Validation)?;
            }
            new.owner = story_data.owner.clone();
            new.points = points;
            self.tracker.create_story(new)?;
            Ok(())
        })();

        match created {
            Ok(()) => report.stories_created += 1,
            Err(e) => report.warnings.push(format!(
                "Story {}.{} already exists or error: {}",
                epic_num, story_num, e
            )),
        }
    }

    fn next_sprint_number(&self) -> Result<i64> {
        self.tracker.with_connection(|conn| {
            let max: Option<i64> =
                conn.query_row("SELECT MAX(sprint_num) FROM sprints", [], |r| r.get(0))?;
            Ok(max.unwrap_or(0) + 1)
        })
    }

    /// Copy the database file to a timestamped sibling before importing.
    fn create_backup(&self) -> Result<PathBuf> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let backup_path = self
            .tracker
            .db_path()
            .with_extension(format!("backup_{}.db", timestamp));
        std::fs::copy(self.tracker.db_path(), &backup_path)?;
        tracing::info!(backup = %backup_path.display(), "Database backup created");
        Ok(backup_path)
    }

    /// Restore the backup over the database file.
    fn rollback(&self) -> Result<()> {
        if let Some(backup) = &self.backup_path {
            if backup.exists() {
                std::fs::copy(backup, self.tracker.db_path())?;
                tracing::warn!(backup = %backup.display(), "Database rolled back from backup");
            }
        }
        Ok(())
    }

    /// Remove the backup file after a successful import.
    pub fn cleanup_backup(&mut self) -> Result<()> {
        if let Some(backup) = self.backup_path.take() {
            if backup.exists() {
                std::fs::remove_file(&backup)?;
            }
        }
        Ok(())
    }

    /// Post-import consistency checks: every story references an existing
    /// epic, and every status value is inside its enumeration.
    fn validate_import(&self) -> Result<Vec<String>> {
        self.tracker.with_connection(|conn| {
            let mut errors = Vec::new();

            let mut stmt = conn.prepare(
                "SELECT s.epic_num, s.story_num
                 FROM stories s
                 LEFT JOIN epics e ON s.epic_num = e.epic_num
                 WHERE e.epic_num IS NULL",
            )?;
            let orphans = stmt
                .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for (epic, story) in orphans {
                errors.push(format!(
                    "Story {}.{} references non-existent epic",
                    epic, story
                ));
            }

            let mut stmt = conn.prepare(
                "SELECT epic_num, story_num, status FROM stories
                 WHERE status NOT IN ('pending', 'in_progress', 'done', 'blocked', 'cancelled')",
            )?;
            let bad_stories = stmt
                .query_map([], |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, i64>(1)?,
                        r.get::<_, String>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for (epic, story, status) in bad_stories {
                errors.push(format!(
                    "Story {}.{} has invalid status: {}",
                    epic, story, status
                ));
            }

            let mut stmt = conn.prepare(
                "SELECT epic_num, status FROM epics
                 WHERE status NOT IN ('planned', 'active', 'completed', 'cancelled')",
            )?;
            let bad_epics = stmt
                .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for (epic, status) in bad_epics {
                errors.push(format!("Epic {} has invalid status: {}", epic, status));
            }

            Ok(errors)
        })
    }
}

/// Kebab-case slug of an epic name: lowercase, alphanumerics and hyphens
/// only, whitespace runs collapsed to single hyphens.
fn kebab_slug(name: &str) -> String {
    let lower = name.to_lowercase();
    let filtered: String = lower
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ' || *c == '-')
        .collect();
    filtered.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Parse story points encoded in a story name as `(N points)` or `Npt`.
/// Returns 0 when neither pattern is present.
fn parse_story_points(name: &str) -> i64 {
    let lower = name.to_lowercase();

    for (open, _) in lower.match_indices('(') {
        let rest = &lower[open + 1..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            continue;
        }
        let after = rest[digits.len()..].trim_start();
        let after = match after.strip_prefix("point") {
            Some(a) => a,
            None => continue,
        };
        let after = after.strip_prefix('s').unwrap_or(after);
        if after.starts_with(')') {
            if let Ok(points) = digits.parse() {
                return points;
            }
        }
    }

    for (at, _) in lower.match_indices("pt") {
        let digits: String = lower[..at]
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if !digits.is_empty() {
            let digits: String = digits.chars().rev().collect();
            if let Ok(points) = digits.parse() {
                return points;
            }
        }
    }

    0
}
