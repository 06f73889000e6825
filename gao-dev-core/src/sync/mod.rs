//! Markdown ⇄ database bidirectional sync
//!
//! Story files carry a YAML frontmatter header; the database carries the
//! queryable state. Neither side exclusively owns story content — change
//! detection runs on SHA-256 content hashes and a configurable conflict
//! policy decides which side wins when both have moved.

pub mod frontmatter;

use chrono::Utc;
use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::StoreConfig;
use crate::db::store::{NewStory, StateTracker};
use crate::error::{Error, Result};
use crate::types::{Story, StoryStatus};

/// Tie-breaking rule when a markdown file and the store both changed since
/// the last sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Keep database values; only the stored hash is refreshed
    #[default]
    DatabaseWins,
    /// Apply each differing field from the markdown header
    MarkdownWins,
    /// Do not resolve; report the conflict set and leave both sides as-is
    Manual,
}

/// Why a file was skipped during sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Stored hash matches the file's current content
    NoChanges,
}

/// One field differing between the database and a markdown header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldConflict {
    pub field: String,
    pub db_value: String,
    pub md_value: String,
}

/// Outcome of syncing a single markdown file into the store
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// A new story was created from the file
    Created { epic_num: i64, story_num: i64 },
    /// An existing story was updated (hash always; fields per policy)
    Updated { epic_num: i64, story_num: i64 },
    /// Nothing to do
    Skipped {
        epic_num: i64,
        story_num: i64,
        reason: SkipReason,
    },
    /// Manual policy: conflicts detected, nothing written
    Conflict {
        epic_num: i64,
        story_num: i64,
        conflicts: Vec<FieldConflict>,
    },
}

/// Report of a batch sync operation
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Total number of files processed
    pub files_processed: usize,
    /// Number of new stories created
    pub stories_created: usize,
    /// Number of existing stories updated
    pub stories_updated: usize,
    /// Number of files skipped (no changes detected)
    pub files_skipped: usize,
    /// Number of files left unresolved under the manual policy
    pub conflicts: usize,
    /// Errors encountered (file path → error message)
    pub errors: Vec<(PathBuf, String)>,
}

/// Bidirectional syncer between markdown story files and the state store.
pub struct MarkdownSyncer {
    tracker: StateTracker,
    policy: ConflictPolicy,
    conflict_log_path: PathBuf,
}

impl MarkdownSyncer {
    /// Create a syncer with the default `database_wins` policy.
    pub fn new(tracker: StateTracker, config: &StoreConfig) -> Self {
        Self::with_policy(tracker, config, ConflictPolicy::default())
    }

    /// Create a syncer with an explicit conflict policy.
    pub fn with_policy(tracker: StateTracker, config: &StoreConfig, policy: ConflictPolicy) -> Self {
        Self {
            tracker,
            policy,
            conflict_log_path: config.conflict_log_path.clone(),
        }
    }

    /// Sync one markdown file into the database.
    ///
    /// The file's header must carry `epic` and `story_num`. An unchanged
    /// file (by content hash) is skipped; a changed file has its conflict
    /// set diffed against the store and resolved per the policy. The
    /// conflict set is appended to the conflict log whenever it is
    /// non-empty, regardless of policy.
    pub fn sync_from_markdown(&self, file_path: &Path) -> Result<SyncOutcome> {
        self.sync_from_markdown_inner(file_path).map_err(|e| match e {
            Error::Sync(_) => e,
            other => Error::Sync(format!("Failed to sync {}: {}", file_path.display(), other)),
        })
    }

    fn sync_from_markdown_inner(&self, file_path: &Path) -> Result<SyncOutcome> {
        let content = std::fs::read_to_string(file_path)
            .map_err(|e| Error::Sync(format!("Failed to read {}: {}", file_path.display(), e)))?;
        let (header, _body) = frontmatter::parse(&content);
        let content_hash = content_hash(&content);

        let (epic_num, story_num) = match (
            header_i64(&header, "epic"),
            header_i64(&header, "story_num"),
        ) {
            (Some(e), Some(s)) => (e, s),
            _ => {
                return Err(Error::Sync(format!(
                    "Missing epic or story_num in frontmatter: {}",
                    file_path.display()
                )))
            }
        };

        match self.tracker.get_story(epic_num, story_num) {
            Ok(existing) => {
                if existing.content_hash.as_deref() == Some(content_hash.as_str()) {
                    return Ok(SyncOutcome::Skipped {
                        epic_num,
                        story_num,
                        reason: SkipReason::NoChanges,
                    });
                }

                let conflicts = detect_conflicts(&existing, &header);
                if !conflicts.is_empty() {
                    self.log_conflicts(&conflicts, file_path)?;

                    match self.policy {
                        ConflictPolicy::Manual => {
                            return Ok(SyncOutcome::Conflict {
                                epic_num,
                                story_num,
                                conflicts,
                            });
                        }
                        ConflictPolicy::MarkdownWins => {
                            self.apply_markdown_fields(epic_num, story_num, &conflicts)?;
                        }
                        ConflictPolicy::DatabaseWins => {}
                    }
                }

                self.tracker
                    .update_story_hash(epic_num, story_num, &content_hash)?;
                Ok(SyncOutcome::Updated { epic_num, story_num })
            }
            Err(Error::NotFound(_)) => {
                self.create_from_header(epic_num, story_num, &header, &content_hash, file_path)?;
                Ok(SyncOutcome::Created { epic_num, story_num })
            }
            Err(e) => Err(e),
        }
    }

    /// Sync a story from the database out to a markdown file.
    ///
    /// An existing file is backed up to `<name>.md.bak` and its body
    /// preserved; a fresh file gets the default story template. The header
    /// is always regenerated from the database.
    pub fn sync_to_markdown(
        &self,
        epic_num: i64,
        story_num: i64,
        file_path: Option<&Path>,
    ) -> Result<PathBuf> {
        let story = self.tracker.get_story(epic_num, story_num)?;

        let file_path = match file_path {
            Some(p) => p.to_path_buf(),
            None => default_story_path(epic_num, story_num),
        };

        let body = if file_path.exists() {
            let backup_path = file_path.with_extension("md.bak");
            std::fs::copy(&file_path, &backup_path).map_err(|e| {
                Error::Sync(format!(
                    "Failed to back up {}: {}",
                    file_path.display(),
                    e
                ))
            })?;

            let existing = std::fs::read_to_string(&file_path)
                .map_err(|e| Error::Sync(format!("Failed to read {}: {}", file_path.display(), e)))?;
            let (_, body) = frontmatter::parse(&existing);
            body
        } else {
            default_body(&story)
        };

        let header = story_to_frontmatter(&story);
        let content = frontmatter::serialize(&header, &body)?;

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&file_path, &content)
            .map_err(|e| Error::Sync(format!("Failed to write {}: {}", file_path.display(), e)))?;

        // Record the written file's hash so a follow-up inbound sync sees
        // an unchanged file. The file write and this database write are
        // two separate steps; if the second fails the .bak file is the
        // recovery path.
        self.tracker
            .update_story_hash(epic_num, story_num, &content_hash(&content))?;

        Ok(file_path)
    }

    /// Batch sync a directory of markdown files.
    ///
    /// An error on one file never halts the batch; failures land in the
    /// report alongside the counts.
    pub fn sync_directory(
        &self,
        dir_path: &Path,
        recursive: bool,
        pattern: &str,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        let glob_pattern = if recursive {
            dir_path.join("**").join(pattern)
        } else {
            dir_path.join(pattern)
        };
        let glob_pattern = glob_pattern.to_string_lossy().to_string();

        let paths = glob::glob(&glob_pattern)
            .map_err(|e| Error::Sync(format!("Invalid glob pattern {}: {}", glob_pattern, e)))?;

        for entry in paths {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    report.errors.push((e.path().to_path_buf(), e.to_string()));
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            report.files_processed += 1;

            match self.sync_from_markdown(&path) {
                Ok(SyncOutcome::Created { .. }) => report.stories_created += 1,
                Ok(SyncOutcome::Updated { .. }) => report.stories_updated += 1,
                Ok(SyncOutcome::Skipped { .. }) => report.files_skipped += 1,
                Ok(SyncOutcome::Conflict { .. }) => report.conflicts += 1,
                Err(e) => report.errors.push((path, e.to_string())),
            }
        }

        Ok(report)
    }

    fn create_from_header(
        &self,
        epic_num: i64,
        story_num: i64,
        header: &Mapping,
        content_hash: &str,
        file_path: &Path,
    ) -> Result<()> {
        let title = header_str(header, "title").unwrap_or_else(|| {
            file_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| format!("Story {}.{}", epic_num, story_num))
        });

        let mut new = NewStory::new(epic_num, story_num, title);
        if let Some(status) = header_str(header, "status") {
            new.status = status.parse().map_err(Error::Validation)?;
        }
        if let Some(priority) = header_str(header, "priority") {
            new.priority = priority.parse().map_err(Error::Validation)?;
        }
        new.owner = header_str(header, "owner");
        new.points = header_i64(header, "points").unwrap_or(0);
        new.sprint = header_i64(header, "sprint");
        new.content_hash = Some(content_hash.to_string());

        self.tracker.create_story(new)?;
        Ok(())
    }

    /// Apply the differing fields from the markdown side.
    ///
    /// Priority conflicts are detected and logged but not written; the
    /// store has no priority update operation.
    fn apply_markdown_fields(
        &self,
        epic_num: i64,
        story_num: i64,
        conflicts: &[FieldConflict],
    ) -> Result<()> {
        for conflict in conflicts {
            match conflict.field.as_str() {
                "status" => {
                    let status: StoryStatus =
                        conflict.md_value.parse().map_err(Error::Validation)?;
                    self.tracker.update_story_status(epic_num, story_num, status)?;
                }
                "owner" => {
                    self.tracker
                        .update_story_owner(epic_num, story_num, &conflict.md_value)?;
                }
                "points" => {
                    let points: i64 = conflict.md_value.parse().map_err(|_| {
                        Error::Validation(format!("invalid points value '{}'", conflict.md_value))
                    })?;
                    self.tracker
                        .update_story_points(epic_num, story_num, points)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Append the conflict set to the conflict log.
    ///
    /// The log is append-only text opened per write; interleaved entries
    /// from concurrent writers are not strictly ordered.
    fn log_conflicts(&self, conflicts: &[FieldConflict], file_path: &Path) -> Result<()> {
        if let Some(parent) = self.conflict_log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.conflict_log_path)?;

        writeln!(
            log,
            "\n[{}] Conflicts in {}:",
            Utc::now().to_rfc3339(),
            file_path.display()
        )?;
        for conflict in conflicts {
            writeln!(
                log,
                "  - {}: DB={}, MD={}",
                conflict.field, conflict.db_value, conflict.md_value
            )?;
        }
        Ok(())
    }
}

/// SHA-256 of the content bytes, lowercase hex.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Diff the header's status/owner/points/priority against the stored story.
/// Only non-null header values participate.
fn detect_conflicts(db_story: &Story, header: &Mapping) -> Vec<FieldConflict> {
    let mut conflicts = Vec::new();

    if let Some(md_status) = header_str(header, "status") {
        if db_story.status.as_str() != md_status {
            conflicts.push(FieldConflict {
                field: "status".to_string(),
                db_value: db_story.status.as_str().to_string(),
                md_value: md_status,
            });
        }
    }

    if let Some(md_owner) = header_str(header, "owner") {
        if db_story.owner.as_deref() != Some(md_owner.as_str()) {
            conflicts.push(FieldConflict {
                field: "owner".to_string(),
                db_value: db_story.owner.clone().unwrap_or_default(),
                md_value: md_owner,
            });
        }
    }

    if let Some(md_points) = header_i64(header, "points") {
        if db_story.points != md_points {
            conflicts.push(FieldConflict {
                field: "points".to_string(),
                db_value: db_story.points.to_string(),
                md_value: md_points.to_string(),
            });
        }
    }

    if let Some(md_priority) = header_str(header, "priority") {
        if db_story.priority.as_str() != md_priority {
            conflicts.push(FieldConflict {
                field: "priority".to_string(),
                db_value: db_story.priority.as_str().to_string(),
                md_value: md_priority,
            });
        }
    }

    conflicts
}

/// Standard story path convention: `docs/features/stories/epic-<E>/story-<E>.<S>.md`
fn default_story_path(epic_num: i64, story_num: i64) -> PathBuf {
    PathBuf::from("docs")
        .join("features")
        .join("stories")
        .join(format!("epic-{}", epic_num))
        .join(format!("story-{}.{}.md", epic_num, story_num))
}

fn story_to_frontmatter(story: &Story) -> Mapping {
    let mut header = Mapping::new();
    header.insert(
        Value::String("epic".into()),
        Value::Number(story.epic.into()),
    );
    header.insert(
        Value::String("story_num".into()),
        Value::Number(story.story_num.into()),
    );
    header.insert(
        Value::String("title".into()),
        Value::String(story.title.clone()),
    );
    header.insert(
        Value::String("status".into()),
        Value::String(story.status.as_str().to_string()),
    );
    header.insert(
        Value::String("priority".into()),
        Value::String(story.priority.as_str().to_string()),
    );
    header.insert(
        Value::String("points".into()),
        Value::Number(story.points.into()),
    );
    if let Some(owner) = &story.owner {
        header.insert(Value::String("owner".into()), Value::String(owner.clone()));
    }
    if let Some(sprint) = story.sprint {
        header.insert(Value::String("sprint".into()), Value::Number(sprint.into()));
    }
    header.insert(
        Value::String("updated_at".into()),
        Value::String(story.updated_at.to_rfc3339()),
    );
    header
}

fn default_body(story: &Story) -> String {
    format!(
        "## Story Description\n\n\
         [Story description for {}]\n\n\
         ## Acceptance Criteria\n\n\
         - [ ] Criterion 1\n\
         - [ ] Criterion 2\n\
         - [ ] Criterion 3\n\n\
         ## Technical Notes\n\n\
         [Technical implementation notes]\n\n\
         ## Definition of Done\n\n\
         - [ ] All acceptance criteria met\n\
         - [ ] Tests passing (>80% coverage)\n\
         - [ ] Code reviewed and approved\n\
         - [ ] Documentation complete",
        story.title
    )
}

fn header_i64(header: &Mapping, key: &str) -> Option<i64> {
    match header.get(&Value::String(key.to_string())) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

fn header_str(header: &Mapping, key: &str) -> Option<String> {
    match header.get(&Value::String(key.to_string())) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        config: StoreConfig,
        tracker: StateTracker,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::rooted_at(dir.path());
        schema::initialize(&config).unwrap();
        let tracker = StateTracker::new(&config.db_path).unwrap();
        Fixture {
            _dir: dir,
            config,
            tracker,
        }
    }

    fn write_story_file(dir: &Path, name: &str, header_lines: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("---\n{}---\n\n{}\n", header_lines, body)).unwrap();
        path
    }

    #[test]
    fn test_sync_creates_story() {
        let fx = fixture();
        fx.tracker.create_epic(1, "Epic 1", "f", 0).unwrap();
        let syncer = MarkdownSyncer::new(fx.tracker.clone(), &fx.config);

        let path = write_story_file(
            fx.config.db_path.parent().unwrap(),
            "story-1.1.md",
            "epic: 1\nstory_num: 1\ntitle: Synced story\nstatus: in_progress\npoints: 3\n",
            "Body text",
        );

        let outcome = syncer.sync_from_markdown(&path).unwrap();
        assert!(matches!(outcome, SyncOutcome::Created { epic_num: 1, story_num: 1 }));

        let story = fx.tracker.get_story(1, 1).unwrap();
        assert_eq!(story.title, "Synced story");
        assert_eq!(story.status, StoryStatus::InProgress);
        assert_eq!(story.points, 3);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(story.content_hash.unwrap(), content_hash(&content));
    }

    #[test]
    fn test_sync_unchanged_file_is_skipped() {
        let fx = fixture();
        fx.tracker.create_epic(1, "Epic 1", "f", 0).unwrap();
        let syncer = MarkdownSyncer::new(fx.tracker.clone(), &fx.config);

        let path = write_story_file(
            fx.config.db_path.parent().unwrap(),
            "story-1.1.md",
            "epic: 1\nstory_num: 1\ntitle: t\nstatus: pending\n",
            "Body",
        );

        syncer.sync_from_markdown(&path).unwrap();
        let outcome = syncer.sync_from_markdown(&path).unwrap();
        assert!(matches!(
            outcome,
            SyncOutcome::Skipped {
                reason: SkipReason::NoChanges,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_header_keys_is_a_sync_error() {
        let fx = fixture();
        let syncer = MarkdownSyncer::new(fx.tracker.clone(), &fx.config);

        let path = fx.config.db_path.parent().unwrap().join("broken.md");
        std::fs::write(&path, "---\ntitle: no ids\n---\n\nBody\n").unwrap();

        assert!(matches!(
            syncer.sync_from_markdown(&path),
            Err(Error::Sync(_))
        ));
    }

    #[test]
    fn test_markdown_wins_applies_fields() {
        let fx = fixture();
        fx.tracker.create_epic(1, "Epic 1", "f", 0).unwrap();
        fx.tracker
            .create_story(NewStory::new(1, 1, "t"))
            .unwrap();
        let syncer =
            MarkdownSyncer::with_policy(fx.tracker.clone(), &fx.config, ConflictPolicy::MarkdownWins);

        let path = write_story_file(
            fx.config.db_path.parent().unwrap(),
            "story-1.1.md",
            "epic: 1\nstory_num: 1\ntitle: t\nstatus: in_progress\n",
            "Some body",
        );

        let outcome = syncer.sync_from_markdown(&path).unwrap();
        assert!(matches!(outcome, SyncOutcome::Updated { .. }));

        let story = fx.tracker.get_story(1, 1).unwrap();
        assert_eq!(story.status, StoryStatus::InProgress);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(story.content_hash.unwrap(), content_hash(&content));

        // Conflict log got an entry
        let log = std::fs::read_to_string(&fx.config.conflict_log_path).unwrap();
        assert!(log.contains("status: DB=pending, MD=in_progress"));
    }

    #[test]
    fn test_database_wins_keeps_fields_refreshes_hash() {
        let fx = fixture();
        fx.tracker.create_epic(1, "Epic 1", "f", 0).unwrap();
        fx.tracker.create_story(NewStory::new(1, 1, "t")).unwrap();
        let syncer = MarkdownSyncer::new(fx.tracker.clone(), &fx.config);

        let path = write_story_file(
            fx.config.db_path.parent().unwrap(),
            "story-1.1.md",
            "epic: 1\nstory_num: 1\ntitle: t\nstatus: done\n",
            "Some body",
        );

        let outcome = syncer.sync_from_markdown(&path).unwrap();
        assert!(matches!(outcome, SyncOutcome::Updated { .. }));

        let story = fx.tracker.get_story(1, 1).unwrap();
        assert_eq!(story.status, StoryStatus::Pending);
        assert!(story.content_hash.is_some());
    }

    #[test]
    fn test_manual_policy_reports_conflicts_and_writes_nothing() {
        let fx = fixture();
        fx.tracker.create_epic(1, "Epic 1", "f", 0).unwrap();
        fx.tracker.create_story(NewStory::new(1, 1, "t")).unwrap();
        let syncer =
            MarkdownSyncer::with_policy(fx.tracker.clone(), &fx.config, ConflictPolicy::Manual);

        let path = write_story_file(
            fx.config.db_path.parent().unwrap(),
            "story-1.1.md",
            "epic: 1\nstory_num: 1\ntitle: t\nstatus: blocked\n",
            "Some body",
        );

        let outcome = syncer.sync_from_markdown(&path).unwrap();
        match outcome {
            SyncOutcome::Conflict { conflicts, .. } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].field, "status");
                assert_eq!(conflicts[0].md_value, "blocked");
            }
            other => panic!("expected conflict outcome, got {:?}", other),
        }

        // Neither the status nor the hash moved
        let story = fx.tracker.get_story(1, 1).unwrap();
        assert_eq!(story.status, StoryStatus::Pending);
        assert!(story.content_hash.is_none());

        // But the conflict is on record
        let log = std::fs::read_to_string(&fx.config.conflict_log_path).unwrap();
        assert!(log.contains("status: DB=pending, MD=blocked"));
    }

    #[test]
    fn test_sync_to_markdown_round_trip() {
        let fx = fixture();
        fx.tracker.create_epic(1, "Epic 1", "f", 0).unwrap();
        let mut new = NewStory::new(1, 1, "Round trip");
        new.points = 5;
        new.owner = Some("amelia".to_string());
        fx.tracker.create_story(new).unwrap();
        let syncer = MarkdownSyncer::new(fx.tracker.clone(), &fx.config);

        let target = fx.config.db_path.parent().unwrap().join("story-1.1.md");
        let written = syncer.sync_to_markdown(1, 1, Some(&target)).unwrap();
        assert_eq!(written, target);

        let content = std::fs::read_to_string(&target).unwrap();
        assert!(content.contains("epic: 1"));
        assert!(content.contains("owner: amelia"));
        assert!(content.contains("## Acceptance Criteria"));

        // A follow-up inbound sync sees matching hashes
        let outcome = syncer.sync_from_markdown(&target).unwrap();
        assert!(matches!(outcome, SyncOutcome::Skipped { .. }));
    }

    #[test]
    fn test_sync_to_markdown_preserves_body_and_backs_up() {
        let fx = fixture();
        fx.tracker.create_epic(1, "Epic 1", "f", 0).unwrap();
        fx.tracker.create_story(NewStory::new(1, 1, "t")).unwrap();
        let syncer = MarkdownSyncer::new(fx.tracker.clone(), &fx.config);

        let target = write_story_file(
            fx.config.db_path.parent().unwrap(),
            "story-1.1.md",
            "epic: 1\nstory_num: 1\ntitle: t\nstatus: pending\n",
            "## Custom body\n\nKeep me",
        );

        syncer.sync_to_markdown(1, 1, Some(&target)).unwrap();

        let content = std::fs::read_to_string(&target).unwrap();
        assert!(content.contains("Keep me"));
        assert!(target.with_extension("md.bak").exists());
    }

    #[test]
    fn test_sync_directory_collects_errors_without_halting() {
        let fx = fixture();
        fx.tracker.create_epic(1, "Epic 1", "f", 0).unwrap();
        let syncer = MarkdownSyncer::new(fx.tracker.clone(), &fx.config);

        let dir = fx.config.db_path.parent().unwrap().join("stories");
        write_story_file(
            &dir,
            "story-1.1.md",
            "epic: 1\nstory_num: 1\ntitle: good\nstatus: pending\n",
            "Body",
        );
        write_story_file(&dir, "nested/story-1.2.md",
            "epic: 1\nstory_num: 2\ntitle: nested\nstatus: pending\n",
            "Body",
        );
        std::fs::write(dir.join("broken.md"), "no frontmatter at all\n").unwrap();

        let report = syncer.sync_directory(&dir, true, "*.md").unwrap();
        assert_eq!(report.files_processed, 3);
        assert_eq!(report.stories_created, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].0.ends_with("broken.md"));
    }
}
