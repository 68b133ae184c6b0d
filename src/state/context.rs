//! Durable session context: append-only logs plus a state snapshot.
//!
//! The store owns a session directory with three files:
//!
//! - `decisions.jsonl` — append-only log of architectural decisions
//! - `checkpoints.jsonl` — append-only log of progress checkpoints
//! - `state.json` — snapshot of the task graph, replaced atomically
//!
//! Log entries are immutable once appended and are always read back in
//! insertion order. Each append writes one framed line and syncs it, so
//! a crash between appends never corrupts earlier entries. The snapshot
//! is written to a temp file and renamed over the old one, so readers
//! see either the previous state or the new one, never a torn write.

use crate::core::{Task, TaskGraph};
use crate::error::{Error, Result};
use crate::{stlog, stlog_debug};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default confidence for a decision when none is given (1-10 scale).
const DEFAULT_CONFIDENCE: u8 = 7;

/// An architectural or implementation decision. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionEntry {
    pub timestamp: DateTime<Utc>,
    pub decision: String,
    pub rationale: String,
    pub alternatives: Vec<String>,
    /// 1-10 scale.
    pub confidence: u8,
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: String,
}

impl DecisionEntry {
    pub fn new(decision: &str, rationale: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            decision: decision.to_string(),
            rationale: rationale.to_string(),
            alternatives: Vec::new(),
            confidence: DEFAULT_CONFIDENCE,
            tags: Vec::new(),
            context: String::new(),
        }
    }

    pub fn with_alternatives(mut self, alternatives: Vec<String>) -> Self {
        self.alternatives = alternatives;
        self
    }

    /// Clamped to the 1-10 scale.
    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = confidence.clamp(1, 10);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.context = context.to_string();
        self
    }
}

/// A progress checkpoint. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointEntry {
    pub timestamp: DateTime<Utc>,
    pub objective: String,
    pub achievements: Vec<String>,
    pub challenges: Vec<String>,
    pub current_state: String,
    pub next_actions: Vec<String>,
    /// 0-100.
    #[serde(default)]
    pub completion_percent: u8,
}

impl CheckpointEntry {
    pub fn new(objective: &str, current_state: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            objective: objective.to_string(),
            achievements: Vec::new(),
            challenges: Vec::new(),
            current_state: current_state.to_string(),
            next_actions: Vec::new(),
            completion_percent: 0,
        }
    }

    pub fn with_achievements(mut self, achievements: Vec<String>) -> Self {
        self.achievements = achievements;
        self
    }

    pub fn with_challenges(mut self, challenges: Vec<String>) -> Self {
        self.challenges = challenges;
        self
    }

    pub fn with_next_actions(mut self, next_actions: Vec<String>) -> Self {
        self.next_actions = next_actions;
        self
    }

    /// Clamped to 100.
    pub fn with_completion_percent(mut self, percent: u8) -> Self {
        self.completion_percent = percent.min(100);
        self
    }
}

/// Everything the next session needs to pick up where this one stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffPackage {
    pub created_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
    pub recent_decisions: Vec<DecisionEntry>,
    pub recent_checkpoints: Vec<CheckpointEntry>,
    pub summary: String,
}

/// Durable store for one project's session context.
pub struct ContextStore {
    root: PathBuf,
}

impl ContextStore {
    /// Open (creating if necessary) the store at the given directory.
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        stlog_debug!("ContextStore::open root={}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn decisions_path(&self) -> PathBuf {
        self.root.join("decisions.jsonl")
    }

    fn checkpoints_path(&self) -> PathBuf {
        self.root.join("checkpoints.jsonl")
    }

    fn state_path(&self) -> PathBuf {
        self.root.join("state.json")
    }

    // ========== Append-only logs ==========

    /// Append a decision entry. Atomic and durable.
    pub fn append_decision(&self, entry: &DecisionEntry) -> Result<()> {
        self.append_line(&self.decisions_path(), entry)?;
        stlog!("Decision logged: {}", entry.decision);
        Ok(())
    }

    /// Append a checkpoint entry. Atomic and durable.
    pub fn append_checkpoint(&self, entry: &CheckpointEntry) -> Result<()> {
        self.append_line(&self.checkpoints_path(), entry)?;
        stlog!(
            "Checkpoint logged: {} ({}% complete)",
            entry.objective,
            entry.completion_percent
        );
        Ok(())
    }

    /// All decisions, in insertion order.
    pub fn read_decisions(&self) -> Result<Vec<DecisionEntry>> {
        self.read_lines(&self.decisions_path())
    }

    /// All checkpoints, in insertion order.
    pub fn read_checkpoints(&self) -> Result<Vec<CheckpointEntry>> {
        self.read_lines(&self.checkpoints_path())
    }

    /// The most recent `limit` decisions, oldest first.
    pub fn recent_decisions(&self, limit: usize) -> Result<Vec<DecisionEntry>> {
        let mut entries = self.read_decisions()?;
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.split_off(skip))
    }

    /// The most recent `limit` checkpoints, oldest first.
    pub fn recent_checkpoints(&self, limit: usize) -> Result<Vec<CheckpointEntry>> {
        let mut entries = self.read_checkpoints()?;
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.split_off(skip))
    }

    fn append_line<T: Serialize>(&self, path: &Path, entry: &T) -> Result<()> {
        // serde_json never emits raw newlines inside a compact document,
        // so one entry is exactly one line.
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn read_lines<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)?;
        let mut entries = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(line).map_err(|e| {
                Error::StateCorruption(format!(
                    "{} line {}: {}",
                    path.display(),
                    number + 1,
                    e
                ))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    // ========== State snapshot ==========

    /// Whether a snapshot exists.
    pub fn has_state(&self) -> bool {
        self.state_path().exists()
    }

    /// Persist the full task graph, replacing any previous snapshot
    /// atomically.
    pub fn save_state(&self, graph: &TaskGraph) -> Result<()> {
        let records = graph.to_records();
        let json = serde_json::to_string_pretty(&records)?;

        let tmp = self.root.join("state.json.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, self.state_path())?;

        stlog_debug!("State saved: {} task(s)", records.len());
        Ok(())
    }

    /// Load the persisted task graph.
    ///
    /// # Errors
    /// `Error::Validation` if no snapshot exists;
    /// `Error::StateCorruption` if the snapshot is unreadable or
    /// structurally inconsistent.
    pub fn load_state(&self) -> Result<TaskGraph> {
        let path = self.state_path();
        if !path.exists() {
            return Err(Error::Validation(format!(
                "no saved session state at {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(&path)?;
        let records: Vec<Task> = serde_json::from_str(&content)
            .map_err(|e| Error::StateCorruption(format!("{}: {}", path.display(), e)))?;
        TaskGraph::from_records(records)
    }

    // ========== Session continuity ==========

    /// Markdown summary of the session: task counts, recent decisions,
    /// and the latest checkpoint's next actions.
    pub fn session_summary(&self) -> Result<String> {
        let mut summary = format!("# Session Summary - {}\n", Utc::now().format("%Y-%m-%d"));

        summary.push_str("\n## Tasks\n");
        if self.has_state() {
            let graph = self.load_state()?;
            let counts = graph.status_counts();
            summary.push_str(&format!(
                "- {} total: {} completed, {} in progress, {} pending, {} failed, {} blocked, {} cancelled\n",
                counts.total(),
                counts.completed,
                counts.in_progress,
                counts.pending,
                counts.failed,
                counts.blocked,
                counts.cancelled
            ));
            for task in graph.tasks().filter(|t| t.error().is_some()) {
                summary.push_str(&format!(
                    "- failed: **{}** ({})\n",
                    task.name,
                    task.error().unwrap_or_default()
                ));
            }
        } else {
            summary.push_str("- no saved task graph\n");
        }

        summary.push_str("\n## Recent Decisions\n");
        for decision in self.recent_decisions(3)? {
            summary.push_str(&format!(
                "- **{}**: {} (Confidence: {}/10)\n",
                decision.decision, decision.rationale, decision.confidence
            ));
        }

        let checkpoints = self.recent_checkpoints(2)?;
        summary.push_str("\n## Recent Progress\n");
        for checkpoint in &checkpoints {
            summary.push_str(&format!(
                "- **{}** ({}%): {}\n",
                checkpoint.objective, checkpoint.completion_percent, checkpoint.current_state
            ));
        }

        summary.push_str("\n## Next Actions\n");
        if let Some(latest) = checkpoints.last() {
            for action in &latest.next_actions {
                summary.push_str(&format!("- {}\n", action));
            }
        }

        Ok(summary)
    }

    /// Bundle state, recent log entries, and the summary for the next
    /// session.
    pub fn handoff(&self) -> Result<HandoffPackage> {
        let tasks = if self.has_state() {
            self.load_state()?.to_records()
        } else {
            Vec::new()
        };
        Ok(HandoffPackage {
            created_at: Utc::now(),
            tasks,
            recent_decisions: self.recent_decisions(5)?,
            recent_checkpoints: self.recent_checkpoints(3)?,
            summary: self.session_summary()?,
        })
    }
}
