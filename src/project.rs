//! Project-context interface.
//!
//! The scanner that discovers relevant files lives outside the core; it
//! is consumed here as a read-only collaborator whose listing enriches
//! the hints passed to planning and dispatch.

use crate::error::Result;
use crate::stlog_debug;
use std::path::{Path, PathBuf};

/// Read-only source of the project's file layout.
pub trait ProjectScanner {
    /// Return a structured listing of relevant file paths.
    fn scan(&self) -> Result<Vec<PathBuf>>;
}

/// Context passed alongside a problem statement into planning and into
/// every agent dispatch.
#[derive(Debug, Clone, Default)]
pub struct ContextHints {
    /// Relevant files discovered by the project scanner.
    pub files: Vec<PathBuf>,
    /// Free-form notes supplied by the caller.
    pub notes: Vec<String>,
}

impl ContextHints {
    /// Create empty hints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create hints populated from a project scanner.
    pub fn from_scanner(scanner: &dyn ProjectScanner) -> Result<Self> {
        let files = scanner.scan()?;
        stlog_debug!("ContextHints::from_scanner files={}", files.len());
        Ok(Self {
            files,
            notes: Vec::new(),
        })
    }

    /// Add a free-form note.
    pub fn with_note(mut self, note: &str) -> Self {
        self.notes.push(note.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.notes.is_empty()
    }
}

/// Maximum directory depth walked by [`DirScanner`].
const SCAN_MAX_DEPTH: usize = 3;

/// Maximum number of entries a scan returns.
const SCAN_MAX_ENTRIES: usize = 200;

/// Simple filesystem-walking scanner used by the CLI.
///
/// Walks up to three levels below the root, skipping hidden entries and
/// build output, and returns paths in sorted order so that hint content
/// is deterministic.
pub struct DirScanner {
    root: PathBuf,
}

impl DirScanner {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn walk(&self, dir: &Path, depth: usize, out: &mut Vec<PathBuf>) -> Result<()> {
        if depth > SCAN_MAX_DEPTH || out.len() >= SCAN_MAX_ENTRIES {
            return Ok(());
        }
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        for path in entries {
            if out.len() >= SCAN_MAX_ENTRIES {
                break;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if name.starts_with('.') || name == "target" || name == "node_modules" {
                continue;
            }
            if path.is_dir() {
                self.walk(&path, depth + 1, out)?;
            } else {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl ProjectScanner for DirScanner {
    fn scan(&self) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        if self.root.is_dir() {
            self.walk(&self.root, 0, &mut out)?;
        }
        Ok(out)
    }
}
