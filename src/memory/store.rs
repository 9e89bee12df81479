//! Memory store backing prompt assembly.
//!
//! Two parts: a bounded FIFO log of recent turns, and a free-form notepad
//! the agent rewrites every turn. The notepad is the only durable
//! cross-session artifact; it is persisted on every replacement so a
//! crashed session can resume with its last context.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;

use crate::command::Button;

/// Last N turns kept in the short-term log.
pub const DEFAULT_SHORT_TERM_CAPACITY: usize = 10;

/// Notepad write failure. Non-fatal: the in-memory text is already
/// updated, the control loop logs a warning and continues.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to persist notepad to {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One entry in the short-term log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortTermEntry {
    pub turn: u64,
    pub summary: String,
    pub button: Button,
    /// Wall-clock time of the decision, for the prompt only.
    pub timestamp: String,
}

impl ShortTermEntry {
    pub fn new(turn: u64, summary: impl Into<String>, button: Button) -> Self {
        Self {
            turn,
            summary: summary.into(),
            button,
            timestamp: Local::now().format("%H:%M:%S").to_string(),
        }
    }
}

/// Process-lifetime memory state. Mutated only by the control loop thread
/// between turns; no synchronization needed beyond the atomicity of the
/// notepad file write itself.
pub struct MemoryStore {
    entries: VecDeque<ShortTermEntry>,
    capacity: usize,
    notepad: String,
    notepad_path: PathBuf,
}

impl MemoryStore {
    /// Open the store, loading any previously persisted notepad. A missing
    /// file starts the notepad from the default template.
    pub fn open(notepad_path: impl AsRef<Path>, capacity: usize) -> Self {
        let notepad_path = notepad_path.as_ref().to_path_buf();
        let notepad = match fs::read_to_string(&notepad_path) {
            Ok(text) if !text.trim().is_empty() => {
                tracing::info!(path = %notepad_path.display(), "resuming notepad from disk");
                text
            }
            _ => initial_notepad(),
        };

        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            notepad,
            notepad_path,
        }
    }

    /// Append a turn entry, evicting the oldest once over capacity.
    pub fn append_short_term(&mut self, entry: ShortTermEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Replace the notepad text and persist it durably.
    ///
    /// The on-disk write goes through a temp file and rename so the stored
    /// text is never partially written. On persistence failure the
    /// in-memory text is still updated and the error is returned for the
    /// caller to log as a warning.
    pub fn replace_notepad(&mut self, text: impl Into<String>) -> Result<(), PersistenceError> {
        self.notepad = text.into();
        self.persist_notepad()
    }

    /// Write the current notepad text to disk. Used by `replace_notepad`
    /// and by session teardown to flush the last known-good state.
    pub fn persist_notepad(&self) -> Result<(), PersistenceError> {
        let wrap = |source| PersistenceError::Write {
            path: self.notepad_path.clone(),
            source,
        };

        if let Some(parent) = self.notepad_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(wrap)?;
            }
        }

        let tmp = self.notepad_path.with_extension("tmp");
        fs::write(&tmp, &self.notepad).map_err(wrap)?;
        fs::rename(&tmp, &self.notepad_path).map_err(wrap)
    }

    /// Current notepad text.
    pub fn notepad(&self) -> &str {
        &self.notepad
    }

    /// Short-term entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &ShortTermEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the context block for prompt assembly: the most recent
    /// entries oldest-first, then the notepad. Deterministic for a given
    /// internal state.
    pub fn render_context(&self) -> String {
        let mut out = String::new();

        out.push_str("## Short-term Memory (Recent Actions):\n");
        if self.entries.is_empty() {
            out.push_str("No recent actions.\n");
        } else {
            for (i, entry) in self.entries.iter().enumerate() {
                out.push_str(&format!(
                    "{}. [{}] Pressed {} while {}\n",
                    i + 1,
                    entry.timestamp,
                    entry.button,
                    entry.summary
                ));
            }
        }

        out.push_str("\n## Long-term Memory (Game State):\n");
        out.push_str(&self.notepad);
        out
    }
}

/// Template for a fresh notepad, matching the sections the agent is asked
/// to maintain.
fn initial_notepad() -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!(
        "# Game Progress Notepad\n\n\
         Game started: {timestamp}\n\n\
         ## Current Objectives\n- Explore and begin the journey\n\n\
         ## Current Location\n- Unknown, just started\n\n\
         ## Game Progress\n- Just beginning the adventure\n\n\
         ## Items\n- None yet\n\n\
         ## Team\n- None yet\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> MemoryStore {
        MemoryStore::open(dir.path().join("notepad.txt"), 3)
    }

    #[test]
    fn test_short_term_eviction_keeps_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);

        for turn in 0..5u64 {
            store.append_short_term(ShortTermEntry::new(turn, format!("turn {turn}"), Button::A));
        }

        let turns: Vec<u64> = store.entries().map(|e| e.turn).collect();
        assert_eq!(turns, vec![2, 3, 4]);

        let ctx = store.render_context();
        assert!(!ctx.contains("turn 1"));
        assert!(ctx.contains("turn 2"));
        assert!(ctx.contains("turn 4"));
        // Oldest-first ordering in the rendered block.
        assert!(ctx.find("turn 2").unwrap() < ctx.find("turn 4").unwrap());
    }

    #[test]
    fn test_replace_notepad_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notepad.txt");
        let mut store = MemoryStore::open(&path, 3);

        store.replace_notepad("heading north").unwrap();
        assert_eq!(store.notepad(), "heading north");
        assert_eq!(fs::read_to_string(&path).unwrap(), "heading north");
    }

    #[test]
    fn test_replace_notepad_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notepad.txt");
        let mut store = MemoryStore::open(&path, 3);

        store.replace_notepad("same text").unwrap();
        store.replace_notepad("same text").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "same text");
    }

    #[test]
    fn test_resume_from_persisted_notepad() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notepad.txt");

        {
            let mut store = MemoryStore::open(&path, 3);
            store.replace_notepad("remember the cave").unwrap();
        }

        let resumed = MemoryStore::open(&path, 3);
        assert_eq!(resumed.notepad(), "remember the cave");
    }

    #[test]
    fn test_fresh_notepad_uses_template() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.notepad().contains("## Current Objectives"));
    }

    #[test]
    fn test_render_context_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.append_short_term(ShortTermEntry::new(1, "one", Button::B));
        assert_eq!(store.render_context(), store.render_context());
    }
}
