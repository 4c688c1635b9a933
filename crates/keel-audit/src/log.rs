// log.rs — File-backed task event logs (JSONL, hash-chained).
//
// Each task gets its own JSON Lines file: `<dir>/<task_id>.jsonl`, one
// event per line. Every event is linked to the previous line of the same
// file via `previous_hash`, so inserting, deleting or editing a line breaks
// the chain and `verify_chain` reports where.
//
// Appends from concurrent callers are serialized by one mutex that also
// guards the per-task chain heads. Each event is written with a single
// `write_all` to a file opened in append mode, so lines never interleave.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::AuditError;
use crate::event::TaskEvent;
use crate::hasher;
use crate::sink::TaskEventSink;

/// Longest task id accepted as a file name.
const MAX_TASK_ID_LEN: usize = 128;

/// A directory of append-only, hash-chained task event logs.
pub struct TaskEventLog {
    dir: PathBuf,
    /// Hash of the last line written per task. A task missing from the map
    /// has not been touched by this process yet; its head is recovered from
    /// disk on first append.
    heads: Mutex<HashMap<String, Option<String>>>,
}

impl TaskEventLog {
    /// Open (or create) a log directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, AuditError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| AuditError::OpenFailed {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            heads: Mutex::new(HashMap::new()),
        })
    }

    /// Path of the log file for `task_id`.
    pub fn task_path(&self, task_id: &str) -> Result<PathBuf, AuditError> {
        validate_task_id(task_id)?;
        Ok(self.dir.join(format!("{}.jsonl", task_id)))
    }

    /// Return the log directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read every event of one task, oldest first.
    pub fn read_task(&self, task_id: &str) -> Result<Vec<TaskEvent>, AuditError> {
        let path = self.task_path(task_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        Self::read_all(path)
    }

    /// Verify the hash chain of one task's log. A task with no log is valid.
    pub fn verify_task(&self, task_id: &str) -> Result<bool, AuditError> {
        let path = self.task_path(task_id)?;
        if !path.exists() {
            return Ok(true);
        }
        Self::verify_chain(path)
    }

    /// Read all events from a log file. Skips blank lines.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<TaskEvent>, AuditError> {
        let reader = open_reader(path.as_ref())?;
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }

    /// Verify the integrity of a log file's hash chain.
    ///
    /// Returns `Ok(true)` if every event's `previous_hash` matches the hash
    /// of the raw line before it, or an `IntegrityViolation` naming the first
    /// line that does not.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<bool, AuditError> {
        let reader = open_reader(path.as_ref())?;
        let mut previous_hash: Option<String> = None;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event: TaskEvent = serde_json::from_str(&line)?;
            if event.previous_hash != previous_hash {
                return Err(AuditError::IntegrityViolation {
                    line: line_num + 1,
                    expected: previous_hash.unwrap_or_else(|| "None".to_string()),
                    actual: event.previous_hash.unwrap_or_else(|| "None".to_string()),
                });
            }
            // Hash the raw line, not a re-serialization: field order matters.
            previous_hash = Some(hasher::hash_str(&line));
        }

        Ok(true)
    }

    fn read_last_hash(path: &Path) -> Result<Option<String>, AuditError> {
        if !path.exists() {
            return Ok(None);
        }
        let reader = open_reader(path)?;
        let mut last_line: Option<String> = None;
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }
        Ok(last_line.map(|line| hasher::hash_str(&line)))
    }
}

impl TaskEventSink for TaskEventLog {
    fn append_task_event(&self, task_id: &str, event: &mut TaskEvent) -> Result<(), AuditError> {
        let path = self.task_path(task_id)?;
        let mut heads = self
            .heads
            .lock()
            .map_err(|e| AuditError::SinkUnavailable(format!("log lock poisoned: {}", e)))?;

        let previous_hash = match heads.get(task_id) {
            Some(head) => head.clone(),
            None => Self::read_last_hash(&path)?,
        };
        event.previous_hash = previous_hash;

        let json = serde_json::to_string(event)?;
        let mut line = json.clone();
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        // Only advance the head once the line is on disk.
        heads.insert(task_id.to_string(), Some(hasher::hash_str(&json)));
        tracing::debug!(task_id, event_id = %event.event_id, "appended task event");
        Ok(())
    }
}

fn open_reader(path: &Path) -> Result<BufReader<File>, AuditError> {
    let file = File::open(path).map_err(|source| AuditError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Task ids become file names, so only a conservative character set passes.
fn validate_task_id(task_id: &str) -> Result<(), AuditError> {
    let valid = !task_id.is_empty()
        && task_id.len() <= MAX_TASK_ID_LEN
        && !task_id.starts_with('.')
        && task_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(AuditError::InvalidTaskId {
            task_id: task_id.to_string(),
        })
    }
}
