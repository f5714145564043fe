//! Bounded in-process staging area for child-process output.
//!
//! The runner appends here as streams arrive; the coordinator reads the
//! entry when a task reaches a terminal status and persists it as the task's
//! durable output record. Oldest entries are evicted once the ledger is full.

use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock};

use crate::models::{TaskId, TaskOutput};

const MAX_ENTRIES: usize = 512;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LedgerEntry {
    pub command: Option<String>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub exit_code: Option<i32>,
}

impl LedgerEntry {
    pub fn to_task_output(&self) -> TaskOutput {
        TaskOutput {
            stdout: non_blank(&self.stdout),
            stderr: non_blank(&self.stderr),
            exit_code: self.exit_code,
            truncated: self.stdout_truncated || self.stderr_truncated,
        }
    }
}

fn non_blank(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes).to_string();
    if text.trim().is_empty() { None } else { Some(text) }
}

static LEDGER: OnceLock<Mutex<BTreeMap<u64, LedgerEntry>>> = OnceLock::new();

fn ledger() -> &'static Mutex<BTreeMap<u64, LedgerEntry>> {
    LEDGER.get_or_init(|| Mutex::new(BTreeMap::new()))
}

fn with_entry(task_id: TaskId, update: impl FnOnce(&mut LedgerEntry)) {
    let Ok(mut entries) = ledger().lock() else {
        return;
    };
    if !entries.contains_key(&task_id.0)
        && entries.len() >= MAX_ENTRIES
        && let Some(oldest) = entries.keys().next().copied()
    {
        entries.remove(&oldest);
    }
    update(entries.entry(task_id.0).or_default());
}

pub fn record_command(task_id: TaskId, command_display: &str) {
    with_entry(task_id, |entry| {
        entry.command = Some(command_display.to_string());
    });
}

pub fn record_outcome(
    task_id: TaskId,
    stdout: &[u8],
    stderr: &[u8],
    stdout_truncated: bool,
    stderr_truncated: bool,
    exit_code: Option<i32>,
) {
    with_entry(task_id, |entry| {
        entry.stdout = stdout.to_vec();
        entry.stderr = stderr.to_vec();
        entry.stdout_truncated = stdout_truncated;
        entry.stderr_truncated = stderr_truncated;
        entry.exit_code = exit_code;
    });
}

pub fn take(task_id: TaskId) -> Option<LedgerEntry> {
    ledger().lock().ok()?.remove(&task_id.0)
}

pub fn get(task_id: TaskId) -> Option<LedgerEntry> {
    ledger().lock().ok()?.get(&task_id.0).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_round_trips_and_take_consumes() {
        let task_id = TaskId(900_001);
        record_command(task_id, "brew outdated --verbose");
        record_outcome(task_id, b"wget 1.24 -> 1.25\n", b"", false, false, Some(0));

        let entry = get(task_id).expect("entry should exist");
        assert_eq!(entry.command.as_deref(), Some("brew outdated --verbose"));
        assert_eq!(entry.exit_code, Some(0));

        let output = entry.to_task_output();
        assert_eq!(output.stdout.as_deref(), Some("wget 1.24 -> 1.25\n"));
        assert_eq!(output.stderr, None);
        assert!(!output.truncated);

        assert!(take(task_id).is_some());
        assert!(get(task_id).is_none());
    }

    #[test]
    fn blank_streams_become_none() {
        let task_id = TaskId(900_002);
        record_outcome(task_id, b"  \n", b"", false, true, None);
        let output = get(task_id).unwrap().to_task_output();
        assert_eq!(output.stdout, None);
        assert!(output.truncated);
    }
}
