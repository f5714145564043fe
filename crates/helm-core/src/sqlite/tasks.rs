use std::collections::BTreeMap;

use crate::models::{
    CoreResult, ErrorKind, TaskId, TaskLabel, TaskLogLevel, TaskLogRecord, TaskOutput, TaskRecord,
    TaskStatus, TaskType,
};
use crate::persistence::TaskStore;
use crate::sqlite::store::{
    SqliteStore, from_flag, parse_manager, time_from_unix, to_flag, unix_from_time,
};

impl TaskStore for SqliteStore {
    fn insert_task(&self, task: &TaskRecord) -> CoreResult<()> {
        let row = TaskRow::from_record(task);
        self.with_write("insert_task", move |connection| {
            connection.execute(
                "INSERT INTO tasks
                    (task_id, manager_id, task_type, status, label_key, label_args,
                     created_at_unix, terminal_at_unix, error_kind)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                (
                    row.task_id,
                    row.manager.as_str(),
                    row.task_type.as_str(),
                    row.status.as_str(),
                    row.label_key.as_str(),
                    row.label_args.as_str(),
                    row.created_at,
                    row.terminal_at,
                    row.error_kind.as_deref(),
                ),
            )?;
            Ok(())
        })
    }

    fn update_task(&self, task: &TaskRecord) -> CoreResult<()> {
        let row = TaskRow::from_record(task);
        self.with_write("update_task", move |connection| {
            connection.execute(
                "UPDATE tasks SET
                    status = ?2, label_key = ?3, label_args = ?4,
                    terminal_at_unix = ?5, error_kind = ?6
                 WHERE task_id = ?1",
                (
                    row.task_id,
                    row.status.as_str(),
                    row.label_key.as_str(),
                    row.label_args.as_str(),
                    row.terminal_at,
                    row.error_kind.as_deref(),
                ),
            )?;
            Ok(())
        })
    }

    fn task(&self, task_id: TaskId) -> CoreResult<Option<TaskRecord>> {
        self.with_read("task", move |connection| {
            let mut statement = connection.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1"
            ))?;
            let mut rows = statement.query_map([task_id.0 as i64], task_from_row)?;
            rows.next().transpose()
        })
    }

    fn list_recent_tasks(&self, limit: usize) -> CoreResult<Vec<TaskRecord>> {
        self.with_read("list_recent_tasks", move |connection| {
            let mut statement = connection.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks ORDER BY task_id DESC LIMIT ?1"
            ))?;
            let rows = statement.query_map([limit as i64], task_from_row)?;
            rows.collect()
        })
    }

    fn max_task_id(&self) -> CoreResult<Option<u64>> {
        self.with_read("max_task_id", |connection| {
            let max: Option<i64> =
                connection.query_row("SELECT MAX(task_id) FROM tasks", [], |row| row.get(0))?;
            Ok(max.map(|id| id as u64))
        })
    }

    fn prune_terminal_tasks(&self, max_age_secs: i64, keep_newest: usize) -> CoreResult<()> {
        self.with_write("prune_terminal_tasks", move |connection| {
            connection.execute(
                "DELETE FROM tasks
                 WHERE status IN ('completed', 'failed', 'cancelled')
                   AND terminal_at_unix IS NOT NULL
                   AND terminal_at_unix < strftime('%s', 'now') - ?1
                   AND task_id NOT IN (
                       SELECT task_id FROM tasks
                       WHERE status IN ('completed', 'failed', 'cancelled')
                       ORDER BY task_id DESC LIMIT ?2
                   )",
                (max_age_secs, keep_newest as i64),
            )?;
            connection.execute(
                "DELETE FROM task_output WHERE task_id NOT IN (SELECT task_id FROM tasks)",
                [],
            )?;
            connection.execute(
                "DELETE FROM task_logs WHERE task_id NOT IN (SELECT task_id FROM tasks)",
                [],
            )?;
            Ok(())
        })
    }

    fn record_output(&self, task_id: TaskId, output: &TaskOutput) -> CoreResult<()> {
        let output = output.clone();
        self.with_write("record_output", move |connection| {
            connection.execute(
                "INSERT INTO task_output (task_id, stdout, stderr, exit_code, truncated)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(task_id) DO UPDATE SET
                    stdout = excluded.stdout,
                    stderr = excluded.stderr,
                    exit_code = excluded.exit_code,
                    truncated = excluded.truncated",
                (
                    task_id.0 as i64,
                    output.stdout.as_deref(),
                    output.stderr.as_deref(),
                    output.exit_code,
                    to_flag(output.truncated),
                ),
            )?;
            Ok(())
        })
    }

    fn task_output(&self, task_id: TaskId) -> CoreResult<Option<TaskOutput>> {
        self.with_read("task_output", move |connection| {
            let mut statement = connection.prepare(
                "SELECT stdout, stderr, exit_code, truncated FROM task_output WHERE task_id = ?1",
            )?;
            let mut rows = statement.query_map([task_id.0 as i64], |row| {
                Ok(TaskOutput {
                    stdout: row.get(0)?,
                    stderr: row.get(1)?,
                    exit_code: row.get(2)?,
                    truncated: from_flag(row.get(3)?),
                })
            })?;
            rows.next().transpose()
        })
    }

    fn append_task_log(
        &self,
        task_id: TaskId,
        level: TaskLogLevel,
        message: &str,
    ) -> CoreResult<()> {
        let message = message.to_owned();
        self.with_write("append_task_log", move |connection| {
            connection.execute(
                "INSERT INTO task_logs (task_id, level, message, created_at_unix)
                 VALUES (?1, ?2, ?3, strftime('%s', 'now'))",
                (task_id.0 as i64, level.as_str(), message.as_str()),
            )?;
            Ok(())
        })
    }

    fn task_logs(&self, task_id: TaskId, limit: usize) -> CoreResult<Vec<TaskLogRecord>> {
        self.with_read("task_logs", move |connection| {
            let mut statement = connection.prepare(
                "SELECT log_id, task_id, level, message, created_at_unix
                 FROM task_logs
                 WHERE task_id = ?1
                 ORDER BY log_id DESC
                 LIMIT ?2",
            )?;
            let rows = statement.query_map((task_id.0 as i64, limit as i64), |row| {
                let level: String = row.get(2)?;
                Ok(TaskLogRecord {
                    id: row.get::<_, i64>(0)? as u64,
                    task_id: TaskId(row.get::<_, i64>(1)? as u64),
                    level: level.parse().unwrap_or(TaskLogLevel::Info),
                    message: row.get(3)?,
                    created_at: time_from_unix(row.get(4)?),
                })
            })?;
            rows.collect()
        })
    }
}

const TASK_COLUMNS: &str = "task_id, manager_id, task_type, status, label_key, label_args, \
                            created_at_unix, terminal_at_unix, error_kind";

struct TaskRow {
    task_id: i64,
    manager: crate::models::ManagerId,
    task_type: TaskType,
    status: TaskStatus,
    label_key: String,
    label_args: String,
    created_at: i64,
    terminal_at: Option<i64>,
    error_kind: Option<String>,
}

impl TaskRow {
    fn from_record(task: &TaskRecord) -> Self {
        Self {
            task_id: task.id.0 as i64,
            manager: task.manager,
            task_type: task.task_type,
            status: task.status,
            label_key: task.label.key.clone(),
            label_args: serde_json::to_string(&task.label.args)
                .unwrap_or_else(|_| "{}".to_string()),
            created_at: unix_from_time(task.created_at),
            terminal_at: task.terminal_at.map(unix_from_time),
            error_kind: task.error_kind.map(|kind| kind.as_str().to_string()),
        }
    }
}

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRecord> {
    let manager: String = row.get(1)?;
    let task_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    let label_args_json: String = row.get(5)?;
    let error_kind: Option<String> = row.get(8)?;

    // A corrupt args blob degrades to an empty map, never an error.
    let args: BTreeMap<String, String> =
        serde_json::from_str(&label_args_json).unwrap_or_default();

    Ok(TaskRecord {
        id: TaskId(row.get::<_, i64>(0)? as u64),
        manager: parse_manager(&manager)?,
        task_type: task_type.parse().unwrap_or(TaskType::Refresh),
        status: status.parse().unwrap_or(TaskStatus::Failed),
        label: TaskLabel {
            key: row.get(4)?,
            args,
        },
        created_at: time_from_unix(row.get(6)?),
        terminal_at: row.get::<_, Option<i64>>(7)?.map(time_from_unix),
        error_kind: error_kind.and_then(|kind| kind.parse::<ErrorKind>().ok()),
    })
}
