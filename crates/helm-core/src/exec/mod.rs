//! Structured subprocess execution.
//!
//! Commands are argv vectors — there is no shell anywhere in this module.
//! Child environments start empty and receive a sanitized inherited set plus
//! the request's explicit overrides. Output capture is concurrent and
//! bounded; termination is cooperative (SIGTERM, grace, SIGKILL) and the
//! outcome reports how the process ended.

pub mod cancel;
pub mod output_ledger;
#[cfg(unix)]
pub mod tokio_runner;

pub use cancel::CancelToken;
pub use output_ledger::LedgerEntry;
#[cfg(unix)]
pub use tokio_runner::TokioProcessRunner;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::{Duration, SystemTime};

use crate::models::{CoreError, CoreResult, ManagerId, Operation, TaskId, TaskType};

/// Environment variables a child inherits even without an explicit override.
pub const INHERITED_ENV: &[&str] = &["PATH", "HOME", "USER", "LANG", "LC_ALL", "TMPDIR", "SHELL"];

/// Per-stream capture cap. Overflow keeps the tail and marks truncation.
pub const STREAM_CAP_BYTES: usize = 256 * 1024;

/// How long a SIGTERM'd process gets before SIGKILL.
pub const TERM_GRACE: Duration = Duration::from_secs(2);

pub type WaitFuture = Pin<Box<dyn Future<Output = CoreResult<ExecOutput>> + Send>>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Single-line rendering for task output records and tracing. Display
    /// only; never fed back to a shell.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(quote_for_display(&self.program.to_string_lossy()));
        parts.extend(self.args.iter().map(|arg| quote_for_display(arg)));
        parts.join(" ")
    }
}

fn quote_for_display(text: &str) -> String {
    if text.is_empty() {
        return "''".to_string();
    }
    let plain = text.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '@' | '=' | '+')
    });
    if plain {
        text.to_string()
    } else {
        format!("'{}'", text.replace('\'', "'\\''"))
    }
}

#[derive(Clone, Debug)]
pub struct ExecRequest {
    pub manager: ManagerId,
    pub task_type: TaskType,
    pub operation: Operation,
    pub command: CommandLine,
    pub env_overrides: BTreeMap<String, String>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
    pub task_id: Option<TaskId>,
    pub cancel: CancelToken,
}

impl ExecRequest {
    pub fn new(
        manager: ManagerId,
        operation: Operation,
        command: CommandLine,
    ) -> Self {
        Self {
            manager,
            task_type: TaskType::for_operation(operation),
            operation,
            command,
            env_overrides: BTreeMap::new(),
            stdin: None,
            timeout: None,
            task_id: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(key.into(), value.into());
        self
    }

    pub fn stdin(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn task_id(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        let attributed = |message: &str| {
            CoreError::invalid_input(message).attributed(
                self.manager,
                self.task_type,
                self.operation,
            )
        };

        if self.command.program.as_os_str().is_empty() {
            return Err(attributed("command program must not be empty"));
        }
        if self
            .command
            .args
            .iter()
            .any(|arg| arg.is_empty() || arg.contains('\0'))
        {
            return Err(attributed(
                "command args must be non-empty and free of NUL bytes",
            ));
        }
        if self.env_overrides.iter().any(|(key, value)| {
            key.is_empty() || key.contains('\0') || key.contains('=') || value.contains('\0')
        }) {
            return Err(attributed(
                "environment overrides must have well-formed keys and values",
            ));
        }
        if let Some(timeout) = self.timeout
            && timeout.is_zero()
        {
            return Err(attributed("timeout must be greater than zero"));
        }

        Ok(())
    }
}

/// How a child process ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TerminatedBy {
    /// Ran to completion (any exit code).
    Exited,
    /// Killed by the runner after the request timeout elapsed.
    TimedOut,
    /// Killed by the runner after the cancel token fired.
    Cancelled,
    /// Ended on a signal the runner did not send.
    Killed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecOutput {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub terminated_by: TerminatedBy,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.terminated_by == TerminatedBy::Exited && self.exit_code == Some(0)
    }
}

pub trait RunningChild: Send + std::fmt::Debug {
    fn pid(&self) -> Option<u32>;

    /// Request termination out-of-band (kill without cancelling the token).
    fn kill(&self);

    fn wait(self: Box<Self>) -> WaitFuture;
}

pub trait ProcessRunner: Send + Sync {
    fn start(&self, request: ExecRequest) -> CoreResult<Box<dyn RunningChild>>;
}

/// Validate, inherit ambient task identity, spawn, and wait to completion.
/// This is the one entry point adapter sources use; it must be called from a
/// blocking context inside a tokio runtime.
pub fn run_to_end(runner: &dyn ProcessRunner, mut request: ExecRequest) -> CoreResult<ExecOutput> {
    if request.task_id.is_none() {
        request.task_id = crate::task_context::current_task_id();
    }
    if let Some(token) = crate::task_context::current_cancel_token()
        && !request.cancel.is_cancelled()
    {
        request.cancel = token;
    }
    request.validate()?;

    let manager = request.manager;
    let task_type = request.task_type;
    let operation = request.operation;

    let child = runner.start(request)?;
    let handle = tokio::runtime::Handle::current();
    handle
        .block_on(child.wait())
        .map_err(|error| error.attributed(manager, task_type, operation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ManagerId, Operation};

    fn request(command: CommandLine) -> ExecRequest {
        ExecRequest::new(ManagerId::Npm, Operation::ListInstalled, command)
    }

    #[test]
    fn validate_rejects_empty_program_and_nul_args() {
        let empty = request(CommandLine::new(""));
        assert!(empty.validate().is_err());

        let nul = request(CommandLine::new("npm").arg("bad\0arg"));
        assert!(nul.validate().is_err());

        let blank_arg = request(CommandLine::new("npm").arg(""));
        assert!(blank_arg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeout_and_malformed_env() {
        let zero = request(CommandLine::new("npm")).timeout(Duration::ZERO);
        assert!(zero.validate().is_err());

        let env = request(CommandLine::new("npm")).env("BAD=KEY", "value");
        assert!(env.validate().is_err());
    }

    #[test]
    fn display_quotes_only_where_needed() {
        let command = CommandLine::new("/usr/bin/npm")
            .args(["install", "-g"])
            .arg("left pad");
        assert_eq!(command.display(), "/usr/bin/npm install -g 'left pad'");
    }
}
