use std::future::pending;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio::task::JoinHandle;

use crate::exec::{
    CancelToken, ExecOutput, ExecRequest, INHERITED_ENV, ProcessRunner, RunningChild,
    STREAM_CAP_BYTES, TERM_GRACE, TerminatedBy, WaitFuture, output_ledger,
};
use crate::models::{CoreError, CoreResult, ErrorKind, TaskId};

/// Production runner: tokio child processes in their own process group,
/// signalled as a group so descendants cannot outlive a kill.
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    fn start(&self, request: ExecRequest) -> CoreResult<Box<dyn RunningChild>> {
        request.validate()?;

        let mut command = tokio::process::Command::new(&request.command.program);
        command.args(&request.command.args);

        command.env_clear();
        for key in INHERITED_ENV {
            if let Ok(value) = std::env::var(key) {
                command.env(key, value);
            }
        }
        for (key, value) in &request.env_overrides {
            command.env(key, value);
        }

        command.stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.process_group(0);

        let child = command.spawn().map_err(|error| {
            let kind = if error.kind() == std::io::ErrorKind::NotFound {
                ErrorKind::NotInstalled
            } else {
                ErrorKind::ProcessFailure
            };
            CoreError::new(
                kind,
                format!(
                    "failed to spawn '{}': {error}",
                    request.command.program.display()
                ),
            )
            .attributed(request.manager, request.task_type, request.operation)
        })?;

        let pid = child.id();
        if let Some(task_id) = request.task_id {
            output_ledger::record_command(task_id, &request.command.display());
        }

        Ok(Box::new(TokioChild {
            child: Mutex::new(Some(child)),
            pid,
            stdin: request.stdin,
            timeout: request.timeout,
            cancel: request.cancel,
            task_id: request.task_id,
            started_at: SystemTime::now(),
        }))
    }
}

#[derive(Debug)]
struct TokioChild {
    child: Mutex<Option<Child>>,
    pid: Option<u32>,
    stdin: Option<Vec<u8>>,
    timeout: Option<Duration>,
    cancel: CancelToken,
    task_id: Option<TaskId>,
    started_at: SystemTime,
}

impl RunningChild for TokioChild {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn kill(&self) {
        signal_group(self.pid, libc::SIGKILL);
    }

    fn wait(self: Box<Self>) -> WaitFuture {
        let child = self.child.into_inner().ok().flatten();
        let pid = self.pid;
        let stdin = self.stdin;
        let timeout = self.timeout;
        let cancel = self.cancel;
        let task_id = self.task_id;
        let started_at = self.started_at;

        Box::pin(async move {
            let mut child = child.ok_or_else(|| {
                CoreError::internal("child process handle already consumed")
            })?;

            if let (Some(bytes), Some(mut handle)) = (stdin, child.stdin.take()) {
                tokio::spawn(async move {
                    let _ = handle.write_all(&bytes).await;
                    let _ = handle.shutdown().await;
                });
            }

            let stdout_reader = capture_stream(child.stdout.take());
            let stderr_reader = capture_stream(child.stderr.take());

            let wait_failed = |error: std::io::Error| {
                CoreError::process_failure(format!("failed to wait for child: {error}"))
            };

            let first_wait = {
                let timeout_gate = async {
                    match timeout {
                        Some(duration) => tokio::time::sleep(duration).await,
                        None => pending::<()>().await,
                    }
                };
                tokio::select! {
                    status = child.wait() => FirstWait::Ended(status.map_err(wait_failed)?),
                    _ = timeout_gate => FirstWait::TimedOut,
                    _ = cancel.cancelled() => FirstWait::Cancelled,
                }
            };

            let (status, terminated_by) = match first_wait {
                FirstWait::Ended(status) => {
                    let ended_by = if status.code().is_some() {
                        TerminatedBy::Exited
                    } else {
                        TerminatedBy::Killed
                    };
                    (Some(status), ended_by)
                }
                FirstWait::TimedOut | FirstWait::Cancelled => {
                    signal_group(pid, libc::SIGTERM);
                    let status = match tokio::time::timeout(TERM_GRACE, child.wait()).await {
                        Ok(result) => Some(result.map_err(wait_failed)?),
                        Err(_) => {
                            signal_group(pid, libc::SIGKILL);
                            tokio::time::timeout(Duration::from_secs(1), child.wait())
                                .await
                                .ok()
                                .transpose()
                                .map_err(wait_failed)?
                        }
                    };
                    let reason = if matches!(first_wait, FirstWait::TimedOut) {
                        TerminatedBy::TimedOut
                    } else {
                        TerminatedBy::Cancelled
                    };
                    (status, reason)
                }
            };

            // Readers get a short window after exit so descendants holding the
            // pipe open cannot stall the wait forever.
            let (stdout, stdout_truncated) = finish_capture(stdout_reader).await;
            let (stderr, stderr_truncated) = finish_capture(stderr_reader).await;

            let exit_code = status.and_then(|status| status.code());
            if let Some(task_id) = task_id {
                output_ledger::record_outcome(
                    task_id,
                    &stdout,
                    &stderr,
                    stdout_truncated,
                    stderr_truncated,
                    exit_code,
                );
            }

            Ok(ExecOutput {
                exit_code,
                stdout,
                stderr,
                stdout_truncated,
                stderr_truncated,
                terminated_by,
                started_at,
                finished_at: SystemTime::now(),
            })
        })
    }
}

#[derive(Clone, Copy, Debug)]
enum FirstWait {
    Ended(std::process::ExitStatus),
    TimedOut,
    Cancelled,
}

fn capture_stream<R>(stream: Option<R>) -> JoinHandle<(Vec<u8>, bool)>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        let mut truncated = false;
        let Some(mut stream) = stream else {
            return (buffer, truncated);
        };
        let mut chunk = vec![0_u8; 4096];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(read) => {
                    buffer.extend_from_slice(&chunk[..read]);
                    if buffer.len() > STREAM_CAP_BYTES {
                        let excess = buffer.len() - STREAM_CAP_BYTES;
                        buffer.drain(..excess);
                        truncated = true;
                    }
                }
                Err(_) => break,
            }
        }
        (buffer, truncated)
    })
}

async fn finish_capture(reader: JoinHandle<(Vec<u8>, bool)>) -> (Vec<u8>, bool) {
    match tokio::time::timeout(Duration::from_millis(250), reader).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => (Vec::new(), false),
        Err(_) => (Vec::new(), false),
    }
}

fn signal_group(pid: Option<u32>, signal: i32) {
    let Some(pid) = pid else {
        return;
    };
    let pgid = -(pid as libc::pid_t);
    unsafe {
        libc::kill(pgid, signal);
    }
}
