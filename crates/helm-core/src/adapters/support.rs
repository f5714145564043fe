//! Helpers shared by adapter implementations: input validation, stdout
//! collection with typed failures, and executable discovery.

use std::path::PathBuf;

use crate::exec::{CommandLine, ExecRequest, ProcessRunner, TerminatedBy, run_to_end};
use crate::models::{CoreError, CoreResult, ManagerId, Operation};

const MAX_PACKAGE_NAME_LEN: usize = 256;
const STDERR_DIGEST_LEN: usize = 400;

pub fn validate_package_name(
    manager: ManagerId,
    operation: Operation,
    name: &str,
) -> CoreResult<()> {
    let reject = |message: &str| {
        Err(CoreError::invalid_input(message)
            .for_manager(manager)
            .for_operation(operation))
    };

    let trimmed = name.trim();
    if trimmed.is_empty() {
        return reject("package name cannot be empty");
    }
    if trimmed.starts_with('-') {
        return reject("package name cannot start with '-'");
    }
    if trimmed.chars().any(char::is_whitespace) {
        return reject("package name cannot contain whitespace");
    }
    if trimmed.contains('\0') {
        return reject("package name cannot contain NUL bytes");
    }
    if trimmed.len() > MAX_PACKAGE_NAME_LEN {
        return reject("package name exceeds 256 characters");
    }
    Ok(())
}

pub fn validate_version(manager: ManagerId, operation: Operation, version: &str) -> CoreResult<()> {
    let reject = |message: &str| {
        Err(CoreError::invalid_input(message)
            .for_manager(manager)
            .for_operation(operation))
    };

    let trimmed = version.trim();
    if trimmed.is_empty() {
        return reject("version cannot be empty");
    }
    if trimmed.starts_with('-') {
        return reject("version cannot start with '-'");
    }
    if trimmed.chars().any(char::is_whitespace) || trimmed.contains('\0') {
        return reject("version contains unsafe characters");
    }
    Ok(())
}

/// Run a command and return its stdout as UTF-8, treating exit code 0 as the
/// only success.
pub fn run_for_stdout(runner: &dyn ProcessRunner, request: ExecRequest) -> CoreResult<String> {
    run_for_stdout_accepting(runner, request, &[0])
}

/// Run a command and return its stdout as UTF-8. `accepted_codes` lists exit
/// codes treated as success — some managers signal "work to do" with a
/// non-zero code (`npm outdated` exits 1 when anything is outdated).
pub fn run_for_stdout_accepting(
    runner: &dyn ProcessRunner,
    request: ExecRequest,
    accepted_codes: &[i32],
) -> CoreResult<String> {
    let manager = request.manager;
    let task_type = request.task_type;
    let operation = request.operation;
    let attribute =
        move |error: CoreError| error.attributed(manager, task_type, operation);

    let output = run_to_end(runner, request)?;

    match output.terminated_by {
        TerminatedBy::TimedOut => {
            return Err(attribute(CoreError::timeout("process timed out")));
        }
        TerminatedBy::Cancelled => {
            return Err(attribute(CoreError::cancelled("process cancelled")));
        }
        TerminatedBy::Killed => {
            return Err(attribute(CoreError::process_failure(
                "process terminated by signal",
            )));
        }
        TerminatedBy::Exited => {}
    }

    match output.exit_code {
        Some(code) if accepted_codes.contains(&code) => String::from_utf8(output.stdout)
            .map_err(|error| {
                attribute(CoreError::new(
                    crate::models::ErrorKind::ParseFailure,
                    format!("process stdout is not valid UTF-8: {error}"),
                ))
            }),
        Some(code) => Err(attribute(CoreError::process_failure(format!(
            "process exited with code {code}: {}",
            stderr_digest(&output.stderr)
        )))),
        None => Err(attribute(CoreError::process_failure(
            "process ended without an exit code",
        ))),
    }
}

/// Short, single-line stderr excerpt for error messages. Raw subprocess text
/// never crosses the boundary; this only feeds internal attribution.
pub fn stderr_digest(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let flattened: String = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" | ");
    if flattened.len() > STDERR_DIGEST_LEN {
        let mut cut = STDERR_DIGEST_LEN;
        while !flattened.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &flattened[..cut])
    } else {
        flattened
    }
}

/// Locate a manager binary with `which` under an augmented PATH, falling back
/// to a scan of the usual install roots. Detection probes only; execution
/// relies on PATH at spawn time.
pub fn which_executable(
    runner: &dyn ProcessRunner,
    manager: ManagerId,
    binary_name: &str,
    extra_paths: &[&str],
) -> Option<PathBuf> {
    let system_path = "/usr/bin:/bin:/usr/sbin:/sbin";
    let path = if extra_paths.is_empty() {
        system_path.to_string()
    } else {
        format!("{}:{system_path}", extra_paths.join(":"))
    };

    let request = ExecRequest::new(
        manager,
        Operation::Detect,
        CommandLine::new("/usr/bin/which").arg(binary_name),
    )
    .env("PATH", path)
    .timeout(std::time::Duration::from_secs(10));

    if let Ok(stdout) = run_for_stdout(runner, request) {
        let trimmed = stdout.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    scan_install_roots(binary_name, extra_paths)
}

fn scan_install_roots(binary_name: &str, extra_paths: &[&str]) -> Option<PathBuf> {
    if binary_name.trim().is_empty() {
        return None;
    }
    if binary_name.contains('/') {
        let absolute = PathBuf::from(binary_name);
        return absolute.is_file().then_some(absolute);
    }

    let mut roots: Vec<PathBuf> = extra_paths.iter().map(PathBuf::from).collect();
    roots.extend(
        [
            "/opt/homebrew/bin",
            "/usr/local/bin",
            "/opt/local/bin",
            "/usr/bin",
            "/bin",
            "/usr/sbin",
            "/sbin",
        ]
        .into_iter()
        .map(PathBuf::from),
    );
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        roots.push(home.join(".local/bin"));
        roots.push(home.join(".cargo/bin"));
    }

    roots
        .into_iter()
        .map(|root| root.join(binary_name))
        .find(|candidate| candidate.is_file())
}

/// First non-empty trimmed line of a probe output.
pub fn first_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|line| !line.is_empty())
}

/// PATH for spawned manager commands. Hosts launched from a login item or an
/// XPC-like context carry a stripped PATH, so the usual install prefixes are
/// prepended explicitly.
pub fn augmented_path(extra_paths: &[&str]) -> String {
    let inherited = std::env::var("PATH").unwrap_or_default();
    let mut parts: Vec<String> = extra_paths.iter().map(|path| (*path).to_string()).collect();
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        parts.push(home.join(".local/bin").to_string_lossy().into_owned());
        parts.push(home.join(".cargo/bin").to_string_lossy().into_owned());
    }
    parts.push("/opt/homebrew/bin".to_string());
    parts.push("/usr/local/bin".to_string());
    if !inherited.is_empty() {
        parts.push(inherited);
    } else {
        parts.push("/usr/bin:/bin:/usr/sbin:/sbin".to_string());
    }
    parts.join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;

    #[test]
    fn package_name_validation_covers_the_reject_classes() {
        let check = |name: &str| {
            validate_package_name(ManagerId::Npm, Operation::Install, name)
        };
        assert!(check("eslint").is_ok());
        assert!(check("@types/node").is_ok());

        for bad in ["", "   ", "-g", "left pad", &"x".repeat(300)] {
            let error = check(bad).unwrap_err();
            assert_eq!(error.kind, ErrorKind::InvalidInput, "input {bad:?}");
            assert_eq!(error.manager, Some(ManagerId::Npm));
        }
    }

    #[test]
    fn version_validation_rejects_flag_like_values() {
        assert!(validate_version(ManagerId::Pip, Operation::Install, "1.2.3").is_ok());
        assert!(validate_version(ManagerId::Pip, Operation::Install, "-U").is_err());
        assert!(validate_version(ManagerId::Pip, Operation::Install, "").is_err());
    }

    #[test]
    fn stderr_digest_flattens_and_bounds() {
        let digest = stderr_digest(b"error: first\n\n  second line  \n");
        assert_eq!(digest, "error: first | second line");

        let long = "x".repeat(1000);
        let bounded = stderr_digest(long.as_bytes());
        assert!(bounded.chars().count() <= 401);
        assert!(bounded.ends_with('…'));
    }
}
