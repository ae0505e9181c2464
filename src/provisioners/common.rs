/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/common.rs
 * Shared helpers for driving external CLIs: a streaming runner for
 * long-running commands, a capturing runner for queries, and a bounded
 * polling loop for readiness waits.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::error::{Error, Result};
use std::future::Future;
use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::debug;

/// How many trailing stderr lines a failure message keeps.
const STDERR_TAIL: usize = 20;

/// Interval between readiness checks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn into_error(self, command: &Command) -> Error {
        Error::CommandFailed {
            command: describe(command),
            status: self.status.to_string(),
            stderr: self.stderr.trim().to_string(),
        }
    }
}

/// Renders a command line for logs and error messages.
pub fn describe(command: &Command) -> String {
    let inner = command.as_std();
    std::iter::once(inner.get_program().to_string_lossy().into_owned())
        .chain(inner.get_args().map(|a| a.to_string_lossy().into_owned()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Executes a command, streams its output to stdout/stderr, and waits for completion.
pub async fn execute_command(command: &mut Command) -> Result<()> {
    let line = describe(command);
    debug!("Running {}", line);

    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|source| Error::Spawn {
        command: line.clone(),
        source,
    })?;

    let stdout = child.stdout.take().ok_or_else(|| {
        Error::Io(std::io::Error::other("child process did not have a handle to stdout"))
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        Error::Io(std::io::Error::other("child process did not have a handle to stderr"))
    })?;

    let mut stdout_reader = BufReader::new(stdout).lines();
    let mut stderr_reader = BufReader::new(stderr).lines();
    let (mut stdout_open, mut stderr_open) = (true, true);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);

    while stdout_open || stderr_open {
        tokio::select! {
            line = stdout_reader.next_line(), if stdout_open => match line? {
                Some(line) => println!("{}", line),
                None => stdout_open = false,
            },
            line = stderr_reader.next_line(), if stderr_open => match line? {
                Some(line) => {
                    eprintln!("{}", line);
                    if tail.len() == STDERR_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                None => stderr_open = false,
            },
        }
    }

    let status = child.wait().await?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::CommandFailed {
            command: line,
            status: status.to_string(),
            stderr: Vec::from(tail).join("\n"),
        })
    }
}

/// Runs a command to completion and captures its output without judging the exit status.
pub async fn capture_command(command: &mut Command) -> Result<CommandOutput> {
    let line = describe(command);
    debug!("Running {}", line);

    let output = command
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| Error::Spawn {
            command: line,
            source,
        })?;

    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Runs a command and returns its stdout, failing on a non-zero exit.
pub async fn run_captured(command: &mut Command) -> Result<String> {
    let output = capture_command(command).await?;
    if output.success() {
        Ok(output.stdout)
    } else {
        Err(output.into_error(command))
    }
}

/// Whether a CLI error message carries one of the tool's own markers for a
/// missing target. Markers are matched verbatim, never by loose keywords.
pub fn reports_missing(stderr: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| stderr.contains(marker))
}

/// Outcome of a removal command: success, `NotFound` when stderr carries one
/// of `markers`, or the command failure itself.
pub fn removal_outcome(
    output: CommandOutput,
    command: &Command,
    kind: &str,
    name: &str,
    markers: &[&str],
) -> Result<()> {
    if output.success() {
        Ok(())
    } else if reports_missing(&output.stderr, markers) {
        Err(Error::not_found(kind, name))
    } else {
        Err(output.into_error(command))
    }
}

/// Polls `check` until it reports true or `timeout` elapses.
pub async fn wait_until<F, Fut>(what: &str, timeout: Duration, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check().await? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::Timeout {
                what: what.to_string(),
                after: timeout,
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_describe_command_line() {
        let mut command = Command::new("helm");
        command.args(["status", "arc", "-n", "arc-systems"]);
        assert_eq!(describe(&command), "helm status arc -n arc-systems");
    }

    #[test]
    fn test_missing_markers_match_verbatim() {
        let markers = ["release: not found"];
        assert!(reports_missing("Error: uninstall: Release not loaded: arc: release: not found", &markers));
        assert!(!reports_missing(
            "Error: Kubernetes cluster unreachable: dial tcp: lookup k3d-arc-cluster: no such host",
            &markers
        ));
        assert!(!reports_missing("open /root/.kube/config: no such file or directory", &markers));
        assert!(!reports_missing("permission denied", &markers));
    }

    fn failing(stderr: &str) -> Command {
        let mut command = Command::new("sh");
        command.args(["-c", &format!("echo '{}' >&2; exit 1", stderr)]);
        command
    }

    #[tokio::test]
    async fn test_removal_of_missing_target_is_not_found() {
        let mut command = failing("Error: uninstall: Release not loaded: arc: release: not found");
        let output = capture_command(&mut command).await.unwrap();
        let err = removal_outcome(output, &command, "helm release", "arc", &["release: not found"])
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_not_mistaken_for_absence() {
        let mut command =
            failing("Error: Kubernetes cluster unreachable: lookup k3d-arc-cluster: no such host");
        let output = capture_command(&mut command).await.unwrap();
        let err = removal_outcome(output, &command, "helm release", "arc", &["release: not found"])
            .unwrap_err();
        assert!(!err.is_not_found());
        assert!(matches!(err, Error::CommandFailed { .. }));
        assert!(err.to_string().contains("no such host"));
    }

    #[tokio::test]
    async fn test_execute_command_keeps_only_the_stderr_tail() {
        let mut command = Command::new("sh");
        command.args(["-c", "for i in $(seq 1 30); do echo line$i >&2; done; exit 1"]);
        match execute_command(&mut command).await {
            Err(Error::CommandFailed { stderr, .. }) => {
                let lines: Vec<&str> = stderr.lines().collect();
                assert_eq!(lines.len(), STDERR_TAIL);
                assert_eq!(lines.first(), Some(&"line11"));
                assert_eq!(lines.last(), Some(&"line30"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_succeeds_after_retries() {
        let counter = AtomicU32::new(0);
        let polls = &counter;
        wait_until("three polls", Duration::from_secs(60), || async move {
            Ok::<_, Error>(polls.fetch_add(1, Ordering::SeqCst) >= 2)
        })
        .await
        .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_times_out() {
        let err = wait_until("never", Duration::from_secs(10), || async { Ok::<_, Error>(false) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(err.to_string().contains("never"));
    }

    #[tokio::test]
    async fn test_capture_reports_failure_without_erroring() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo out; echo oops >&2; exit 3"]);
        let output = capture_command(&mut command).await.unwrap();
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_execute_command_surfaces_stderr_tail() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo progress; echo boom >&2; exit 1"]);
        match execute_command(&mut command).await {
            Err(Error::CommandFailed { stderr, .. }) => assert_eq!(stderr, "boom"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_names_the_program() {
        let mut command = Command::new("definitely-not-a-real-binary");
        let err = run_captured(&mut command).await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
