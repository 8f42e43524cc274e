//! Bounded-time supervisor for the device monitor process.
//!
//! One call to [`supervise`] owns exactly one child process:
//!
//! 1. The monitor is spawned with stdout and stderr piped (and, on unix, as
//!    the leader of a fresh process group).
//! 2. A single reader task drains both streams as one line sequence,
//!    stopping at end-of-stream or at the end sentinel.
//! 3. The control path waits for the reader's completion message with a
//!    deadline. On expiry the reader's [`CancellationToken`] fires.
//! 4. On every path, including panics in the reader and the caller
//!    dropping the future, [`TreeGuard`] kills the monitor's whole process
//!    tree before control returns.
//!
//! The reader never shares mutable state with the control path: its result
//! travels back through a [`oneshot`] channel.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::codec::{MonitorLine, MonitorLineCodec};
use crate::capture::process_tree::kill_process_tree;
use crate::capture::protocol::{ScanState, SentinelScanner};
use crate::config::MonitorConfig;
use crate::{AppError, Result};

/// Upper bound on waiting for a cancelled reader or a killed child to wind down.
const TEARDOWN_GRACE: Duration = Duration::from_secs(2);

/// The external command that streams device output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorCommand {
    /// Binary to launch.
    pub program: String,
    /// Fixed arguments.
    pub args: Vec<String>,
    /// Working directory; inherits ours when `None`.
    pub working_dir: Option<PathBuf>,
    /// Longest accepted output line.
    pub max_line_bytes: usize,
}

impl MonitorCommand {
    /// Build a command with default framing limits.
    #[must_use]
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
            max_line_bytes: crate::capture::codec::MAX_LINE_BYTES,
        }
    }
}

impl From<&MonitorConfig> for MonitorCommand {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            program: config.command.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
            max_line_bytes: config.max_line_bytes,
        }
    }
}

/// Why a capture attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Output closed or the end sentinel arrived before the deadline.
    Completed,
    /// The deadline expired first.
    TimedOut,
    /// Spawn failure, read failure, or reader panic.
    Error(String),
}

/// Record of one supervisor invocation.
#[derive(Debug, Clone)]
pub struct CaptureAttempt {
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Deadline the attempt ran under.
    pub timeout: Duration,
    /// Terminal outcome; exactly one per attempt.
    pub reason: TerminationReason,
    /// Lines read before the attempt ended (partial on timeout).
    pub lines: Vec<String>,
    /// Monitor process id, if the spawn succeeded.
    pub pid: Option<u32>,
}

impl CaptureAttempt {
    fn failed(started_at: DateTime<Utc>, timeout: Duration, reason: String) -> Self {
        Self {
            started_at,
            timeout,
            reason: TerminationReason::Error(reason),
            lines: Vec::new(),
            pid: None,
        }
    }

    /// Collapse the attempt into the supervisor contract.
    ///
    /// # Errors
    ///
    /// - `AppError::CaptureTimeout` when the deadline expired (partial
    ///   lines are discarded).
    /// - `AppError::CaptureProcess` on spawn or read failure.
    pub fn into_lines(self) -> Result<Vec<String>> {
        match self.reason {
            TerminationReason::Completed => Ok(self.lines),
            TerminationReason::TimedOut => Err(AppError::CaptureTimeout(format!(
                "monitor produced no complete capture within {:?} ({} lines discarded)",
                self.timeout,
                self.lines.len()
            ))),
            TerminationReason::Error(msg) => Err(AppError::CaptureProcess(msg)),
        }
    }
}

/// How the reader task stopped.
#[derive(Debug)]
enum ReaderEnd {
    EndSentinel,
    Eof,
    Cancelled,
    Failed(String),
}

/// Completion message sent from the reader task to the control path.
#[derive(Debug)]
struct ReaderReport {
    end: ReaderEnd,
    lines: Vec<String>,
}

/// Kills the monitor's process tree when dropped.
///
/// Holding the guard across every await point means an early return, a
/// panic unwind, or cancellation of the enclosing future all still reap
/// the tree.
struct TreeGuard {
    pid: Option<u32>,
}

impl TreeGuard {
    fn disarm(&mut self) -> Option<u32> {
        self.pid.take()
    }
}

impl Drop for TreeGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid.take() {
            kill_process_tree(pid);
        }
    }
}

/// Run the monitor under a deadline and return its collected output.
///
/// # Errors
///
/// Returns `AppError::CaptureTimeout` if the output did not close (or reach
/// the end sentinel) within `timeout`, and `AppError::CaptureProcess` if the
/// monitor could not be spawned or read.
pub async fn run_capture(command: &MonitorCommand, timeout: Duration) -> Result<Vec<String>> {
    supervise(command, timeout).await.into_lines()
}

/// Run the monitor under a deadline and report the full attempt.
///
/// No process spawned by this call outlives it.
pub async fn supervise(command: &MonitorCommand, timeout: Duration) -> CaptureAttempt {
    let started_at = Utc::now();

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &command.working_dir {
        cmd.current_dir(dir);
    }
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(program = command.program, %err, "failed to spawn monitor");
            return CaptureAttempt::failed(
                started_at,
                timeout,
                format!("failed to spawn {}: {err}", command.program),
            );
        }
    };

    let pid = child.id();
    let mut guard = TreeGuard { pid };
    info!(pid = pid.unwrap_or(0), program = command.program, ?timeout, "monitor spawned");

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        drop(guard);
        reap(&mut child).await;
        return CaptureAttempt::failed(started_at, timeout, "failed to capture monitor output".into());
    };

    let cancel = CancellationToken::new();
    let (done_tx, mut done_rx) = oneshot::channel();
    let mut reader = tokio::spawn(read_output(
        stdout,
        stderr,
        command.max_line_bytes,
        cancel.clone(),
        done_tx,
    ));

    let (reason, lines) = match tokio::time::timeout(timeout, &mut done_rx).await {
        Ok(Ok(report)) => classify(report),
        Ok(Err(_)) => (
            TerminationReason::Error("monitor reader stopped without reporting".into()),
            Vec::new(),
        ),
        Err(_elapsed) => {
            info!(pid = pid.unwrap_or(0), ?timeout, "capture deadline reached, stopping monitor");
            cancel.cancel();
            let partial = match tokio::time::timeout(TEARDOWN_GRACE, done_rx).await {
                Ok(Ok(report)) => report.lines,
                _ => Vec::new(),
            };
            (TerminationReason::TimedOut, partial)
        }
    };

    if let Some(pid) = guard.disarm() {
        kill_process_tree(pid);
    }
    reap(&mut child).await;

    cancel.cancel();
    if tokio::time::timeout(TEARDOWN_GRACE, &mut reader).await.is_err() {
        warn!("monitor reader did not stop after teardown, aborting");
        reader.abort();
    }

    debug!(?reason, lines = lines.len(), "capture attempt finished");
    CaptureAttempt {
        started_at,
        timeout,
        reason,
        lines,
        pid,
    }
}

fn classify(report: ReaderReport) -> (TerminationReason, Vec<String>) {
    let reason = match report.end {
        ReaderEnd::EndSentinel | ReaderEnd::Eof => TerminationReason::Completed,
        ReaderEnd::Cancelled => TerminationReason::TimedOut,
        ReaderEnd::Failed(msg) => TerminationReason::Error(msg),
    };
    (reason, report.lines)
}

/// Collect the exit status of a killed child so it does not linger as a zombie.
async fn reap(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        debug!(%err, "monitor already exited");
    }
    match tokio::time::timeout(TEARDOWN_GRACE, child.wait()).await {
        Ok(Ok(status)) => debug!(%status, "monitor reaped"),
        Ok(Err(err)) => warn!(%err, "failed to reap monitor"),
        Err(_) => warn!("monitor did not exit after kill"),
    }
}

/// Reader task: drain both output streams as one line sequence.
///
/// Exits on end sentinel, on end-of-stream of both pipes, on an I/O error,
/// or when `cancel` fires, and always reports through `done_tx`.
async fn read_output<O, E>(
    stdout: O,
    stderr: E,
    max_line_bytes: usize,
    cancel: CancellationToken,
    done_tx: oneshot::Sender<ReaderReport>,
) where
    O: AsyncRead + Unpin + Send,
    E: AsyncRead + Unpin + Send,
{
    let out = FramedRead::new(stdout, MonitorLineCodec::with_max_length(max_line_bytes));
    let err = FramedRead::new(stderr, MonitorLineCodec::with_max_length(max_line_bytes));
    let mut merged = futures_util::stream::select(out, err);

    let mut scanner = SentinelScanner::new();
    let mut lines = Vec::new();

    let end = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break ReaderEnd::Cancelled,

            item = merged.next() => match item {
                None => break ReaderEnd::Eof,
                Some(Ok(MonitorLine::Line(line))) => {
                    debug!(target: "monitor", "{line}");
                    let state = scanner.feed(&line);
                    lines.push(line);
                    if state == ScanState::Complete {
                        break ReaderEnd::EndSentinel;
                    }
                }
                Some(Ok(MonitorLine::Overlong)) => {
                    warn!(max_line_bytes, "monitor line too long, skipping it");
                }
                Some(Err(e)) => break ReaderEnd::Failed(format!("failed to read monitor output: {e}")),
            },
        }
    };

    debug!(?end, scan = ?scanner.state(), lines = lines.len(), "monitor reader finished");
    if done_tx.send(ReaderReport { end, lines }).is_err() {
        debug!("capture control path went away before reader finished");
    }
}
