//! External process execution with a bounded wait
//!
//! Collaborators (geometry parser, tag generator) are launched through
//! `std::process::Command` with arguments passed verbatim, never through a shell.

use std::ffi::OsStr;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::core::cancel::CancelFlag;

/// Poll interval while waiting on a child process
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of a finished external command
#[derive(Debug)]
pub struct ProcessOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
}

/// Errors that can occur while running an external command
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("program '{program}' not found")]
    ProgramNotFound { program: String },

    #[error("'{program}' did not finish within {secs}s")]
    TimedOut { program: String, secs: u64 },

    #[error("'{program}' was cancelled")]
    Cancelled { program: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Run `program args...`, killing it if it exceeds `timeout` or `cancel` fires
pub fn run_with_timeout<I, S>(
    program: &str,
    args: I,
    timeout: Duration,
    cancel: Option<&CancelFlag>,
) -> Result<ProcessOutput, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::ProgramNotFound {
                    program: program.to_string(),
                }
            } else {
                ProcessError::IoError(e)
            }
        })?;

    // Drain the pipes on helper threads so a chatty child can't fill them and stall
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if cancel.is_some_and(|c| c.is_cancelled()) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProcessError::Cancelled {
                program: program.to_string(),
            });
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProcessError::TimedOut {
                program: program.to_string(),
                secs: timeout.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(ProcessOutput {
        success: status.success(),
        stdout: join_reader(stdout_reader),
        stderr: join_reader(stderr_reader),
        code: status.code(),
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(reader: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_stdout_and_status() {
        let out = run_with_timeout("sh", ["-c", "echo hello; exit 3"], Duration::from_secs(5), None)
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_missing_program() {
        let err = run_with_timeout(
            "cadventory-no-such-program",
            Vec::<String>::new(),
            Duration::from_secs(1),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ProcessError::ProgramNotFound { .. }));
    }

    #[test]
    fn test_timeout_kills_child() {
        let err = run_with_timeout("sh", ["-c", "sleep 5"], Duration::from_millis(100), None)
            .unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }));
    }

    #[test]
    fn test_cancel_kills_child() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = run_with_timeout("sh", ["-c", "sleep 5"], Duration::from_secs(10), Some(&cancel))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled { .. }));
    }
}
