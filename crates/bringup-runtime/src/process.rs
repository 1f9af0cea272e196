use crate::command::ExecOutput;
use crate::ExecError;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut r) = reader {
            let _ = r.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn feed_stdin(child: &mut Child, data: Option<&str>) {
    if let Some(mut stdin) = child.stdin.take() {
        if let Some(data) = data {
            if let Err(e) = stdin.write_all(data.as_bytes()) {
                // the program may exit without reading stdin
                debug!("stdin write failed: {e}");
            }
        }
        // dropping stdin closes the pipe
    }
}

/// Run `cmd` to completion or until `timeout` elapses, capturing both
/// output streams. A timed-out child is killed and reaped.
pub fn run_with_timeout(
    mut cmd: Command,
    stdin: Option<&str>,
    timeout: Duration,
    label: &str,
) -> Result<ExecOutput, ExecError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ExecError::Spawn { program, source })?;

    // drain before feeding: the child may fill its output pipe before it reads stdin
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    feed_stdin(&mut child, stdin);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            warn!("command exceeded {}s, killing: {label}", timeout.as_secs());
            let _ = child.kill();
            let _ = child.wait();
            // grandchildren may still hold the pipes; the drain threads are left detached
            return Err(ExecError::Timeout {
                command: label.to_owned(),
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(ExecOutput {
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
        // killed by a signal: no exit code
        exit_code: status.code().unwrap_or(-1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_stderr_and_exit_code() {
        let out = run_with_timeout(
            sh("echo out; echo err >&2; exit 3"),
            None,
            Duration::from_secs(5),
            "test",
        )
        .unwrap();
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.exit_code, 3);
    }

    #[test]
    fn feeds_stdin() {
        let out = run_with_timeout(sh("cat"), Some("hello\n"), Duration::from_secs(5), "cat")
            .unwrap();
        assert_eq!(out.stdout, "hello\n");
    }

    #[test]
    fn child_flooding_stdout_before_reading_stdin_completes() {
        let input = "i".repeat(200_000);
        let out = run_with_timeout(
            sh("yes o | head -c 200000; cat"),
            Some(&input),
            Duration::from_secs(10),
            "flood",
        )
        .unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.len(), 400_000);
        assert!(out.stdout.ends_with(&input));
    }

    #[test]
    fn kills_on_timeout() {
        let started = Instant::now();
        let err = run_with_timeout(sh("sleep 5"), None, Duration::from_millis(200), "sleep")
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = run_with_timeout(
            Command::new("bringup-nonexistent-program-12345"),
            None,
            Duration::from_secs(1),
            "missing",
        )
        .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }
}
