use bringup_schema::{Elevation, Target};
use std::fmt;

/// Single-quote a word for POSIX sh: `'` becomes `'\''`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || !s.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(b, b'_' | b'-' | b'.' | b'/' | b':' | b'=' | b'@' | b',' | b'+')
        })
}

fn quote_word(s: &str) -> String {
    if needs_quoting(s) {
        shell_quote(s)
    } else {
        s.to_owned()
    }
}

/// A command with typed arguments. It only becomes a shell string inside an
/// executor, via [`RemoteCommand::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    program: String,
    args: Vec<String>,
    privileged: bool,
    stdin: Option<String>,
    secret_stdin: bool,
}

impl RemoteCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            privileged: false,
            stdin: None,
            secret_stdin: false,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Mark the command as needing root on the Target; it is elevated on render.
    #[must_use]
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    #[must_use]
    pub fn stdin(mut self, data: impl Into<String>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    /// Like [`stdin`](Self::stdin), but the data never shows up in logs.
    #[must_use]
    pub fn secret_stdin(mut self, data: impl Into<String>) -> Self {
        self.stdin = Some(data.into());
        self.secret_stdin = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    pub fn stdin_data(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.program.trim().is_empty()
    }

    /// Render for `sh -c` on the Target.
    pub fn render(&self, elevation: Elevation) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 4);
        if self.privileged && elevation == Elevation::Sudo {
            words.extend(["sudo", "-S", "-p", "''"].map(str::to_owned));
        }
        words.push(quote_word(&self.program));
        words.extend(self.args.iter().map(|a| quote_word(a)));
        words.join(" ")
    }

    /// Data to write on stdin. With sudo elevation the account password
    /// comes first, for `sudo -S`.
    pub fn stdin_for(&self, target: &Target) -> Option<String> {
        let sudo_password = if self.privileged && target.elevation == Elevation::Sudo {
            target.credentials.password()
        } else {
            None
        };
        match (sudo_password, &self.stdin) {
            (None, None) => None,
            (Some(pw), None) => Some(format!("{pw}\n")),
            (None, Some(data)) => Some(data.clone()),
            (Some(pw), Some(data)) => Some(format!("{pw}\n{data}")),
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(Elevation::None))?;
        match (&self.stdin, self.secret_stdin) {
            (Some(_), true) => f.write_str(" <<< <redacted>"),
            (Some(data), false) => write!(f, " <<< {}", shell_quote(data.trim_end())),
            (None, _) => Ok(()),
        }
    }
}

/// Captured result of one command. Non-zero exit codes are data, not errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Short description for error messages: stderr, else stdout.
    pub fn summary(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        format!("exit {}: {}", self.exit_code, text)
    }
}
