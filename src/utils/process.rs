// Tue Jan 13 2026 - Alex

use std::ffi::OsStr;
use std::io;
use std::process::{Command, ExitStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{command}' failed ({status}): {stderr}")]
    NonZeroExit {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
}

impl CommandError {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::NonZeroExit { status, .. } => status.code(),
            CommandError::Launch { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines()
    }
}

/// Runs `program` to completion and captures its output. A non-zero exit is
/// an error carrying the captured stderr.
pub fn run_command<I, S>(program: &str, args: I) -> Result<CommandOutput, CommandError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args);

    let display = format!("{:?}", command);
    log::debug!("running {}", display);

    let output = command.output().map_err(|source| CommandError::Launch {
        program: program.to_string(),
        source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(CommandError::NonZeroExit {
            command: display,
            status: output.status,
            stderr: stderr.trim_end().to_string(),
        });
    }

    Ok(CommandOutput {
        status: output.status,
        stdout,
        stderr,
    })
}

/// Runs a command line through the platform shell.
pub fn run_shell(command_line: &str) -> Result<CommandOutput, CommandError> {
    #[cfg(windows)]
    {
        run_command("cmd", ["/C", command_line])
    }
    #[cfg(not(windows))]
    {
        run_command("sh", ["-c", command_line])
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_shell_captures_lines() {
        let output = run_shell("echo first; echo second").unwrap();
        assert!(output.status.success());
        assert_eq!(output.lines().collect::<Vec<_>>(), vec!["first", "second"]);
    }

    #[test]
    fn test_non_zero_exit_carries_stderr() {
        let err = run_shell("echo broken >&2; exit 3").unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
        match err {
            CommandError::NonZeroExit { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_program() {
        let err = run_command("taskflow-no-such-program", ["x"]).unwrap_err();
        assert!(matches!(err, CommandError::Launch { .. }));
        assert_eq!(err.exit_code(), None);
    }

    #[test]
    fn test_run_command_with_args() {
        let output = run_command("printf", ["%s-%s", "a", "b"]).unwrap();
        assert_eq!(output.stdout, "a-b");
    }
}
