use std::fmt;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;
use which::which;

/// A program and its discrete arguments. Never interpreted by a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub outcome: ExitOutcome,
    pub stdout: String,
}

/// Spawns external processes on behalf of task steps.
///
/// Both methods block until the child exits. `cwd` is the project root.
pub trait CommandRunner {
    /// Run with inherited stdio and report the exit status.
    fn status(&mut self, command: &CommandSpec, cwd: &Path) -> io::Result<ExitOutcome>;

    /// Run with stdout captured; stderr stays attached to the terminal.
    fn output(&mut self, command: &CommandSpec, cwd: &Path) -> io::Result<CapturedOutput>;
}

/// Runs commands on the host with `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn prepare(command: &CommandSpec, cwd: &Path) -> io::Result<Command> {
        let program = which(&command.program).map_err(|err| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found: {err}", command.program),
            )
        })?;
        debug!(program = %program.display(), args = ?command.args, "spawning");

        let mut cmd = Command::new(program);
        cmd.args(&command.args).current_dir(cwd);
        Ok(cmd)
    }
}

impl CommandRunner for SystemRunner {
    fn status(&mut self, command: &CommandSpec, cwd: &Path) -> io::Result<ExitOutcome> {
        let status = Self::prepare(command, cwd)?.status()?;
        Ok(ExitOutcome {
            code: status.code(),
        })
    }

    fn output(&mut self, command: &CommandSpec, cwd: &Path) -> io::Result<CapturedOutput> {
        let output = Self::prepare(command, cwd)?
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()?;
        let stdout = String::from_utf8(output.stdout)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        Ok(CapturedOutput {
            outcome: ExitOutcome {
                code: output.status.code(),
            },
            stdout,
        })
    }
}
