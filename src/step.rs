use std::path::PathBuf;

use crate::process::CommandSpec;

/// One unit of work inside a task. Steps run in order and the first failure
/// ends the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Spawn a process; succeeds on exit status zero.
    Exec(CommandSpec),
    /// Ask the toolchain for its install root and remember it for later steps.
    QuerySysroot(CommandSpec),
    /// Write `rust-project.json` using the sysroot captured earlier.
    WriteProjectFile { dest: PathBuf },
    /// Copy a source tree into the staging directory.
    Stage { from: PathBuf, to: PathBuf },
    EnsureDir { dir: PathBuf },
    /// Empty each directory. Missing directories are already clean.
    Clean { dirs: Vec<PathBuf> },
    /// Boot the image with the emulator named in the run configuration.
    Emulate { config: PathBuf },
}

impl Step {
    pub fn description(&self) -> String {
        match self {
            Step::Exec(command) => format!("Run: {command}"),
            Step::QuerySysroot(command) => format!("Query sysroot: {command}"),
            Step::WriteProjectFile { dest } => format!("Write {}", dest.display()),
            Step::Stage { from, to } => {
                format!("Stage {} into {}", from.display(), to.display())
            }
            Step::EnsureDir { dir } => format!("Create {}", dir.display()),
            Step::Clean { dirs } => {
                let dirs: Vec<String> = dirs.iter().map(|d| d.display().to_string()).collect();
                format!("Clean {}", dirs.join(", "))
            }
            Step::Emulate { config } => format!("Emulate using {}", config.display()),
        }
    }

    /// Whether the step spawns an external process.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Step::Exec(_) | Step::QuerySysroot(_) | Step::Emulate { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::Step;
    use crate::process::CommandSpec;

    #[test]
    fn describes_commands_with_arguments() {
        let step = Step::QuerySysroot(CommandSpec::new("rustc").args(["--print", "sysroot"]));
        assert_eq!(step.description(), "Query sysroot: rustc --print sysroot");
        assert!(step.is_external());
    }

    #[test]
    fn describes_clean_targets() {
        let step = Step::Clean {
            dirs: vec![PathBuf::from("build/src"), PathBuf::from("build/bin")],
        };
        assert_eq!(step.description(), "Clean build/src, build/bin");
        assert!(!step.is_external());
    }
}
