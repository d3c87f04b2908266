use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use tracing::{debug, info};

use crate::config::load_run_config;
use crate::process::{CommandRunner, CommandSpec};
use crate::project::{ProjectDescriptor, write_descriptor};
use crate::step::Step;
use crate::tasks::Task;

#[derive(Debug)]
pub struct ExecutionResult {
    pub completed_steps: usize,
    pub total_steps: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("step {index} ({description}) failed: {message}")]
    StepFailed {
        index: usize,
        description: String,
        message: String,
    },
}

/// State shared by the steps of one task run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub root: PathBuf,
    pub sysroot: Option<String>,
}

impl ExecutionContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sysroot: None,
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        self.root.join(path)
    }
}

/// Run the steps of `task` in order. The first failure stops the task;
/// nothing after it is started and nothing before it is undone.
pub fn execute_task(
    task: &Task,
    ctx: &mut ExecutionContext,
    runner: &mut dyn CommandRunner,
) -> Result<ExecutionResult, ExecutionError> {
    info!(task = %task.name, steps = task.steps.len(), "running task");

    for (idx, step) in task.steps.iter().enumerate() {
        info!(
            external = step.is_external(),
            "==> [{}/{}] {}",
            idx + 1,
            task.steps.len(),
            step.description()
        );
        execute_step(step, ctx, runner).map_err(|err| ExecutionError::StepFailed {
            index: idx + 1,
            description: step.description(),
            message: format!("{err:#}"),
        })?;
    }

    Ok(ExecutionResult {
        completed_steps: task.steps.len(),
        total_steps: task.steps.len(),
    })
}

fn execute_step(
    step: &Step,
    ctx: &mut ExecutionContext,
    runner: &mut dyn CommandRunner,
) -> anyhow::Result<()> {
    match step {
        Step::Exec(command) => run_command(command, ctx, runner),
        Step::QuerySysroot(command) => {
            let sysroot = query_sysroot(command, ctx, runner)?;
            debug!(%sysroot, "captured sysroot");
            ctx.sysroot = Some(sysroot);
            Ok(())
        }
        Step::WriteProjectFile { dest } => {
            let sysroot = ctx
                .sysroot
                .as_deref()
                .ok_or_else(|| anyhow!("no sysroot captured before writing {}", dest.display()))?;
            write_descriptor(&ctx.resolve(dest), &ProjectDescriptor::new(sysroot))
        }
        Step::Stage { from, to } => stage_tree(&ctx.resolve(from), &ctx.resolve(to)),
        Step::EnsureDir { dir } => {
            let dir = ctx.resolve(dir);
            fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))
        }
        Step::Clean { dirs } => {
            for dir in dirs {
                clean_dir(&ctx.resolve(dir))?;
            }
            Ok(())
        }
        Step::Emulate { config } => {
            let config = load_run_config(&ctx.resolve(config))?;
            run_command(&config.emulator_command(), ctx, runner)
        }
    }
}

fn run_command(
    command: &CommandSpec,
    ctx: &ExecutionContext,
    runner: &mut dyn CommandRunner,
) -> anyhow::Result<()> {
    let outcome = runner
        .status(command, &ctx.root)
        .with_context(|| format!("running {command}"))?;

    if !outcome.success() {
        bail!("{} exited with status {:?}", command.program, outcome.code);
    }

    Ok(())
}

fn query_sysroot(
    command: &CommandSpec,
    ctx: &ExecutionContext,
    runner: &mut dyn CommandRunner,
) -> anyhow::Result<String> {
    let output = runner
        .output(command, &ctx.root)
        .with_context(|| format!("running {command}"))?;

    if !output.outcome.success() {
        bail!(
            "{} exited with status {:?}",
            command.program,
            output.outcome.code
        );
    }

    parse_sysroot(&output.stdout)
}

/// Strip one trailing line terminator and insist on a single non-empty line.
fn parse_sysroot(raw: &str) -> anyhow::Result<String> {
    let line = match raw.strip_suffix('\n') {
        Some(line) => line.strip_suffix('\r').unwrap_or(line),
        None => raw,
    };

    if line.trim().is_empty() {
        bail!("toolchain reported an empty sysroot");
    }

    if line.contains(['\n', '\r']) {
        bail!("unexpected multi-line sysroot output: {line:?}");
    }

    Ok(line.to_string())
}

fn stage_tree(from: &Path, to: &Path) -> anyhow::Result<()> {
    if !from.is_dir() {
        bail!("source directory {} does not exist", from.display());
    }

    fs::create_dir_all(to).with_context(|| format!("creating {}", to.display()))?;

    for entry in fs::read_dir(from).with_context(|| format!("reading {}", from.display()))? {
        let entry = entry?;
        let source = entry.path();
        let target = to.join(entry.file_name());

        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            stage_link(&source, &target)?;
        } else if file_type.is_dir() {
            stage_tree(&source, &target)?;
        } else {
            fs::copy(&source, &target).with_context(|| {
                format!("copying {} to {}", source.display(), target.display())
            })?;
        }
    }

    Ok(())
}

/// Recreate the link itself, like `cp -R` does.
#[cfg(unix)]
fn stage_link(source: &Path, target: &Path) -> anyhow::Result<()> {
    let link =
        fs::read_link(source).with_context(|| format!("reading link {}", source.display()))?;

    if let Ok(existing) = fs::symlink_metadata(target) {
        let removed = if existing.is_dir() {
            fs::remove_dir_all(target)
        } else {
            fs::remove_file(target)
        };
        removed.with_context(|| format!("replacing {}", target.display()))?;
    }

    std::os::unix::fs::symlink(&link, target)
        .with_context(|| format!("linking {} to {}", target.display(), link.display()))
}

#[cfg(not(unix))]
fn stage_link(source: &Path, target: &Path) -> anyhow::Result<()> {
    let metadata =
        fs::metadata(source).with_context(|| format!("following link {}", source.display()))?;
    if metadata.is_dir() {
        return stage_tree(source, target);
    }
    fs::copy(source, target)
        .with_context(|| format!("copying {} to {}", source.display(), target.display()))?;
    Ok(())
}

fn clean_dir(dir: &Path) -> anyhow::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "nothing to clean");
            return Ok(());
        }
        Err(err) => return Err(err).with_context(|| format!("reading {}", dir.display())),
    };

    for entry in entries {
        let path = entry?.path();
        let removed = if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.with_context(|| format!("removing {}", path.display()))?;
    }

    Ok(())
}
