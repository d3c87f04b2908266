use std::ffi::{OsStr, OsString};
use std::path::Path;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::executor::{ExecutionContext, execute_task};
use crate::process::{CommandRunner, SystemRunner};
use crate::tasks::{Layout, Registry, TaskName};

pub const NO_ARGUMENTS: &str = "No arguments specified, please use the Makefile";
pub const UNKNOWN_ARGUMENT: &str = "Unknown argument, please use the Makefile";
pub const STEP_FAILED: &str = "An error occurred, aborting";

/// Build helper for the Primoria kernel.
///
/// clap's own help and version flags are off: `help` is a task, and every
/// token after the task name is accepted and ignored.
#[derive(Debug, Parser)]
#[command(
    name = "primoria-build",
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct Cli {
    /// Task to run
    #[arg(allow_hyphen_values = true)]
    task: Option<String>,
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

/// Parse `args` (program name first), run the selected task and return the
/// process exit code.
pub fn dispatch<I, T>(args: I, root: &Path, runner: &mut dyn CommandRunner) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let first = args.get(1).cloned();

    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(err) => {
            debug!(error = %err, "rejected command line");
            println!("{UNKNOWN_ARGUMENT}");
            return 1;
        }
    };

    // clap swallows a leading `--`; the task name is the first raw token.
    let literal = match (&first, &cli.task) {
        (Some(raw), Some(name)) => raw.as_os_str() == OsStr::new(name),
        (None, None) => true,
        _ => false,
    };
    if !literal {
        debug!(first = ?first, "first argument is not a task name");
        println!("{UNKNOWN_ARGUMENT}");
        return 1;
    }

    let Some(name) = cli.task else {
        println!("{NO_ARGUMENTS}");
        return 1;
    };

    if !cli.rest.is_empty() {
        debug!(ignored = ?cli.rest, "ignoring arguments after the task name");
    }

    let registry = Registry::standard(&Layout::default());
    let Some(task) = registry.lookup(&name) else {
        warn!(task = %name, "unknown task");
        println!("{UNKNOWN_ARGUMENT}");
        return 1;
    };

    if task.name == TaskName::Help {
        print_tasks(&registry);
    }

    let mut ctx = ExecutionContext::new(root);
    match execute_task(task, &mut ctx, runner) {
        Ok(result) => {
            info!(task = %task.name, steps = result.completed_steps, "task finished");
            0
        }
        Err(err) => {
            error!(task = %task.name, error = %err, "task failed");
            println!("{STEP_FAILED}");
            1
        }
    }
}

fn print_tasks(registry: &Registry) {
    println!("usage: primoria-build <task>");
    println!();
    for task in registry.tasks() {
        println!("    {:<8}{}", task.name.as_str(), task.summary);
    }
}

pub fn run() -> i32 {
    init_logging();

    let root = match std::env::current_dir() {
        Ok(root) => root,
        Err(err) => {
            error!(error = %err, "cannot determine project root");
            println!("{STEP_FAILED}");
            return 1;
        }
    };

    dispatch(std::env::args_os(), &root, &mut SystemRunner)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::dispatch;
    use crate::process::CommandSpec;
    use crate::process::spy::SpyRunner;

    const EXPECTED_DESCRIPTOR: &str = r#"{
    "crates": [
        {
            "cfg": [],
            "deps": [],
            "edition": "2021",
            "env": {},
            "is_proc_macro": false,
            "root_module": "src/main.rs"
        }
    ],
    "sysroot": "/opt/toolchain"
}"#;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "#![no_std]\n").unwrap();
        dir
    }

    #[test]
    fn missing_task_is_usage_error() {
        let dir = project();
        let mut runner = SpyRunner::default();
        assert_eq!(dispatch(["primoria-build"], dir.path(), &mut runner), 1);
        assert_eq!(dispatch(Vec::<String>::new(), dir.path(), &mut runner), 1);
        assert!(runner.calls.is_empty());
    }

    #[test]
    fn unknown_tasks_spawn_nothing() {
        let dir = project();
        for name in ["install", "BUILD", "", "--help", "-v", "build ", "--"] {
            let mut runner = SpyRunner::default();
            assert_eq!(
                dispatch(["primoria-build", name], dir.path(), &mut runner),
                1,
                "{name:?} should be rejected"
            );
            assert!(runner.calls.is_empty(), "{name:?} spawned a process");
        }
    }

    #[test]
    fn separator_before_task_is_not_skipped() {
        let dir = project();
        fs::create_dir_all(dir.path().join("build/src")).unwrap();
        fs::write(dir.path().join("build/src/main.rs"), "").unwrap();

        for args in [
            vec!["primoria-build", "--", "clean"],
            vec!["primoria-build", "--", "--", "clean"],
            vec!["primoria-build", "--"],
        ] {
            let mut runner = SpyRunner::with_stdout("/opt/toolchain\n");
            assert_eq!(dispatch(&args, dir.path(), &mut runner), 1, "{args:?}");
            assert!(runner.calls.is_empty());
        }
        assert!(dir.path().join("build/src/main.rs").exists());
    }

    #[test]
    fn extra_arguments_are_ignored() {
        let dir = project();
        let mut runner = SpyRunner::default();
        assert_eq!(
            dispatch(
                ["primoria-build", "clean", "now", "--force"],
                dir.path(),
                &mut runner
            ),
            0
        );
        assert_eq!(
            dispatch(["primoria-build", "help", "me"], dir.path(), &mut runner),
            0
        );
        assert!(runner.calls.is_empty());

        let mut runner = SpyRunner::with_stdout("/opt/toolchain\n");
        assert_eq!(
            dispatch(
                ["primoria-build", "build", "extra", "--release"],
                dir.path(),
                &mut runner
            ),
            0
        );
        assert_eq!(runner.calls.len(), 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("rust-project.json")).unwrap(),
            EXPECTED_DESCRIPTOR
        );

        fs::create_dir_all(dir.path().join("tools")).unwrap();
        fs::write(
            dir.path().join("tools/config.json"),
            r#"{"emulator":{"program":"qemu-system-x86_64","options":["-drive","format=raw,file={{image}}"]},"image":"build/bin/primoria"}"#,
        )
        .unwrap();
        let mut runner = SpyRunner::default();
        assert_eq!(
            dispatch(["primoria-build", "run", "gdb", "-s"], dir.path(), &mut runner),
            0
        );
        assert_eq!(
            runner.calls,
            [CommandSpec::new("qemu-system-x86_64")
                .args(["-drive", "format=raw,file=build/bin/primoria"])]
        );
    }

    #[test]
    fn help_succeeds_without_config() {
        let dir = project();
        let mut runner = SpyRunner::default();
        assert_eq!(dispatch(["primoria-build", "help"], dir.path(), &mut runner), 0);
        assert!(runner.calls.is_empty());
        assert!(!dir.path().join("tools").exists());
    }

    #[test]
    fn build_writes_exact_descriptor() {
        let dir = project();
        let mut runner = SpyRunner::with_stdout("/opt/toolchain\n");
        assert_eq!(dispatch(["primoria-build", "build"], dir.path(), &mut runner), 0);

        let written = fs::read_to_string(dir.path().join("rust-project.json")).unwrap();
        assert_eq!(written, EXPECTED_DESCRIPTOR);
        assert_eq!(runner.calls.len(), 2);
    }

    #[test]
    fn repeated_builds_are_byte_identical() {
        let dir = project();
        let path = dir.path().join("rust-project.json");

        let mut runner = SpyRunner::with_stdout("/opt/toolchain\n");
        assert_eq!(dispatch(["primoria-build", "build"], dir.path(), &mut runner), 0);
        let first = fs::read(&path).unwrap();

        let mut runner = SpyRunner::with_stdout("/opt/toolchain\n");
        assert_eq!(dispatch(["primoria-build", "build"], dir.path(), &mut runner), 0);
        assert_eq!(fs::read(&path).unwrap(), first);
    }

    #[test]
    fn failing_step_returns_non_zero_and_stops() {
        let dir = project();
        let mut runner = SpyRunner::with_stdout("/opt/toolchain\n").failing_at(0);
        assert_eq!(dispatch(["primoria-build", "build"], dir.path(), &mut runner), 1);
        assert_eq!(runner.calls.len(), 1);
        assert!(!dir.path().join("rust-project.json").exists());
    }

    #[test]
    fn clean_succeeds_on_fresh_checkout() {
        let dir = project();
        let mut runner = SpyRunner::default();
        assert_eq!(dispatch(["primoria-build", "clean"], dir.path(), &mut runner), 0);
        assert!(runner.calls.is_empty());
    }
}
