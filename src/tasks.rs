use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::process::CommandSpec;
use crate::step::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskName {
    Build,
    Run,
    Clean,
    Help,
}

impl TaskName {
    pub const ALL: [TaskName; 4] = [
        TaskName::Build,
        TaskName::Run,
        TaskName::Clean,
        TaskName::Help,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskName::Build => "build",
            TaskName::Run => "run",
            TaskName::Clean => "clean",
            TaskName::Help => "help",
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown task '{0}'")]
pub struct UnknownTask(pub String);

impl FromStr for TaskName {
    type Err = UnknownTask;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        TaskName::ALL
            .into_iter()
            .find(|name| name.as_str() == raw)
            .ok_or_else(|| UnknownTask(raw.to_string()))
    }
}

/// Fixed project paths, relative to the project root.
#[derive(Debug, Clone)]
pub struct Layout {
    pub source_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub output_dir: PathBuf,
    pub output_binary: PathBuf,
    pub descriptor: PathBuf,
    pub config: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("src"),
            staging_dir: PathBuf::from("build/src"),
            output_dir: PathBuf::from("build/bin"),
            output_binary: PathBuf::from("build/bin/primoria"),
            descriptor: PathBuf::from("rust-project.json"),
            config: PathBuf::from("tools/config.json"),
        }
    }
}

impl Layout {
    pub fn staged_entry(&self) -> PathBuf {
        self.staging_dir.join("main.rs")
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub name: TaskName,
    pub summary: &'static str,
    pub steps: Vec<Step>,
}

/// The registration table. Built once per invocation and never mutated.
#[derive(Debug)]
pub struct Registry {
    tasks: BTreeMap<TaskName, Task>,
}

impl Registry {
    pub fn standard(layout: &Layout) -> Self {
        let tasks = [
            build_task(layout),
            run_task(layout),
            clean_task(layout),
            help_task(),
        ]
        .into_iter()
        .map(|task| (task.name, task))
        .collect();

        Self { tasks }
    }

    pub fn lookup(&self, name: &str) -> Option<&Task> {
        let name = name.parse::<TaskName>().ok()?;
        self.tasks.get(&name)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }
}

fn build_task(layout: &Layout) -> Task {
    let compile = CommandSpec::new("rustc")
        .args(["--edition", crate::project::EDITION])
        .arg(path_arg(&layout.staged_entry()))
        .arg("-o")
        .arg(path_arg(&layout.output_binary));

    Task {
        name: TaskName::Build,
        summary: "generate rust-project.json and compile the kernel",
        steps: vec![
            Step::QuerySysroot(CommandSpec::new("rustc").args(["--print", "sysroot"])),
            Step::WriteProjectFile {
                dest: layout.descriptor.clone(),
            },
            Step::Stage {
                from: layout.source_dir.clone(),
                to: layout.staging_dir.clone(),
            },
            Step::EnsureDir {
                dir: layout.output_dir.clone(),
            },
            Step::Exec(compile),
        ],
    }
}

fn run_task(layout: &Layout) -> Task {
    Task {
        name: TaskName::Run,
        summary: "boot the built image in the configured emulator",
        steps: vec![Step::Emulate {
            config: layout.config.clone(),
        }],
    }
}

fn clean_task(layout: &Layout) -> Task {
    Task {
        name: TaskName::Clean,
        summary: "remove staged sources and build outputs",
        steps: vec![Step::Clean {
            dirs: vec![layout.staging_dir.clone(), layout.output_dir.clone()],
        }],
    }
}

fn help_task() -> Task {
    Task {
        name: TaskName::Help,
        summary: "list the available tasks",
        steps: Vec::new(),
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
