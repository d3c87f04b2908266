pub mod cli;
pub mod config;
pub mod executor;
pub mod process;
pub mod project;
pub mod step;
pub mod tasks;

/// Run the command line interface and return an exit code.
pub fn run_cli() -> i32 {
    cli::run()
}
