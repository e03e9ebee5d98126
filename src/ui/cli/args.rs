// Wed Jan 15 2026 - Alex

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "taskflow")]
#[command(author = "Alex")]
#[command(version = "1.0.0")]
#[command(about = "Thread-per-stage task pipelines with marker-file run tracking", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process every file of a directory through a managed pipeline run
    Run(RunArgs),
    /// Show the marker left by the last run in an output directory
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory whose files become the pipeline tasks
    pub input: PathBuf,

    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(short, long)]
    pub working_dir: Option<PathBuf>,

    #[arg(short, long)]
    pub scratch: Option<PathBuf>,

    /// Number of processor stages sharing the task queue
    #[arg(short = 'j', long, default_value_t = num_cpus::get())]
    pub jobs: usize,

    /// Shell command run per file; `{}` is the file, `{tmp}` the run's tmp dir
    #[arg(short, long)]
    pub command: Option<String>,

    #[arg(short, long)]
    pub extension: Option<String>,

    #[arg(long)]
    pub limit: Option<usize>,

    /// Bound the task queue, making the scanner wait for the workers
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Record failing commands in the summary instead of failing the run
    #[arg(long)]
    pub keep_going: bool,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub marker_prefix: Option<String>,

    #[arg(long)]
    pub no_signals: bool,

    #[arg(long)]
    pub debug: bool,
}

impl RunArgs {
    pub fn validate(&self) -> Result<(), String> {
        if !self.input.is_dir() {
            return Err(format!("Input directory does not exist: {:?}", self.input));
        }

        if self.jobs == 0 {
            return Err("--jobs must be at least 1".to_string());
        }

        if self.capacity == Some(0) {
            return Err("--capacity must be at least 1".to_string());
        }

        if let Some(command) = &self.command {
            if command.trim().is_empty() {
                return Err("--command must not be empty".to_string());
            }
        }

        Ok(())
    }
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    pub output: PathBuf,

    #[arg(long)]
    pub marker_prefix: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let args = Args::try_parse_from([
            "taskflow", "run", "/data/in", "-o", "/data/out", "-j", "3", "--command", "gzip -k {}",
            "--extension", "tif", "--limit", "10", "-q",
        ])
        .unwrap();

        assert!(args.quiet);
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.input, PathBuf::from("/data/in"));
                assert_eq!(run.output, Some(PathBuf::from("/data/out")));
                assert_eq!(run.jobs, 3);
                assert_eq!(run.command.as_deref(), Some("gzip -k {}"));
                assert_eq!(run.extension.as_deref(), Some("tif"));
                assert_eq!(run.limit, Some(10));
                assert!(!run.keep_going);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_status() {
        let args = Args::try_parse_from(["taskflow", "status", "/data/out", "--marker-prefix", ""]).unwrap();
        match args.command {
            Command::Status(status) => {
                assert_eq!(status.output, PathBuf::from("/data/out"));
                assert_eq!(status.marker_prefix.as_deref(), Some(""));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_validate_run_args() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args::try_parse_from(["taskflow", "run", dir.path().to_str().unwrap(), "-j", "0"]).unwrap();
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert!(run.validate().is_err());

        let args = Args::try_parse_from(["taskflow", "run", "/definitely/not/here"]).unwrap();
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert!(run.validate().is_err());
    }
}
