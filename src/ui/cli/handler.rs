// Wed Jan 15 2026 - Alex

use super::args::{Args, Command, RunArgs, StatusArgs};
use super::job::{list_inputs, FileJob, SummaryHook, TaskRecord, SUMMARY_FILE};
use crate::config::{get_arg, RunConfig, DEFAULT_MARKER_PREFIX, ENV_MARKER_PREFIX};
use crate::engine::{Pipeline, StageOptions, TaskQueue};
use crate::run::{marker, ManagedRun, RunOutcome};
use crate::utils::logging::{LoggingUtils, ProgressLogger};
use crate::utils::pluralize;
use anyhow::Context;
use colored::Colorize;
use log::LevelFilter;
use parking_lot::Mutex;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

pub struct CommandHandler;

impl CommandHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn execute(&self, args: Args) -> anyhow::Result<()> {
        if args.no_color {
            colored::control::set_override(false);
        }

        self.setup_logging(&args);

        match args.command {
            Command::Run(run_args) => self.handle_run(run_args, args.quiet),
            Command::Status(status_args) => self.handle_status(status_args),
        }
    }

    fn setup_logging(&self, args: &Args) {
        let mut level = LoggingUtils::level_from_str(&args.log_level);
        if args.quiet && level > LevelFilter::Warn {
            level = LevelFilter::Warn;
        }
        LoggingUtils::init_logger(level, !args.no_color);
    }

    /// Config file, then `TASKFLOW_*` environment, then command-line flags.
    fn build_config(&self, args: &RunArgs) -> anyhow::Result<RunConfig> {
        let mut config = match &args.config {
            Some(path) => RunConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
            None => RunConfig::new(),
        }
        .apply_env();

        if let Some(dir) = &args.working_dir {
            config = config.with_working_dir(dir);
        }
        if let Some(dir) = &args.output {
            config = config.with_output_dir(dir);
        }
        if let Some(dir) = &args.scratch {
            config = config.with_scratch_dir(dir);
        }
        if let Some(prefix) = &args.marker_prefix {
            config = config.with_marker_prefix(prefix);
        }
        if args.no_signals {
            config = config.with_signal_handling(false);
        }
        if args.debug {
            config = config.with_debug(true);
        }

        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    fn handle_run(&self, args: RunArgs, quiet: bool) -> anyhow::Result<()> {
        args.validate().map_err(|e| anyhow::anyhow!(e))?;
        let config = self.build_config(&args)?;

        if let Some(output) = &config.output_dir {
            fs::create_dir_all(output).with_context(|| format!("creating output directory {}", output.display()))?;
        }

        let inputs = list_inputs(&args.input, args.extension.as_deref(), args.limit)?;
        let total = inputs.len();

        if !quiet {
            println!(
                "{} {} from {} with {}",
                "Processing".cyan(),
                pluralize(total, "file", "files"),
                args.input.display(),
                pluralize(args.jobs, "worker", "workers")
            );
        }

        let mut run = ManagedRun::new(config, Pipeline::new())?;
        let job = FileJob {
            command: args.command.clone(),
            working_dir: run.working_dir().to_path_buf(),
            tmp_dir: run.tmp_dir(),
            keep_going: args.keep_going,
        };

        let records: Arc<Mutex<Vec<TaskRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let pipeline = run.pipeline_mut();

        let mut scan_options = StageOptions::named("scan");
        if let Some(capacity) = args.capacity {
            scan_options = scan_options.with_capacity(capacity);
        }
        let files = pipeline.add_generator_with(scan_options, move || inputs)?;

        let results: Arc<TaskQueue<TaskRecord>> = Arc::new(TaskQueue::new());
        for index in 0..args.jobs {
            let job = job.clone();
            pipeline.add_processor_with(
                &files,
                StageOptions::named(&format!("worker-{:02}", index + 1)).with_output(results.clone()),
                move |path: PathBuf| job.process(path),
            )?;
        }

        let sink = records.clone();
        let mut progress = ProgressLogger::new("collect", total);
        pipeline.add_processor_with(results, StageOptions::named("collect"), move |record: TaskRecord| {
            progress.inc();
            sink.lock().push(record);
            Ok(())
        })?;

        let mut run = run.with_hooks(SummaryHook { total, records });
        let outcome = run.run();

        if !quiet {
            self.print_outcome(&run, outcome);
        }

        Ok(())
    }

    fn print_outcome(&self, run: &ManagedRun, outcome: RunOutcome) {
        let label = match outcome {
            RunOutcome::Success => outcome.to_string().green().bold(),
            RunOutcome::Failure => outcome.to_string().red().bold(),
            RunOutcome::Aborted => outcome.to_string().yellow().bold(),
        };
        println!("{} {}", "Run finished:".cyan(), label);
        println!("  Marker: {}", run.marker_path(outcome).display());

        if let Some(report) = run.report() {
            for stage in &report.stages {
                println!(
                    "  {:<12} {:?} consumed {} produced {} in {}",
                    stage.name,
                    stage.state,
                    stage.consumed,
                    stage.produced,
                    crate::utils::format_duration(stage.duration)
                );
            }
        }

        if outcome.is_success() {
            println!("  Summary: {}", run.join(SUMMARY_FILE).display());
        }
    }

    fn handle_status(&self, args: StatusArgs) -> anyhow::Result<()> {
        if !args.output.is_dir() {
            return Err(anyhow::anyhow!("Output directory does not exist: {:?}", args.output));
        }

        let prefix = get_arg(args.marker_prefix.as_deref(), ENV_MARKER_PREFIX, Some(DEFAULT_MARKER_PREFIX))
            .unwrap_or_default();
        let present = marker::present_markers(&args.output, &prefix);

        match present.as_slice() {
            [] => println!("{}", "No marker: run in progress or never started".yellow()),
            [outcome] => {
                let line = format!("{}", marker::marker_path(&args.output, &prefix, *outcome).display());
                match outcome {
                    RunOutcome::Success => println!("{} {}", "SUCCESS".green().bold(), line),
                    RunOutcome::Failure => println!("{} {}", "FAILURE".red().bold(), line),
                    RunOutcome::Aborted => println!("{} {}", "ABORTED".yellow().bold(), line),
                }
            }
            many => {
                let names: Vec<String> = many.iter().map(|o| o.marker_name(&prefix)).collect();
                println!("{} {}", "Conflicting markers:".red(), names.join(", "));
            }
        }

        let summary = args.output.join(SUMMARY_FILE);
        if summary.is_file() {
            let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&summary)?)
                .with_context(|| format!("parsing {}", summary.display()))?;
            println!(
                "  Tasks: {}  processed: {}  failed: {}",
                value["tasks"], value["processed"], value["failed"]
            );
        }

        Ok(())
    }
}

impl Default for CommandHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_run_command_end_to_end() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for i in 0..12 {
            fs::write(input.path().join(format!("f{:02}.dat", i)), vec![0u8; i]).unwrap();
        }

        let out = output.path().join("job001");
        let args = parse(&[
            "taskflow",
            "run",
            input.path().to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "-w",
            input.path().to_str().unwrap(),
            "-j",
            "3",
            "--no-signals",
            "-q",
        ]);

        CommandHandler::new().execute(args).unwrap();

        assert_eq!(marker::read_marker(&out, DEFAULT_MARKER_PREFIX), Some(RunOutcome::Success));
        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join(SUMMARY_FILE)).unwrap()).unwrap();
        assert_eq!(summary["tasks"], 12);
        assert_eq!(summary["processed"], 12);
        assert_eq!(summary["records"][5]["bytes"], 5);
        assert!(!out.join("tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_command_writes_failure_marker() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(input.path().join("a.dat"), b"a").unwrap();

        let args = parse(&[
            "taskflow",
            "run",
            input.path().to_str().unwrap(),
            "-o",
            output.path().to_str().unwrap(),
            "-c",
            "exit 1",
            "--marker-prefix",
            "",
            "--no-signals",
            "-q",
        ]);

        CommandHandler::new().execute(args).unwrap();
        assert_eq!(marker::read_marker(output.path(), ""), Some(RunOutcome::Failure));
        assert!(!output.path().join(SUMMARY_FILE).exists());
    }

    #[test]
    fn test_status_requires_directory() {
        let args = parse(&["taskflow", "status", "/definitely/not/here"]);
        assert!(CommandHandler::new().execute(args).is_err());
    }
}
