// Thu Oct 15 2026 - Alex

use crate::engine::{PipelineReport, StageReport};
use crate::run::{RunContext, RunHooks};
use crate::utils::logging::ScopedTimer;
use crate::utils::{relative_path, run_shell};
use anyhow::Context;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const SUMMARY_FILE: &str = "summary.json";

/// Lists the regular files of `dir`, sorted by name.
pub fn list_inputs(dir: &Path, extension: Option<&str>, limit: Option<usize>) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir).with_context(|| format!("reading input directory {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(wanted) = extension {
            let wanted = wanted.trim_start_matches('.');
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(wanted))
                .unwrap_or(false);
            if !matches {
                continue;
            }
        }
        files.push(path);
    }

    files.sort();
    if let Some(limit) = limit {
        files.truncate(limit);
    }

    Ok(files)
}

pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn render_command(template: &str, input: &Path, tmp_dir: &Path) -> String {
    template
        .replace("{tmp}", &shell_quote(&tmp_dir.to_string_lossy()))
        .replace("{}", &shell_quote(&input.to_string_lossy()))
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub input: PathBuf,
    pub bytes: u64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Work done by each processor stage for one input file.
#[derive(Debug, Clone)]
pub struct FileJob {
    pub command: Option<String>,
    pub working_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub keep_going: bool,
}

impl FileJob {
    pub fn process(&self, path: PathBuf) -> anyhow::Result<TaskRecord> {
        let bytes = fs::metadata(&path)
            .with_context(|| format!("reading metadata of {}", path.display()))?
            .len();

        let mut record = TaskRecord {
            input: relative_path(&path, &self.working_dir),
            bytes,
            ok: true,
            output: Vec::new(),
            error: None,
        };

        let Some(template) = &self.command else {
            return Ok(record);
        };

        match run_shell(&render_command(template, &path, &self.tmp_dir)) {
            Ok(output) => {
                record.output = output.lines().map(str::to_string).collect();
            }
            Err(e) if self.keep_going => {
                log::warn!("{}: {}", path.display(), e);
                record.ok = false;
                record.error = Some(e.to_string());
            }
            Err(e) => return Err(e).with_context(|| format!("processing {}", path.display())),
        }

        Ok(record)
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub run_id: &'a str,
    pub tasks: usize,
    pub processed: usize,
    pub failed: usize,
    pub elapsed_ms: u128,
    pub stages: &'a [StageReport],
    pub records: &'a [TaskRecord],
}

/// Writes `summary.json` into the output directory once the pipeline is done.
pub struct SummaryHook {
    pub total: usize,
    pub records: Arc<Mutex<Vec<TaskRecord>>>,
}

impl RunHooks for SummaryHook {
    fn prerun(&mut self, ctx: &RunContext) -> anyhow::Result<()> {
        log::info!("{} task(s), tmp dir {}", self.total, ctx.tmp_dir.display());
        Ok(())
    }

    fn postrun(&mut self, ctx: &RunContext, report: &PipelineReport) -> anyhow::Result<()> {
        let _timer = ScopedTimer::new("write summary");

        let mut records = self.records.lock();
        records.sort_by(|a, b| a.input.cmp(&b.input));

        let summary = RunSummary {
            run_id: &ctx.run_id,
            tasks: self.total,
            processed: records.len(),
            failed: records.iter().filter(|r| !r.ok).count(),
            elapsed_ms: report.elapsed.as_millis(),
            stages: &report.stages,
            records: &records,
        };

        let path = ctx.join(SUMMARY_FILE);
        fs::write(&path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("summary written to {}", ctx.relpath(&path).display());
        Ok(())
    }
}
