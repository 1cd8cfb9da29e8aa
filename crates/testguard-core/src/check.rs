use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use testguard_domain::{
    CompiledPolicy, Deadline, ExtractError, FileModel, SourceFile, check_file, degraded_finding,
    extract, sort_findings,
};
use testguard_types::{FailOn, Finding, OutputFormat, RuleId, Severity};

use crate::cancellation::CancellationToken;
use crate::render::{render_json, render_text};
use crate::scan::{FileEntry, ScanEntry, Scanner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckPlan {
    pub root: PathBuf,
    pub fail_on: FailOn,
    pub format: OutputFormat,
    /// Worker threads; 0 means available parallelism.
    pub jobs: usize,
}

/// Counts shown in the text report header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub files_checked: usize,
    pub violations: usize,
    pub errors: usize,
    pub warnings: usize,
    pub ok: usize,
    /// Findings per rule, any severity. Rules without findings are absent.
    pub by_rule: BTreeMap<RuleId, usize>,
}

impl Summary {
    pub fn from_findings(files_checked: usize, findings: &[Finding]) -> Self {
        let mut summary = Summary {
            files_checked,
            ..Summary::default()
        };
        for f in findings {
            match f.severity {
                Severity::Violation => summary.violations += 1,
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Ok => summary.ok += 1,
            }
            *summary.by_rule.entry(f.rule).or_insert(0) += 1;
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRun {
    /// Sorted.
    pub findings: Vec<Finding>,
    pub summary: Summary,
    /// The report in the plan's format.
    pub report: String,
    pub exit_code: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("root '{}' does not exist", .0.display())]
    RootMissing(PathBuf),

    #[error("root '{}' is not a directory", .0.display())]
    RootNotADirectory(PathBuf),

    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to render report: {0}")]
    Render(#[from] serde_json::Error),

    #[error("cancelled")]
    Cancelled,
}

/// Driver stages. Data flows through them once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Scanning,
    Extracting,
    Checking,
    Reporting,
    Done,
    Failed,
    Cancelled,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::Scanning => "scanning",
            Stage::Extracting => "extracting",
            Stage::Checking => "checking",
            Stage::Reporting => "reporting",
            Stage::Done => "done",
            Stage::Failed => "failed",
            Stage::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Runs Scanner -> Extractor -> Rule Engine -> Reporter for one plan.
#[derive(Debug)]
pub struct Driver<'a> {
    plan: &'a CheckPlan,
    policy: &'a CompiledPolicy,
    cancel: CancellationToken,
    stage: Stage,
}

enum Outcome {
    Model(FileModel),
    Problem(Finding),
    Skipped,
}

impl<'a> Driver<'a> {
    pub fn new(plan: &'a CheckPlan, policy: &'a CompiledPolicy, cancel: CancellationToken) -> Self {
        Self {
            plan,
            policy,
            cancel,
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn run(&mut self) -> Result<CheckRun, CheckError> {
        let result = self.run_stages();
        match &result {
            Ok(_) => self.advance(Stage::Done),
            Err(CheckError::Cancelled) => self.advance(Stage::Cancelled),
            Err(e) => {
                warn!(error = %e, "check failed");
                self.advance(Stage::Failed);
            }
        }
        result
    }

    fn run_stages(&mut self) -> Result<CheckRun, CheckError> {
        self.advance(Stage::Scanning);
        info!(
            root = %self.plan.root.display(),
            format = self.plan.format.as_str(),
            fail_on = self.plan.fail_on.as_str(),
            jobs = self.plan.jobs,
            "check started"
        );
        validate_root(&self.plan.root)?;
        let mut problems = Vec::new();
        let mut files = Vec::new();
        for entry in Scanner::new(&self.plan.root, &self.policy.scan).entries() {
            match entry {
                ScanEntry::File(f) => files.push(f),
                ScanEntry::Problem(p) => problems.push(p),
            }
            self.checkpoint()?;
        }
        info!(files = files.len(), problems = problems.len(), "scan complete");

        self.checkpoint()?;
        self.advance(Stage::Extracting);
        let outcomes = self.extract_all(&files)?;

        self.checkpoint()?;
        self.advance(Stage::Checking);
        let mut findings = problems;
        let mut models = Vec::new();
        for outcome in outcomes {
            match outcome {
                Outcome::Model(m) => models.push(m),
                Outcome::Problem(f) => findings.push(f),
                Outcome::Skipped => return Err(CheckError::Cancelled),
            }
        }
        models.sort_by(|a, b| a.path.cmp(&b.path));
        for model in &models {
            findings.extend(check_file(model, self.policy));
        }
        sort_findings(&mut findings);

        self.checkpoint()?;
        self.advance(Stage::Reporting);
        let summary = Summary::from_findings(files.len(), &findings);
        let report = match self.plan.format {
            OutputFormat::Json => render_json(&findings)?,
            OutputFormat::Text => {
                render_text(&self.plan.root.display().to_string(), &summary, &findings)
            }
        };
        let exit_code = compute_exit_code(self.plan.fail_on, &findings);
        info!(
            violations = summary.violations,
            errors = summary.errors,
            warnings = summary.warnings,
            exit_code,
            "check complete"
        );

        Ok(CheckRun {
            findings,
            summary,
            report,
            exit_code,
        })
    }

    fn extract_all(&self, files: &[FileEntry]) -> Result<Vec<Outcome>, CheckError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.plan.jobs)
            .build()?;
        let policy = self.policy;
        let cancel = &self.cancel;

        let outcomes = pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    if cancel.is_cancelled() {
                        return Outcome::Skipped;
                    }
                    process_file(file, policy)
                })
                .collect::<Vec<_>>()
        });

        Ok(outcomes)
    }

    fn checkpoint(&self) -> Result<(), CheckError> {
        if self.cancel.is_cancelled() {
            Err(CheckError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!(from = %self.stage, to = %next, "stage");
        self.stage = next;
    }
}

/// Convenience wrapper: one driver, one run.
pub fn run_check(
    plan: &CheckPlan,
    policy: &CompiledPolicy,
    cancel: CancellationToken,
) -> Result<CheckRun, CheckError> {
    Driver::new(plan, policy, cancel).run()
}

fn validate_root(root: &Path) -> Result<(), CheckError> {
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(CheckError::RootNotADirectory(root.to_path_buf())),
        Err(_) => Err(CheckError::RootMissing(root.to_path_buf())),
    }
}

fn process_file(file: &FileEntry, policy: &CompiledPolicy) -> Outcome {
    let limit = policy.limits.max_file_bytes;
    let bytes = match read_capped(&file.abs, limit) {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(size)) => {
            let err = ExtractError::TooLarge { size, limit };
            debug!(path = %file.rel, error = %err, "degraded");
            return Outcome::Problem(degraded_finding(&file.rel, &err));
        }
        Err(e) => {
            warn!(path = %file.rel, error = %e, "read failed");
            return Outcome::Problem(Finding::file_level(
                RuleId::IoError,
                Severity::Error,
                &file.rel,
                format!("could not read file: {e}"),
            ));
        }
    };

    let extracted = SourceFile::from_bytes(file.rel.clone(), file.role, bytes).and_then(|src| {
        extract(&src, policy, Deadline::after(policy.limits.file_timeout))
    });

    match extracted {
        Ok(model) => Outcome::Model(model),
        Err(err) => {
            debug!(path = %file.rel, error = %err, "degraded");
            Outcome::Problem(degraded_finding(&file.rel, &err))
        }
    }
}

/// Read at most `limit` bytes; `Ok(Err(size))` when the file is larger.
fn read_capped(path: &Path, limit: u64) -> std::io::Result<Result<Vec<u8>, u64>> {
    let file = fs::File::open(path)?;
    let size = file.metadata()?.len();
    if size > limit {
        return Ok(Err(size));
    }

    let mut bytes = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
    let read = bytes.len() as u64;
    if read > limit {
        return Ok(Err(read));
    }
    Ok(Ok(bytes))
}

pub fn compute_exit_code(fail_on: FailOn, findings: &[Finding]) -> i32 {
    if matches!(fail_on, FailOn::Never) {
        return 0;
    }

    if findings.iter().any(Finding::is_violation) {
        return 1;
    }

    0
}
