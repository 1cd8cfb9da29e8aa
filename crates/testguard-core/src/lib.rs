//! Core engine: orchestrates scanning, extraction, rule evaluation and reporting.

mod cancellation;
mod check;
mod render;
mod scan;

pub use cancellation::CancellationToken;
pub use check::{
    CheckError, CheckPlan, CheckRun, Driver, Stage, Summary, compute_exit_code, run_check,
};
pub use render::{render_json, render_text};
pub use scan::{FileEntry, ScanEntry, Scanner, relative_path};
