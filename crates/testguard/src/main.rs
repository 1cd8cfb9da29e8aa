use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};

use testguard_core::{CancellationToken, CheckError, CheckPlan, render_json, run_check};
use testguard_domain::compile_policy;
use testguard_types::{CONFIG_FILE_NAME, ConfigFile, FailOn, OutputFormat};

mod config_loader;
mod env_expand;

use config_loader::load_config_with_includes;
use env_expand::expand_env_vars;

const EXIT_FATAL: u8 = 2;
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "testguard")]
#[command(
    about = "Check unit tests for matcher-style assertions, descriptive names and the sanctioned runner",
    long_about = None
)]
struct Cli {
    /// Root directory of the tree to check.
    root: PathBuf,

    /// Path to a config file (defaults to ROOT/testguard.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Console report format (overrides config defaults).
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// When violations should fail the run (overrides config defaults).
    #[arg(long, value_enum)]
    fail_on: Option<FailOnArg>,

    /// Also write the findings as a JSON array to this file.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Worker threads for extraction; 0 uses available parallelism.
    #[arg(long)]
    jobs: Option<u32>,

    /// Emit `ok` findings for compliant assertion and runner sites.
    #[arg(long)]
    report_ok: bool,

    /// Print the effective configuration as TOML and exit without scanning.
    #[arg(long)]
    print_config: bool,

    /// Enable verbose (info-level) logging to stderr.
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Enable debug-level logging to stderr.
    #[arg(long)]
    debug: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FailOnArg {
    Violation,
    Never,
}

impl From<FailOnArg> for FailOn {
    fn from(v: FailOnArg) -> Self {
        match v {
            FailOnArg::Violation => FailOn::Violation,
            FailOnArg::Never => FailOn::Never,
        }
    }
}

#[cfg(not(test))]
fn main() -> std::process::ExitCode {
    match run_with_args(std::env::args_os()) {
        Ok(code) => std::process::ExitCode::from(u8::try_from(code).unwrap_or(EXIT_FATAL)),
        Err(err) => {
            eprintln!("testguard: {err:?}");
            std::process::ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run_with_args<I, T>(args: I) -> Result<i32>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    init_logging(cli.verbose, cli.debug);

    let mut cfg = load_config(cli.config.as_deref(), &cli.root)?;
    apply_overrides(&mut cfg, &cli);

    if cli.print_config {
        let s = toml::to_string_pretty(&cfg).context("render toml")?;
        print!("{s}");
        return Ok(0);
    }

    let policy = compile_policy(&cfg).context("invalid configuration")?;

    let cancel = CancellationToken::new();
    install_interrupt_handler(&cancel);

    let plan = CheckPlan {
        root: cli.root.clone(),
        fail_on: cfg.defaults.fail_on.unwrap_or(FailOn::Violation),
        format: cfg.defaults.format.unwrap_or(OutputFormat::Text),
        jobs: cfg.defaults.jobs.unwrap_or(0) as usize,
    };

    let run = match run_check(&plan, &policy, cancel) {
        Ok(run) => run,
        Err(CheckError::Cancelled) => {
            eprintln!("testguard: cancelled");
            return Ok(EXIT_CANCELLED);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("check '{}'", cli.root.display()));
        }
    };

    {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(run.report.as_bytes())
            .context("write report")?;
        stdout.flush().context("flush stdout")?;
    }

    if let Some(out) = &cli.out {
        let json = render_json(&run.findings).context("render json")?;
        write_text(out, &json)?;
        info!(path = %out.display(), "wrote findings");
    }

    info!(
        violations = run.summary.violations,
        errors = run.summary.errors,
        exit_code = run.exit_code,
        "check complete"
    );
    Ok(run.exit_code)
}

fn init_logging(verbose: bool, debug: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    debug!("Logging initialized at level: {}", level);
}

fn load_config(explicit: Option<&Path>, root: &Path) -> Result<ConfigFile> {
    let path = explicit.map(Path::to_path_buf).or_else(|| {
        let p = root.join(CONFIG_FILE_NAME);
        if p.is_file() { Some(p) } else { None }
    });

    let Some(path) = path else {
        debug!("No config file found, using built-in defaults");
        return Ok(ConfigFile::built_in());
    };

    info!("Loading config from: {}", path.display());

    load_config_with_includes(&path, |text| {
        expand_env_vars(text).map(std::borrow::Cow::into_owned)
    })
}

/// Command-line flags win over `[defaults]`.
fn apply_overrides(cfg: &mut ConfigFile, cli: &Cli) {
    if let Some(format) = cli.format {
        cfg.defaults.format = Some(format.into());
    }
    if let Some(fail_on) = cli.fail_on {
        cfg.defaults.fail_on = Some(fail_on.into());
    }
    if let Some(jobs) = cli.jobs {
        cfg.defaults.jobs = Some(jobs);
    }
    if cli.report_ok {
        cfg.defaults.report_ok = Some(true);
    }
}

fn install_interrupt_handler(cancel: &CancellationToken) {
    let token = cancel.clone();
    // The handler is process-wide and can only be set once.
    if let Err(err) = ctrlc::set_handler(move || token.cancel()) {
        warn!(error = %err, "interrupt handler not installed");
    }
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create directory '{}'", parent.display()))?;
        }
    }
    std::fs::write(path, text).with_context(|| format!("write '{}'", path.display()))
}
