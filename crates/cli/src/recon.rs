//! `tally run|validate|list|compare`: config-driven cross-store reconciliation.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use tally_recon::bins::classify;
use tally_recon::engine::{self, IdentifierSource};
use tally_recon::enumerate::read_identifiers;
use tally_recon::{write_summary, ReconReport, RunConfig, StoreSide};

use crate::exit_codes::{recon_exit_code, EXIT_DISCREPANCIES, EXIT_ERROR, EXIT_INVALID_CONFIG, EXIT_USAGE};
use crate::store::open_store;
use crate::CliError;

/// Flags of `tally run` that override config file values.
#[derive(Debug, Default)]
pub struct RunOverrides {
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub retry_comparisons: bool,
}

/// Output options of `tally run`.
#[derive(Debug, Default)]
pub struct RunOutput {
    pub json: bool,
    pub output: Option<PathBuf>,
    pub strict: bool,
}

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

/// Read and validate a config. Relative `fs` bases resolve against the
/// returned directory.
fn load_config(path: &Path) -> Result<(RunConfig, PathBuf), CliError> {
    let config_str = std::fs::read_to_string(path).map_err(|e| {
        recon_err(EXIT_INVALID_CONFIG, format!("cannot read config {}: {e}", path.display()))
    })?;
    let config = RunConfig::from_toml(&config_str)
        .map_err(|e| recon_err(recon_exit_code(&e), e.to_string()))?;
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    Ok((config, base_dir))
}

// ============================================================================
// run
// ============================================================================

pub fn cmd_run(
    config_path: PathBuf,
    ids_file: Option<PathBuf>,
    overrides: RunOverrides,
    output: RunOutput,
) -> Result<(), CliError> {
    let (mut config, base_dir) = load_config(&config_path)?;

    if let Some(n) = overrides.concurrency {
        config.concurrency = n;
    }
    if let Some(secs) = overrides.timeout_secs {
        config.timeout_secs = secs;
    }
    if overrides.retry_comparisons {
        config.retry.comparisons = true;
    }
    config
        .validate()
        .map_err(|e| recon_err(EXIT_USAGE, e.to_string()))?;

    let source = match ids_file {
        Some(ref path) => {
            let file = File::open(path).map_err(|e| {
                recon_err(EXIT_USAGE, format!("cannot read identifiers from {}: {e}", path.display()))
            })?;
            let ids = read_identifiers(BufReader::new(file))
                .map_err(|e| recon_err(EXIT_USAGE, format!("{}: {e}", path.display())))?;
            eprintln!("read {} identifier(s) from {}", ids.len(), path.display());
            IdentifierSource::Provided(ids)
        }
        None => IdentifierSource::Enumerate,
    };

    let store_a = open_store(&config.store_a, &base_dir)?;
    let store_b = open_store(&config.store_b, &base_dir)?;

    let report = engine::run(&config, store_a, store_b, source)
        .map_err(|e| recon_err(recon_exit_code(&e), e.to_string()))?;

    let rendered = render(&report, output.json)?;
    match output.output {
        Some(ref path) => {
            std::fs::write(path, &rendered)
                .map_err(|e| recon_err(EXIT_ERROR, format!("cannot write output: {e}")))?;
            eprintln!("wrote {}", path.display());
        }
        None => {
            io::stdout()
                .lock()
                .write_all(rendered.as_bytes())
                .map_err(|e| recon_err(EXIT_ERROR, e.to_string()))?;
        }
    }

    let s = &report.summary;
    eprintln!(
        "recon '{}': {} identifier(s), {} equal, {} less, {} offending, {} skipped ({}ms)",
        report.meta.config_name, s.total, s.equal, s.less, s.offending, s.skipped, report.meta.duration_ms,
    );

    if output.strict && report.has_discrepancies() {
        return Err(recon_err(
            EXIT_DISCREPANCIES,
            format!("{} offending and {} skipped identifier(s)", s.offending, s.skipped),
        ));
    }
    Ok(())
}

fn render(report: &ReconReport, json: bool) -> Result<String, CliError> {
    if json {
        let mut s = serde_json::to_string_pretty(report)
            .map_err(|e| recon_err(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
        s.push('\n');
        return Ok(s);
    }
    let mut buf = Vec::new();
    write_summary(report, &mut buf).map_err(|e| recon_err(EXIT_ERROR, e.to_string()))?;
    String::from_utf8(buf).map_err(|e| recon_err(EXIT_ERROR, e.to_string()))
}

// ============================================================================
// validate
// ============================================================================

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let (config, _) = load_config(&config_path)?;
    eprintln!(
        "valid: run '{}': a = {} {} ({}), b = {} {} ({}), concurrency {}, timeout {}s",
        config.name,
        config.store_a.kind,
        config.store_a.bucket,
        config.store_a.root,
        config.store_b.kind,
        config.store_b.bucket,
        config.store_b.root,
        config.concurrency,
        config.timeout_secs,
    );
    Ok(())
}

// ============================================================================
// list
// ============================================================================

pub fn cmd_list(config_path: PathBuf, side: Option<StoreSide>) -> Result<(), CliError> {
    let (mut config, base_dir) = load_config(&config_path)?;
    if let Some(side) = side {
        config.enumerate.from = side;
    }
    let store = open_store(config.store(config.enumerate.from), &base_dir)?;
    let ids = engine::enumerate(&config, store.as_ref())
        .map_err(|e| recon_err(recon_exit_code(&e), e.to_string()))?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for id in &ids {
        writeln!(handle, "{id}").map_err(|e| recon_err(EXIT_ERROR, e.to_string()))?;
    }
    eprintln!("{} identifier(s) in {}", ids.len(), store.name());
    Ok(())
}

// ============================================================================
// compare
// ============================================================================

pub fn cmd_compare(config_path: PathBuf, identifiers: Vec<String>, strict: bool) -> Result<(), CliError> {
    let (config, base_dir) = load_config(&config_path)?;
    let store_a = open_store(&config.store_a, &base_dir)?;
    let store_b = open_store(&config.store_b, &base_dir)?;

    let results = engine::compare_identifiers(&config, store_a, store_b, &identifiers);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let mut failed = 0usize;
    let mut offending = 0usize;
    for result in &results {
        let line = match result {
            Ok(c) => {
                let bin = classify(c.difference());
                if bin.tracks_offenders() {
                    offending += 1;
                }
                format!(
                    "{}: a={} b={} diff={} bin={}",
                    c.identifier,
                    c.count_a,
                    c.count_b,
                    c.difference(),
                    bin
                )
            }
            Err(e) => {
                failed += 1;
                format!("{}: error: {e}", e.identifier())
            }
        };
        writeln!(handle, "{line}").map_err(|e| recon_err(EXIT_ERROR, e.to_string()))?;
    }

    if failed > 0 {
        return Err(recon_err(EXIT_ERROR, format!("{failed} comparison(s) failed")));
    }
    if strict && offending > 0 {
        return Err(recon_err(
            EXIT_DISCREPANCIES,
            format!("{offending} offending identifier(s)"),
        ));
    }
    Ok(())
}
