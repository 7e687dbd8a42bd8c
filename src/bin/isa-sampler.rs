use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use serde_json::json;

use isa_sampler::logging::{init_tracing, init_tracing_json};
use isa_sampler::{
    analyze_path, analyze_path_with_timeout, Control, Report, SamplerConfig, TimeoutConfig,
};

/// Estimate which instruction-set extensions an executable uses
#[derive(Parser)]
#[command(
    name = "isa-sampler",
    about = "Sample reachable code in ELF/PE files and count CPU feature usage",
    version
)]
struct Cli {
    /// Files to analyze
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Extra entry point (hex with 0x prefix, or decimal); repeatable
    #[arg(long = "entry", value_name = "ADDR", value_parser = parse_address)]
    entries: Vec<u64>,

    /// Stop after decoding this many instructions per file
    #[arg(long, value_name = "N")]
    max_instructions: Option<u64>,

    /// Per-file deadline; the partial report is printed when it passes
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Number of features listed per file in text output
    #[arg(long, value_name = "N", default_value_t = 20)]
    top: usize,
}

fn parse_address(s: &str) -> std::result::Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn load_config(cli: &Cli) -> Result<SamplerConfig> {
    let mut config = match &cli.config {
        Some(path) => SamplerConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SamplerConfig::default(),
    };
    config.extra_entry_points.extend(&cli.entries);
    if let Some(limit) = cli.max_instructions {
        config.max_instructions = Some(limit);
    }
    Ok(config)
}

fn run_one(path: &Path, config: &SamplerConfig, timeout: Option<u64>) -> Result<Report> {
    let report = match timeout {
        None => analyze_path(path, config, &mut Control::default())?,
        Some(seconds) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .context("failed to start async runtime")?;
            let limit = TimeoutConfig::new(seconds, path.display().to_string());
            runtime.block_on(analyze_path_with_timeout(path, config.clone(), &limit))?
        }
    };
    Ok(report)
}

fn print_text(path: &Path, report: &Report, top: usize) {
    let format = report
        .format
        .map(|f| f.to_string())
        .unwrap_or_else(|| "?".to_string());
    let arch = report
        .architecture
        .map(|a| a.to_string())
        .unwrap_or_else(|| "?".to_string());
    println!(
        "{}: {} {} {}-bit, {} instructions ({} invalid), {}/{} bytes decoded [{:?}]",
        path.display(),
        format,
        arch,
        report.bitness,
        report.instruction_count,
        report.invalid_instruction_count,
        report.bytes_decoded,
        report.bytes_sampled,
        report.outcome
    );
    let sources: Vec<String> = report
        .seed_summary
        .sources
        .iter()
        .map(|s| format!("{} {}/{}", s.name, s.added, s.candidates))
        .collect();
    println!(
        "  seeds: {} accepted ({})",
        report.seed_summary.accepted,
        sources.join(", ")
    );
    for (feature, count) in report.features_by_count().into_iter().take(top) {
        println!("  {:<24} {:>10}", feature, count);
    }
    for issue in &report.issues {
        println!("  ! {}", issue);
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    if cli.log_json {
        init_tracing_json();
    } else {
        init_tracing();
    }
    let config = load_config(&cli)?;

    let results: Vec<(&PathBuf, Result<Report>)> = cli
        .files
        .par_iter()
        .map(|path| (path, run_one(path, &config, cli.timeout)))
        .collect();

    let mut failed = false;
    if cli.json {
        let entries: Vec<serde_json::Value> = results
            .iter()
            .map(|(path, result)| match result {
                Ok(report) => json!({ "path": path, "report": report }),
                Err(e) => json!({ "path": path, "error": format!("{:#}", e) }),
            })
            .collect();
        failed = results.iter().any(|(_, r)| r.is_err());
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for (path, result) in &results {
            match result {
                Ok(report) => print_text(path, report, cli.top),
                Err(e) => {
                    failed = true;
                    eprintln!("{}: error: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
