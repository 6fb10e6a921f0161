//! CLI entrypoint for the sysalloc harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sysalloc_core::{SysAllocConfig, SystemAllocator};
use sysalloc_harness::structured_log::{LogEmitter, LogLevel, validate_log_file};
use sysalloc_harness::{HarnessError, StressConfig, run_stress};

/// Tooling for the sysalloc system allocator.
#[derive(Debug, Parser)]
#[command(name = "sysalloc-harness")]
#[command(about = "Stress and evidence harness for sysalloc")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Allocate, fill and release random extents; print a JSON summary.
    Stress {
        /// Number of allocate/release cycles.
        #[arg(long, default_value_t = 1000)]
        iterations: u64,
        /// Largest request size in bytes.
        #[arg(long, default_value_t = 32_767)]
        max_size: usize,
        /// Requested alignment (power of two).
        #[arg(long, default_value_t = 32)]
        alignment: usize,
        /// Root seed (decimal or 0x...).
        #[arg(long, default_value = "0xDEAD_BEEF")]
        seed: String,
        /// Injected failures on the growth backend.
        #[arg(long, default_value_t = 0)]
        fail_growth: u32,
        /// Injected failures on the mapping backend.
        #[arg(long, default_value_t = 0)]
        fail_mapping: u32,
        /// Structured JSONL log output path.
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Check every line of a JSONL log against the schema.
    ValidateLog {
        /// JSONL file written by `stress --log`.
        path: PathBuf,
    },
}

fn parse_seed(raw: &str) -> Result<u64, HarnessError> {
    let cleaned = raw.trim().replace('_', "");
    let parsed = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse::<u64>(),
    };
    parsed.map_err(|e| HarnessError::InvalidArgument(format!("bad seed '{raw}': {e}")))
}

fn main() -> Result<(), HarnessError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Stress {
            iterations,
            max_size,
            alignment,
            seed,
            fail_growth,
            fail_mapping,
            log,
        } => {
            let config = StressConfig {
                iterations,
                max_size,
                alignment,
                seed: parse_seed(&seed)?,
                fail_growth,
                fail_mapping,
            };

            let mut sys_config = SysAllocConfig::from_env();
            if log.is_none() {
                sys_config.log_capacity = 0;
            }
            let mut sys = SystemAllocator::init(sys_config)?;

            let summary = match log {
                Some(path) => {
                    let run_id = format!("{:016x}", config.seed);
                    let mut emitter = LogEmitter::to_file(&path, &run_id)?;
                    let start = emitter.entry(LogLevel::Info, "stress_start").with_details(
                        serde_json::json!({
                            "iterations": config.iterations,
                            "max_size": config.max_size,
                            "alignment": config.alignment,
                            "fail_growth": config.fail_growth,
                            "fail_mapping": config.fail_mapping,
                        }),
                    );
                    emitter.emit_entry(&start)?;
                    // init record
                    emitter.emit_records(&sys.drain_lifecycle_logs())?;
                    let summary = run_stress(&mut sys, &config, Some(&mut emitter))?;
                    let report = sys.shutdown();
                    emitter.emit_records(&report.logs)?;
                    let outcome = if summary.violations == 0 { "pass" } else { "fail" };
                    let end = emitter
                        .entry(LogLevel::Info, "stress_end")
                        .with_outcome(outcome)
                        .with_details(serde_json::to_value(&summary)?);
                    emitter.emit_entry(&end)?;
                    emitter.flush()?;
                    eprintln!(
                        "wrote {} log lines to {}",
                        emitter.lines_written(),
                        path.display()
                    );
                    summary
                }
                None => {
                    let summary = run_stress(&mut sys, &config, None)?;
                    let _report = sys.shutdown();
                    summary
                }
            };

            println!("{}", serde_json::to_string_pretty(&summary)?);
            if summary.violations > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::ValidateLog { path } => {
            let (lines, errors) = validate_log_file(&path)?;
            for error in &errors {
                eprintln!("{error}");
            }
            println!(
                "{}: {lines} lines, {} errors",
                path.display(),
                errors.len()
            );
            if !errors.is_empty() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
