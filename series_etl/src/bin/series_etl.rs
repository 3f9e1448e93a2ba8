use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use series_etl::{
    Rule, Series,
    config::{EtlConfig, load_config_path},
    gaps::{RepairOptions, detect_gaps, repair_gaps},
    io::csv::{CsvOptions, read_csv, write_csv},
    normalize::{NormalizeOptions, normalize},
    quality::data_quality_report,
    resample::{ExtraNumericPolicy, ResampleOptions, resample},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Normalize, gap-check and resample OHLC time series")]
struct Cli {
    /// Pipeline configuration (TOML).
    #[arg(long, global = true, value_name = "FILE", env = "SERIES_ETL_CONFIG")]
    config: Option<PathBuf>,
    /// CSV field delimiter.
    #[arg(long, global = true, default_value_t = ',')]
    delimiter: char,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Normalize a raw CSV and write the canonical series.
    Normalize {
        #[command(flatten)]
        io: InOut,
        /// Write the normalization report here (JSON).
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
    /// Print the gaps of a normalized input as JSON; optionally write the repaired series.
    Gaps {
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
        #[arg(long)]
        rule: Rule,
        #[arg(long, default_value_t = 5)]
        short_gap_minutes: i64,
        /// Reindex onto the grid and write the repaired series here.
        #[arg(long, value_name = "FILE")]
        repair: Option<PathBuf>,
        #[arg(long = "ffill", value_name = "COLUMN")]
        ffill_columns: Vec<String>,
        #[arg(long)]
        interpolate_prices: bool,
    },
    /// Resample a normalized input to one rule.
    Resample {
        #[command(flatten)]
        io: InOut,
        #[arg(long)]
        rule: Rule,
        /// Keep bins whose CLOSE is missing.
        #[arg(long)]
        keep_incomplete: bool,
        #[arg(long, value_enum, default_value_t = ExtraPolicyArg::Mean)]
        extra_numeric: ExtraPolicyArg,
    },
    /// Full pipeline driven by the configuration file.
    Run(RunCmd),
}

#[derive(Args)]
struct InOut {
    #[arg(long, value_name = "FILE")]
    input: PathBuf,
    #[arg(long, value_name = "FILE")]
    output: PathBuf,
}

#[derive(Args)]
struct RunCmd {
    #[arg(long, value_name = "FILE")]
    input: PathBuf,
    #[arg(long, value_name = "DIR")]
    out_dir: PathBuf,
    /// Output file prefix; defaults to the input file stem.
    #[arg(long)]
    base: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExtraPolicyArg {
    Mean,
    Sum,
}

impl From<ExtraPolicyArg> for ExtraNumericPolicy {
    fn from(arg: ExtraPolicyArg) -> Self {
        match arg {
            ExtraPolicyArg::Mean => ExtraNumericPolicy::Mean,
            ExtraPolicyArg::Sum => ExtraNumericPolicy::Sum,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => load_config_path(path)?,
        None => EtlConfig::default(),
    };
    let delimiter = u8::try_from(cli.delimiter).context("delimiter must be a single-byte character")?;
    let csv = CsvOptions { delimiter };

    match cli.cmd {
        Cmd::Normalize { io, report } => {
            let (series, norm) = load_normalized(&io.input, &cfg, &csv)?;
            write_csv(&series, &io.output, &csv)?;
            if let Some(path) = report {
                write_json(&path, &norm)?;
            }
        }
        Cmd::Gaps {
            input,
            rule,
            short_gap_minutes,
            repair,
            ffill_columns,
            interpolate_prices,
        } => {
            let (series, _) = load_normalized(&input, &cfg, &csv)?;
            let gaps = match repair {
                Some(out) => {
                    let opts = RepairOptions {
                        rule,
                        short_gap_minutes,
                        ffill_columns,
                        interpolate_prices,
                    };
                    let (repaired, report) = repair_gaps(&series, &opts)?;
                    write_csv(&repaired, &out, &csv)?;
                    report.detected_gaps
                }
                None => detect_gaps(&series, rule, short_gap_minutes)?,
            };
            println!("{}", serde_json::to_string_pretty(&gaps)?);
        }
        Cmd::Resample {
            io,
            rule,
            keep_incomplete,
            extra_numeric,
        } => {
            let (series, _) = load_normalized(&io.input, &cfg, &csv)?;
            let opts = ResampleOptions {
                rule,
                drop_incomplete: !keep_incomplete,
                extra_numeric_policy: extra_numeric.into(),
            };
            let (out, _) = resample(&series, &opts)?;
            write_csv(&out, &io.output, &csv)?;
        }
        Cmd::Run(run) => run_pipeline(&run, &cfg, &csv)?,
    }
    Ok(())
}

fn load_normalized(
    input: &Path,
    cfg: &EtlConfig,
    csv: &CsvOptions,
) -> Result<(Series, series_etl::normalize::NormalizationReport)> {
    let frame = read_csv(input, csv)?;
    let options = NormalizeOptions::from_config(cfg)?;
    normalize(frame, &options).with_context(|| format!("normalize {}", input.display()))
}

fn run_pipeline(run: &RunCmd, cfg: &EtlConfig, csv: &CsvOptions) -> Result<()> {
    let base = match &run.base {
        Some(b) => b.clone(),
        None => run
            .input
            .file_stem()
            .and_then(|s| s.to_str())
            .context("cannot derive an output prefix from the input path; pass --base")?
            .to_string(),
    };
    std::fs::create_dir_all(&run.out_dir)
        .with_context(|| format!("create {}", run.out_dir.display()))?;
    let out = |suffix: &str| run.out_dir.join(format!("{base}_{suffix}"));

    let (series, norm) = load_normalized(&run.input, cfg, csv)?;
    write_csv(&series, out("normalized.csv"), csv)?;
    write_json(&out("normalization.json"), &norm)?;
    write_json(
        &out("quality.json"),
        &data_quality_report(&series, &cfg.quality.sma_windows),
    )?;

    let source = match &cfg.gaps {
        Some(gaps) => {
            let opts = RepairOptions {
                rule: gaps.rule,
                short_gap_minutes: gaps.short_gap_minutes,
                ffill_columns: gaps.ffill_columns.clone(),
                interpolate_prices: gaps.interpolate_prices,
            };
            let (repaired, report) = repair_gaps(&series, &opts)?;
            write_csv(&repaired, out("repaired.csv"), csv)?;
            write_json(&out("gaps.json"), &report)?;
            repaired
        }
        None => series,
    };

    let mut reports = Vec::with_capacity(cfg.resample.timeframes.len());
    for &rule in &cfg.resample.timeframes {
        let opts = ResampleOptions {
            rule,
            drop_incomplete: cfg.resample.drop_incomplete,
            extra_numeric_policy: cfg.resample.extra_numeric_policy,
        };
        let (resampled, report) = resample(&source, &opts)?;
        write_csv(&resampled, out(&format!("{rule}.csv")), csv)?;
        reports.push(report);
    }
    write_json(&out("resample.json"), &reports)?;

    info!(out_dir = %run.out_dir.display(), base = %base, "pipeline finished");
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("write {}", path.display()))
}
