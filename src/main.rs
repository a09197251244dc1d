//! CLI entry point for `msg2eml`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use msg2eml::config::{self, Config};
use msg2eml::error::ConversionFailure;
use msg2eml::export::{CancelToken, ConversionReport, Converter, Outcome, Progress};

#[derive(Parser)]
#[command(
    name = "msg2eml",
    version,
    about = "Convert Outlook .msg files and MBOX archives into .eml messages",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input files (.msg or .mbox)
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Output directory (default: ~/EML_Export or the configured one)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Worker threads (0 = one per CPU)
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
    /// Write the current configuration to the config file
    InitConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Some(Commands::Completions { shell }) => cmd_completions(shell),
        Some(Commands::Manpage) => cmd_manpage(),
        Some(Commands::InitConfig) => cmd_init_config(&config),
        None => {
            let output_dir = cli
                .output
                .unwrap_or_else(|| config::default_output_dir(&config));
            let workers = cli.jobs.unwrap_or(config.batch.workers);
            cmd_convert(&cli.files, &output_dir, workers, cli.json)
        }
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "msg2eml.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "msg2eml", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

fn cmd_init_config(config: &Config) -> anyhow::Result<()> {
    let path = config::save_config(config)?;
    println!("Configuration written to {}", path.display());
    Ok(())
}

/// Convert every input, then print a summary.
///
/// Fails only when every input failed.
fn cmd_convert(files: &[PathBuf], output_dir: &Path, workers: usize, json: bool) -> anyhow::Result<()> {
    if files.is_empty() {
        anyhow::bail!("No input files given (expected .msg or .mbox)");
    }

    let converter = Converter::new(output_dir);
    converter.prepare()?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Converting [{bar:40.cyan/blue}] {pos}/{len} files ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );
    if json {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let cancel = CancelToken::new();
    let progress = Progress::new();
    let start = Instant::now();

    let outcomes = std::thread::scope(|scope| {
        let worker = scope.spawn(|| converter.convert_all(files, &cancel, &progress, workers));
        while !worker.is_finished() {
            pb.set_position(progress.finished() as u64);
            std::thread::sleep(Duration::from_millis(100));
        }
        worker.join()
    })
    .map_err(|_| anyhow::anyhow!("Conversion worker panicked"))?;

    pb.finish_and_clear();
    let elapsed = start.elapsed();

    let (reports, failures): (Vec<&ConversionReport>, Vec<&ConversionFailure>) = split_outcomes(&outcomes);
    if json {
        print_summary_json(output_dir, &reports, &failures, elapsed)?;
    } else {
        print_summary_table(output_dir, &reports, &failures, elapsed);
    }

    if reports.is_empty() {
        anyhow::bail!("All {} input(s) failed", failures.len());
    }
    Ok(())
}

fn split_outcomes(outcomes: &[Outcome]) -> (Vec<&ConversionReport>, Vec<&ConversionFailure>) {
    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(report) => reports.push(report),
            Err(failure) => failures.push(failure),
        }
    }
    (reports, failures)
}

fn print_summary_table(
    output_dir: &Path,
    reports: &[&ConversionReport],
    failures: &[&ConversionFailure],
    elapsed: Duration,
) {
    use humansize::{format_size, BINARY};

    let files: usize = reports.iter().map(|r| r.outputs.len()).sum();
    let skipped: usize = reports.iter().map(|r| r.skipped.len()).sum();
    let bytes: u64 = reports.iter().map(|r| r.bytes_written).sum();

    println!();
    println!("  Conversion complete:");
    println!("  {:<25} {}", "Inputs converted", reports.len());
    println!("  {:<25} {}", "Inputs failed", failures.len());
    println!("  {:<25} {}", "Files written", files);
    if skipped > 0 {
        println!("  {:<25} {}", "Archive entries skipped", skipped);
    }
    println!("  {:<25} {}", "Total size", format_size(bytes, BINARY));
    println!("  {:<25} {}", "Output directory", output_dir.display());
    println!("  {:<25} {:.2?}", "Elapsed", elapsed);

    if !failures.is_empty() {
        println!();
        println!("  Failures:");
        for failure in failures {
            println!("    {failure}");
        }
    }
    println!();
}

fn print_summary_json(
    output_dir: &Path,
    reports: &[&ConversionReport],
    failures: &[&ConversionFailure],
    elapsed: Duration,
) -> anyhow::Result<()> {
    let bytes: u64 = reports.iter().map(|r| r.bytes_written).sum();
    let summary = serde_json::json!({
        "output_dir": output_dir,
        "converted": reports,
        "failed": failures,
        "bytes_written": bytes,
        "elapsed_ms": elapsed.as_millis() as u64,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
