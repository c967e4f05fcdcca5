//! Multitx - multi-channel NBFM composite synthesizer
//!
//! Command-line entry point: render a session to a capture file, run a
//! tone-only squelch check, or report the audio duty cycle of files.

use anyhow::{bail, Context, Result};
use multitx::audio::activity::{analyze_file, ActivityReport, ActivitySettings};
use multitx::audio::decoder::FileOpener;
use multitx::config::{CtcssConfig, FrequencySpec, ToneConfig, ToneLevel};
use multitx::output::CaptureSink;
use multitx::{ChannelConfig, ClockMode, SessionConfig, Transmitter, TransmitterConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    capture: Option<PathBuf>,
    duration: Option<f64>,
    tone_check: Option<f64>,
    center: Option<f64>,
    check_only: bool,
    stats_json: bool,
    report: bool,
    threshold: Option<f32>,
    chunk_ms: Option<f32>,
    log_file: Option<PathBuf>,
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Some(options) = parse_args(&args)? else {
        return Ok(());
    };

    // Held until exit so buffered file lines are written
    let _log_guard = init_logging(options.log_file.as_deref())?;

    if options.report {
        return run_report(&options);
    }

    let config = build_session(&options)?;
    if options.check_only {
        for line in config.summary_lines() {
            println!("{line}");
        }
        println!("Configuration OK");
        return Ok(());
    }

    run_capture(config, &options)
}

/// Log to stderr, and also to `log_file` when given
fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env()
        .add_directive("multitx=info".parse()?)
        .add_directive("multitx_core=info".parse()?);
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let Some(path) = log_file else {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        return Ok(None);
    };

    let file_name = path
        .file_name()
        .with_context(|| format!("Invalid log file: {}", path.display()))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    let file = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .init();
    Ok(Some(guard))
}

/// Parse arguments; `Ok(None)` means help or version was printed
fn parse_args(args: &[String]) -> Result<Option<Options>> {
    let mut options = Options::default();
    let mut i = 1;

    let value = |i: usize, flag: &str| -> Result<&String> {
        args.get(i + 1)
            .with_context(|| format!("{flag} requires a value"))
    };

    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => {
                println!("multitx {} (built {})", multitx::VERSION, multitx::BUILD_DATE);
                return Ok(None);
            }
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            "--config" | "-c" => {
                options.config = Some(PathBuf::from(value(i, "--config")?));
                i += 1;
            }
            "--capture" | "-o" => {
                options.capture = Some(PathBuf::from(value(i, "--capture")?));
                i += 1;
            }
            "--duration" | "-d" => {
                let raw = value(i, "--duration")?;
                options.duration = Some(
                    raw.parse()
                        .with_context(|| format!("Invalid duration: {raw}"))?,
                );
                i += 1;
            }
            "--tone-check" => {
                let raw = value(i, "--tone-check")?;
                options.tone_check = Some(
                    raw.parse()
                        .with_context(|| format!("Invalid tone frequency: {raw}"))?,
                );
                i += 1;
            }
            "--center" => {
                let raw = value(i, "--center")?;
                options.center = Some(
                    raw.parse()
                        .with_context(|| format!("Invalid center frequency: {raw}"))?,
                );
                i += 1;
            }
            "--threshold" => {
                let raw = value(i, "--threshold")?;
                options.threshold = Some(
                    raw.parse()
                        .with_context(|| format!("Invalid threshold: {raw}"))?,
                );
                i += 1;
            }
            "--chunk-ms" => {
                let raw = value(i, "--chunk-ms")?;
                options.chunk_ms = Some(
                    raw.parse()
                        .with_context(|| format!("Invalid chunk length: {raw}"))?,
                );
                i += 1;
            }
            "--log-file" => {
                options.log_file = Some(PathBuf::from(value(i, "--log-file")?));
                i += 1;
            }
            "--check" => options.check_only = true,
            "--stats-json" => options.stats_json = true,
            "--report" => options.report = true,
            arg if arg.starts_with('-') => {
                print_help();
                bail!("Unknown argument: {arg}");
            }
            file => options.files.push(PathBuf::from(file)),
        }
        i += 1;
    }

    Ok(Some(options))
}

fn print_help() {
    println!("Usage: multitx [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config FILE       Session configuration (JSON)");
    println!("  -o, --capture BASE      Write BASE.cs8 and BASE.json");
    println!("  -d, --duration SECS     Stop after SECS of output (default: until Ctrl+C)");
    println!("      --check             Validate the configuration and print a summary");
    println!("      --stats-json        Print final statistics as JSON");
    println!("      --tone-check HZ     Single tone-only channel with a CTCSS tone of HZ");
    println!("      --center HZ         Center frequency for --tone-check");
    println!("      --report FILES...   Print the audio duty cycle of FILES as CSV");
    println!("      --threshold RMS     Activity threshold for --report (default: 0.1)");
    println!("      --chunk-ms MS       Analysis chunk for --report (default: 1000)");
    println!("      --log-file FILE     Also write log lines to FILE");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
    println!();
    println!("Examples:");
    println!("  multitx -c session.json -o out/composite -d 60");
    println!("  multitx --tone-check 67.0 --center 462562500 -o tone -d 10");
    println!("  multitx --report --threshold 0.05 music/*.wav");
}

fn build_session(options: &Options) -> Result<SessionConfig> {
    if let Some(tone_hz) = options.tone_check {
        let center = options
            .center
            .context("--tone-check requires --center")?;
        let mut channel = ChannelConfig::new(1, FrequencySpec::OffsetHz(0.0));
        channel.tone = ToneConfig::Ctcss(CtcssConfig {
            frequency_hz: tone_hz,
            level: ToneLevel::default(),
        });
        let config = SessionConfig {
            transmitter: TransmitterConfig::new(center),
            channels: vec![channel],
        };
        config.validate()?;
        return Ok(config);
    }

    let path = options
        .config
        .as_ref()
        .context("A session needs --config FILE (or --tone-check)")?;
    Ok(SessionConfig::load(path)?)
}

fn run_capture(config: SessionConfig, options: &Options) -> Result<()> {
    let base = options
        .capture
        .clone()
        .context("Streaming needs --capture BASE; live radios attach through the library API")?;

    let limit = options
        .duration
        .map(|secs| (secs * config.transmitter.tx_sample_rate as f64).round() as u64);
    let tx_sample_rate = config.transmitter.tx_sample_rate;

    let transmitter = Transmitter::start(config, Arc::new(FileOpener), ClockMode::Virtual)?;
    let handle = transmitter.spawn(Box::new(CaptureSink::new(&base)), limit)?;

    // Set up Ctrl+C handler
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .ok();

    while handle.is_running() {
        if interrupted.load(Ordering::SeqCst) {
            info!("Interrupted, finishing capture");
            handle.stop();
            break;
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    match handle.wait() {
        Ok(summary) => {
            println!(
                "Wrote {} samples ({:.1} s) to {}.cs8, {} clipped",
                summary.samples_emitted,
                summary.emitted_seconds(tx_sample_rate),
                base.display(),
                summary.clipped_samples
            );
            if options.stats_json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Session failed");
            Err(e.into())
        }
    }
}

fn run_report(options: &Options) -> Result<()> {
    if options.files.is_empty() {
        bail!("--report needs at least one audio file");
    }

    let defaults = ActivitySettings::default();
    let settings = ActivitySettings {
        chunk_ms: options.chunk_ms.unwrap_or(defaults.chunk_ms),
        threshold: options.threshold.unwrap_or(defaults.threshold),
    };

    println!("{}", ActivityReport::CSV_HEADER);
    let mut failures = 0;
    for path in &options.files {
        match analyze_file(&FileOpener, path, &settings) {
            Ok(report) => println!("{}", report.csv_row()),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to analyze file");
                failures += 1;
            }
        }
    }

    if failures == options.files.len() {
        bail!("No file could be analyzed");
    }
    Ok(())
}
