//! grainlift: enlarge every photo in a folder while keeping its grain.
//!
//! Walks a source directory, runs each supported image through the
//! conservative enhancement pipeline on a worker pool and writes the
//! results under a destination directory. Progress goes to stderr, the
//! run summary to stdout.
//!
//! # Usage
//!
//! ```text
//! grainlift [OPTIONS] <SOURCE> [DEST]
//! ```
//!
//! Logging is controlled with `RUST_LOG` (default `warn`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use grainlift_io::{
    BatchDriver, BatchObserver, ItemReport, ItemStatus, Layout, Progress, RunOptions, RunReport,
    RunStatistics,
};
use grainlift_pipeline::EnhancementConfig;
use tracing_subscriber::EnvFilter;

/// Batch-enlarge photos with classical resampling, gentle denoising and
/// edge-only sharpening.
#[derive(Parser)]
#[command(name = "grainlift", version)]
struct Cli {
    /// Directory containing the images to enhance.
    source: PathBuf,

    /// Output directory. Defaults to `enhanced` next to SOURCE.
    dest: Option<PathBuf>,

    /// Enlargement factor (presets: 1.5, 2, 3).
    #[arg(long, default_value_t = EnhancementConfig::DEFAULT_SCALE_FACTOR)]
    scale: f64,

    /// Worker threads. Defaults to the number of available cores.
    #[arg(long)]
    workers: Option<NonZeroUsize>,

    /// Only process the top level of SOURCE and write outputs directly
    /// into DEST instead of mirroring subdirectories.
    #[arg(long)]
    flat: bool,

    /// Grain amplitude as a fraction of full scale.
    #[arg(long, default_value_t = EnhancementConfig::DEFAULT_TEXTURE_STRENGTH)]
    texture_strength: f32,

    /// Edge sharpening intensity (0 disables).
    #[arg(long, default_value_t = EnhancementConfig::DEFAULT_SHARPEN_INTENSITY)]
    sharpen_intensity: f32,

    /// Fixed seed for grain, for reproducible output.
    #[arg(long)]
    seed: Option<u64>,

    /// Print the run statistics as JSON instead of a text summary.
    #[arg(long)]
    json: bool,

    /// Print a per-stage timing table for every processed image.
    #[arg(long)]
    diagnostics: bool,

    /// Full enhancement config as a JSON string.
    ///
    /// When provided, `--scale`, `--texture-strength`,
    /// `--sharpen-intensity` and `--seed` are ignored. Missing fields take
    /// their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Build an [`EnhancementConfig`] from CLI arguments.
fn config_from_cli(cli: &Cli) -> Result<EnhancementConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(EnhancementConfig {
        scale_factor: cli.scale,
        texture_strength: cli.texture_strength,
        sharpen_intensity: cli.sharpen_intensity,
        grain_seed: cli.seed,
        ..EnhancementConfig::default()
    })
}

/// `<SOURCE parent>/enhanced`, or `./enhanced` for a root source.
///
/// `source` is made absolute first so that `.` resolves to a sibling of
/// the working directory rather than `./enhanced` inside it.
fn default_destination(source: &Path) -> PathBuf {
    let source = std::path::absolute(source).unwrap_or_else(|_| source.to_path_buf());
    source
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("enhanced"), |p| p.join("enhanced"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let options = RunOptions {
        workers: cli.workers,
        layout: if cli.flat { Layout::Flat } else { Layout::Mirror },
        ..RunOptions::default()
    };
    let driver = match BatchDriver::new(config, options) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let destination = cli
        .dest
        .clone()
        .unwrap_or_else(|| default_destination(&cli.source));

    eprintln!("Source: {}", cli.source.display());
    eprintln!("Destination: {}", destination.display());
    eprintln!("Scale: {}x", driver.config().scale_factor);
    eprintln!();

    let mut printer = ProgressPrinter {
        diagnostics: cli.diagnostics,
    };
    match driver.run(&cli.source, &destination, &mut printer) {
        Ok(RunReport::NoImagesFound) => {
            if cli.json {
                println!("null");
            } else {
                println!("No images found in {}", cli.source.display());
            }
            ExitCode::SUCCESS
        }
        Ok(RunReport::Completed(stats)) => {
            if cli.json {
                match serde_json::to_string_pretty(&stats) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("Error serializing statistics: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                print_summary(&stats, &destination);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Prints one line per finished item to stderr, followed by its stage
/// table when `diagnostics` is set.
struct ProgressPrinter {
    diagnostics: bool,
}

impl BatchObserver for ProgressPrinter {
    fn on_start(&mut self, total: usize) {
        eprintln!("Found {total} image(s)");
    }

    fn on_item(&mut self, report: &ItemReport, progress: Progress) {
        eprintln!("{}", item_line(report, progress));
        if self.diagnostics
            && let Some(table) = diagnostics_table(report)
        {
            eprintln!("{table}\n");
        }
    }
}

fn item_line(report: &ItemReport, progress: Progress) -> String {
    let name = report
        .source
        .file_name()
        .map_or_else(|| report.source.display().to_string(), |n| n.to_string_lossy().into_owned());
    let detail = match report.status {
        ItemStatus::Processed => format!(
            "{} -> {}",
            kilobytes(report.original_bytes),
            kilobytes(report.output_bytes)
        ),
        ItemStatus::Cancelled => String::new(),
        ItemStatus::Skipped | ItemStatus::Failed => report.message.clone(),
    };
    format!(
        "[{:>5.1}%] {:<9} {name} {detail}",
        progress.percent(),
        report.status,
    )
}

/// Stage table of a processed item, indented under its progress line.
fn diagnostics_table(report: &ItemReport) -> Option<String> {
    let diagnostics = report.diagnostics.as_ref()?;
    let table = diagnostics.report();
    Some(table.lines().map(|l| format!("    {l}")).collect::<Vec<_>>().join("\n"))
}

#[allow(clippy::cast_precision_loss)]
fn kilobytes(bytes: u64) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.0)
}

fn minutes_seconds(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}min {}s", secs / 60, secs % 60)
}

fn print_summary(stats: &RunStatistics, destination: &Path) {
    println!();
    println!("Summary\n{}", "=".repeat(40));
    println!("Elapsed:    {}", minutes_seconds(stats.elapsed));
    println!("Total:      {}", stats.total);
    println!("Processed:  {}", stats.processed);
    println!("Skipped:    {}", stats.skipped);
    println!("Errors:     {}", stats.errors);
    if stats.cancelled > 0 {
        println!("Cancelled:  {}", stats.cancelled);
    }

    let average = |bytes: Option<f64>| {
        bytes.map_or_else(|| "n/a".to_string(), |b| format!("{:.1} KB", b / 1024.0))
    };
    println!("Avg original:  {}", average(stats.average_original_bytes()));
    println!("Avg processed: {}", average(stats.average_output_bytes()));
    if let Some(ratio) = stats.size_ratio() {
        println!("Size ratio:    {ratio:.2}x");
    }
    println!("Output folder: {}", destination.display());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use grainlift_pipeline::{EnhanceDiagnostics, StageDiagnostics, StageMetrics};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_build_config() {
        let cli = Cli::parse_from([
            "grainlift",
            "photos",
            "--scale",
            "3",
            "--seed",
            "7",
            "--sharpen-intensity",
            "0",
        ]);
        let config = config_from_cli(&cli).unwrap_or_default();
        assert!((config.scale_factor - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.grain_seed, Some(7));
        assert!(config.sharpen_intensity.abs() < f32::EPSILON);
        assert_eq!(config.denoise_below, EnhancementConfig::DEFAULT_DENOISE_BELOW);
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = Cli::parse_from([
            "grainlift",
            "photos",
            "--scale",
            "3",
            "--config-json",
            r#"{"scale_factor": 1.5}"#,
        ]);
        let config = config_from_cli(&cli).unwrap_or_default();
        assert!((config.scale_factor - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn bad_config_json_is_reported() {
        let cli = Cli::parse_from(["grainlift", "photos", "--config-json", "{nope"]);
        assert!(config_from_cli(&cli).is_err());
    }

    #[test]
    fn destination_defaults_to_sibling_folder() {
        assert_eq!(
            default_destination(Path::new("/home/me/photos")),
            PathBuf::from("/home/me/enhanced")
        );
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(default_destination(Path::new("photos")), cwd.join("enhanced"));
    }

    #[test]
    fn dot_source_gets_a_sibling_not_a_child() {
        let cwd = std::env::current_dir().unwrap();
        let dest = default_destination(Path::new("."));
        assert!(dest.is_absolute());
        assert!(!dest.starts_with(&cwd));
        assert_eq!(Some(dest.as_path()), cwd.parent().map(|p| p.join("enhanced")).as_deref());
    }

    fn report_with(diagnostics: Option<EnhanceDiagnostics>) -> ItemReport {
        ItemReport {
            source: PathBuf::from("photos/beach.jpg"),
            destination: PathBuf::from("enhanced/beach.jpg"),
            status: ItemStatus::Processed,
            message: "success".to_string(),
            original_bytes: 2048,
            output_bytes: 4096,
            gates: None,
            diagnostics,
            duration: Duration::from_millis(30),
        }
    }

    #[test]
    fn diagnostics_flag_parses() {
        assert!(Cli::parse_from(["grainlift", "photos", "--diagnostics"]).diagnostics);
        assert!(!Cli::parse_from(["grainlift", "photos"]).diagnostics);
    }

    #[test]
    fn diagnostics_table_lists_recorded_stages() {
        let diagnostics = EnhanceDiagnostics {
            encode: Some(StageDiagnostics {
                duration: Duration::from_millis(12),
                metrics: StageMetrics::Encode {
                    format: "jpeg".to_string(),
                    output_bytes: 4096,
                },
            }),
            ..EnhanceDiagnostics::default()
        };
        let table = diagnostics_table(&report_with(Some(diagnostics))).unwrap();
        assert!(table.lines().all(|l| l.starts_with("    ")));
        assert!(table.contains("Encode"));
        assert!(table.contains("Total:"));
        assert!(!table.contains("Denoise"));

        assert!(diagnostics_table(&report_with(None)).is_none());
    }

    #[test]
    fn item_line_shows_sizes() {
        let line = item_line(
            &report_with(None),
            Progress {
                completed: 1,
                total: 4,
            },
        );
        assert_eq!(line, "[ 25.0%] processed beach.jpg 2.0 KB -> 4.0 KB");
    }

    #[test]
    fn elapsed_is_minutes_and_seconds() {
        assert_eq!(minutes_seconds(Duration::from_millis(75_400)), "1min 15s");
        assert_eq!(minutes_seconds(Duration::from_secs(9)), "0min 9s");
    }

    #[test]
    fn sizes_in_kilobytes() {
        assert_eq!(kilobytes(2048), "2.0 KB");
        assert_eq!(kilobytes(0), "0.0 KB");
    }
}
