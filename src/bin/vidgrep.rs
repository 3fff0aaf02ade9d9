use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use vidgrep::{
    FfmpegLogLevel, FrameSource, OperationType, ProgressCallback, ProgressInfo, SamplingMode,
    SamplingPlan, SearchOptions, SearchOutcome, TesseractOptions, TesseractRecognizer,
    VideoSearch, VideoSource, VidgrepError,
};

const CLI_AFTER_HELP: &str = "Examples:\n  vidgrep search upload.mp4 abcd\n  vidgrep search upload.mp4 \"total due\" --max-seconds 60 --workers 2 --json\n  vidgrep search upload.mp4 abcd --every 100\n  vidgrep plan upload.mp4 --json\n  vidgrep completions zsh > _vidgrep\n\nExit status: 0 when found, 1 when not found, 2 on error.";

#[derive(Debug, Parser)]
#[command(
    name = "vidgrep",
    version,
    about = "Check whether a keyword appears on screen in a video",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional output on stderr.
    #[arg(long, global = true)]
    verbose: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Clone, clap::Args)]
struct SamplingArgs {
    /// Seconds of footage to sample, spread across the whole video.
    #[arg(long, default_value_t = vidgrep::config::DEFAULT_MAX_SAMPLE_SECONDS)]
    max_seconds: f64,

    /// Legacy mode: inspect every Nth frame instead of a time budget.
    #[arg(long)]
    every: Option<u64>,
}

impl SamplingArgs {
    fn apply(&self, options: SearchOptions) -> SearchOptions {
        let options = options.with_max_sample_seconds(self.max_seconds);
        match self.every {
            Some(step) => options.with_sampling(SamplingMode::Stride(step)),
            None => options,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Search a video for a keyword.
    #[command(
        about = "Search a video for a keyword",
        after_help = "Examples:\n  vidgrep search upload.mp4 abcd --json\n  vidgrep search upload.mp4 abcd --resolution 1280x720 --timeout-ms 20000 --progress"
    )]
    Search {
        /// Input video path.
        input: PathBuf,
        /// Keyword to look for (case-insensitive).
        keyword: String,
        #[command(flatten)]
        sampling: SamplingArgs,
        /// Frames per batch.
        #[arg(long, default_value_t = vidgrep::config::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Maximum concurrent OCR workers.
        #[arg(long, default_value_t = vidgrep::config::DEFAULT_MAX_WORKERS)]
        workers: usize,
        /// Bounding box frames are downscaled into, as WIDTHxHEIGHT.
        #[arg(long, default_value = "640x360", conflicts_with = "native_resolution")]
        resolution: String,
        /// Recognize frames at their decoded resolution.
        #[arg(long)]
        native_resolution: bool,
        /// Time limit for one recognition call, in milliseconds.
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
        /// Tesseract language pack(s).
        #[arg(long, default_value = "eng")]
        lang: String,
        /// Tesseract page segmentation mode.
        #[arg(long)]
        psm: Option<u8>,
        /// Path to the tesseract executable.
        #[arg(long, default_value = "tesseract")]
        tesseract: PathBuf,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
        /// Show a progress bar.
        #[arg(long)]
        progress: bool,
    },

    /// Print video metadata and the frames a search would sample.
    #[command(about = "Show the sampling plan for a video")]
    Plan {
        /// Input video path.
        input: PathBuf,
        #[command(flatten)]
        sampling: SamplingArgs,
        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn parse_resolution(value: &str) -> Option<(u32, u32)> {
    let (width, height) = value.to_ascii_lowercase().split_once('x').map(|(w, h)| {
        (w.trim().parse::<u32>().ok(), h.trim().parse::<u32>().ok())
    })?;
    match (width?, height?) {
        (0, _) | (_, 0) => None,
        dimensions => Some(dimensions),
    }
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let level = match &global.log_level {
        Some(level) => level.parse::<FfmpegLogLevel>()?,
        None => FfmpegLogLevel::Error,
    };
    vidgrep::set_ffmpeg_log_level(level);
    Ok(())
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} frames {msg}",
        )?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.operation != OperationType::TextRecognition {
            return;
        }
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        if let Some(frame) = info.current_frame {
            self.bar.set_message(format!("(frame {frame})"));
        }
    }
}

/// Whether the subcommand asked for machine-readable output.
fn wants_json(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Search { json: true, .. } | Commands::Plan { json: true, .. }
    )
}

fn print_failure(message: &str, as_json: bool) {
    if as_json {
        println!("{}", json!({ "error": message }));
    } else {
        eprintln!("{} {message}", "error:".red().bold());
    }
}

fn print_error(error: &VidgrepError, as_json: bool) {
    if as_json {
        println!("{}", vidgrep::error_json(error));
    } else {
        print_failure(&error.to_string(), false);
    }
}

fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let as_json = wants_json(&cli.command);
    if let Err(error) = apply_global_options(&cli.global) {
        print_failure(&error.to_string(), as_json);
        return Ok(ExitCode::from(2));
    }

    match cli.command {
        Commands::Search {
            input,
            keyword,
            sampling,
            batch_size,
            workers,
            resolution,
            native_resolution,
            timeout_ms,
            lang,
            psm,
            tesseract,
            json,
            progress,
        } => {
            let target_resolution = if native_resolution {
                None
            } else {
                match parse_resolution(&resolution) {
                    Some(dimensions) => Some(dimensions),
                    None => {
                        print_failure(
                            &format!("invalid --resolution: {resolution} (expected WIDTHxHEIGHT)"),
                            json,
                        );
                        return Ok(ExitCode::from(2));
                    }
                }
            };

            let mut options = sampling
                .apply(SearchOptions::new())
                .with_batch_size(batch_size)
                .with_max_workers(workers)
                .with_target_resolution(target_resolution)
                .with_recognition_timeout(Duration::from_millis(timeout_ms));

            let progress_bar = if progress {
                let terminal = Arc::new(TerminalProgress::new()?);
                options = options.with_progress(terminal.clone());
                Some(terminal)
            } else {
                None
            };

            let recognizer = TesseractRecognizer::new(
                TesseractOptions::default()
                    .with_executable(tesseract)
                    .with_language(lang)
                    .with_page_segmentation_mode(psm),
            );
            if !recognizer.is_available() {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!(
                        "{} did not respond to --version; every frame may fail recognition",
                        recognizer.options().executable.display()
                    )
                    .yellow()
                );
            }

            let mut search = VideoSearch::new(recognizer, options);
            let result = search.search(&input, &keyword);

            if let Some(terminal) = progress_bar {
                terminal.bar.finish_and_clear();
            }

            let report = match result {
                Ok(report) => report,
                Err(error) => {
                    print_error(&error, json);
                    return Ok(ExitCode::from(2));
                }
            };

            if cli.global.verbose {
                eprintln!(
                    "planned {} frame(s), decoded {}, recognized {}, failed {}, {} batch(es)",
                    report.planned_frames,
                    report.decoded_frames,
                    report.processed_frames,
                    report.failed_frames,
                    report.batches,
                );
            }

            if json {
                println!("{}", report.outcome.to_json());
            } else {
                match report.outcome {
                    SearchOutcome::Found { frame_index } => println!(
                        "{} {}",
                        "found:".green().bold(),
                        format!("{keyword:?} appears in frame {frame_index}").green()
                    ),
                    SearchOutcome::NotFound => println!(
                        "{} {}",
                        "not found:".yellow().bold(),
                        format!("{keyword:?} does not appear in the sampled frames").yellow()
                    ),
                }
            }

            Ok(if report.outcome.is_found() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
        Commands::Plan {
            input,
            sampling,
            json,
        } => {
            let options = sampling.apply(SearchOptions::new());
            let mut source = match VideoSource::open(&input) {
                Ok(source) => source,
                Err(error) => {
                    print_error(&error, json);
                    return Ok(ExitCode::from(2));
                }
            };
            let metadata = source.metadata().clone();
            source.close();

            let plan = SamplingPlan::new(&metadata, &options);

            if json {
                let payload = json!({
                    "format": metadata.format,
                    "codec": metadata.codec,
                    "width": metadata.width,
                    "height": metadata.height,
                    "frames_per_second": metadata.frames_per_second,
                    "frame_count": metadata.frame_count,
                    "duration_seconds": metadata.duration.as_secs_f64(),
                    "sampled_frames": plan.indices(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Format: {} ({})", metadata.format, metadata.codec);
                println!(
                    "Video: {}x{} @ {:.2} fps, {} frames, {:.2}s",
                    metadata.width,
                    metadata.height,
                    metadata.frames_per_second,
                    metadata.frame_count,
                    metadata.duration.as_secs_f64(),
                );
                println!("Sampled frames: {}", plan.len());
                if cli.global.verbose {
                    let indices: Vec<String> =
                        plan.indices().iter().map(ToString::to_string).collect();
                    println!("{}", indices.join(" "));
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "vidgrep", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{} {error}", "error:".red().bold());
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, parse_resolution, wants_json};

    #[test]
    fn json_flag_is_seen_before_option_validation() {
        let cli = Cli::try_parse_from([
            "vidgrep",
            "--log-level",
            "loud",
            "search",
            "upload.mp4",
            "abcd",
            "--resolution",
            "wide",
            "--json",
        ])
        .expect("arguments parse");
        assert!(wants_json(&cli.command));
        let level = cli.global.log_level.as_deref().expect("log level given");
        assert!(level.parse::<vidgrep::FfmpegLogLevel>().is_err());

        let cli = Cli::try_parse_from(["vidgrep", "plan", "upload.mp4", "--json"]).expect("arguments parse");
        assert!(wants_json(&cli.command));

        let cli = Cli::try_parse_from(["vidgrep", "search", "upload.mp4", "abcd"]).expect("arguments parse");
        assert!(!wants_json(&cli.command));
    }

    #[test]
    fn parse_resolution_formats() {
        assert_eq!(parse_resolution("640x360"), Some((640, 360)));
        assert_eq!(parse_resolution("1280X720"), Some((1280, 720)));
        assert_eq!(parse_resolution(" 320 x 240 "), Some((320, 240)));
        assert_eq!(parse_resolution("640"), None);
        assert_eq!(parse_resolution("0x360"), None);
        assert_eq!(parse_resolution("axb"), None);
    }
}
