//! # vidgrep
//!
//! Find out whether a keyword appears on screen anywhere in a video, without
//! running OCR on every frame.
//!
//! `vidgrep` samples a bounded set of frames, binarizes them (grayscale +
//! Otsu threshold), and recognizes their text on a small worker pool in
//! fixed-size batches. The search stops at the first frame whose text
//! contains the keyword (case-insensitively). Decoding is powered by FFmpeg
//! via [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next); recognition
//! defaults to the `tesseract` engine and can be replaced through
//! [`TextRecognizer`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use vidgrep::{SearchOptions, VidgrepError};
//!
//! let outcome = vidgrep::search("upload.mp4", "abcd", &SearchOptions::new())?;
//! if outcome.is_found() {
//!     println!("keyword is on screen");
//! }
//! # Ok::<(), VidgrepError>(())
//! ```
//!
//! ### Tuning the search
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use vidgrep::{SearchOptions, TesseractOptions, TesseractRecognizer, VideoSearch};
//!
//! let options = SearchOptions::new()
//!     .with_max_sample_seconds(60.0)
//!     .with_batch_size(4)
//!     .with_max_workers(2)
//!     .with_recognition_timeout(Duration::from_secs(5));
//!
//! let recognizer = TesseractRecognizer::new(TesseractOptions::default().with_language("eng+deu"));
//! let mut search = VideoSearch::new(recognizer, options);
//! let report = search.search("upload.mp4", "Rechnung").unwrap();
//! println!("{} after {} batch(es)", report.outcome, report.batches);
//! ```
//!
//! ## Pipeline
//!
//! - [`VideoSource`]: sequential, forward-only decoding with metadata
//! - [`SamplingPlan`]: which frame indices to inspect
//! - [`prepare`]: downscale, grayscale, Otsu binarization
//! - [`KeywordMatcher`]: recognition plus case-insensitive containment
//! - [`WorkerPool`]: bounded, batched, cancellable OCR workers
//! - [`VideoSearch`]: the state machine tying them together
//!
//! Per-frame failures (a frame that does not decode, an OCR engine crash or
//! timeout) count as "no match" for that frame only. Only a video that
//! cannot be opened or a worker pool that cannot start fails the search.
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | [`search_async`] runs a search on a Tokio blocking thread |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed to build, and the
//! `tesseract` executable must be on `PATH` to use the default recognizer.

#[cfg(feature = "async")]
mod asynchronous;
pub mod config;
mod conversion;
pub mod error;
pub mod ffmpeg;
pub mod metadata;
pub mod plan;
pub mod pool;
pub mod preprocess;
pub mod progress;
pub mod recognize;
pub mod search;
pub mod source;

#[cfg(feature = "async")]
pub use asynchronous::{SearchFuture, search_async, search_async_with};
pub use config::{PreprocessOptions, SamplingMode, SearchOptions};
pub use error::{FrameError, RecognitionError, VidgrepError};
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use metadata::VideoMetadata;
pub use plan::SamplingPlan;
pub use pool::{Batch, FrameVerdict, MatchResult, PoolReport, WorkerPool};
pub use preprocess::{PreparedImage, otsu_threshold, prepare};
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use recognize::{Keyword, KeywordMatcher, TesseractOptions, TesseractRecognizer, TextRecognizer};
pub use search::{SearchOutcome, SearchReport, SearchState, VideoSearch, error_json, search};
pub use source::{FrameSample, FrameSource, VideoSource};
