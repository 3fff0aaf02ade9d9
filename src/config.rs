//! Search configuration.
//!
//! [`SearchOptions`] is a builder that threads the sampling budget, batch and
//! worker limits, preprocessing settings, recognition timeout, progress
//! callbacks and cancellation tokens through a search without relying on any
//! process-wide state.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use vidgrep::{CancellationToken, SearchOptions};
//!
//! let token = CancellationToken::new();
//! let options = SearchOptions::new()
//!     .with_max_sample_seconds(60.0)
//!     .with_batch_size(8)
//!     .with_max_workers(2)
//!     .with_recognition_timeout(Duration::from_secs(5))
//!     .with_cancellation(token.clone());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Default number of seconds of footage the time-budgeted planner samples.
pub const DEFAULT_MAX_SAMPLE_SECONDS: f64 = 30.0;
/// Default number of frames per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;
/// Default upper bound on concurrent OCR workers.
pub const DEFAULT_MAX_WORKERS: usize = 3;
/// Default bounding box frames are downscaled into before recognition.
pub const DEFAULT_TARGET_RESOLUTION: (u32, u32) = (640, 360);
/// Default limit on a single recognition call.
pub const DEFAULT_RECOGNITION_TIMEOUT: Duration = Duration::from_secs(10);

/// How frame indices are chosen from the video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingMode {
    /// Spread at most `fps × max_sample_seconds` samples evenly across the
    /// whole video. This is the default.
    #[default]
    TimeBudget,
    /// Legacy fixed stride: inspect every Nth raw frame (the Nth, 2Nth, …),
    /// regardless of the time budget.
    Stride(u64),
}

/// Frame preprocessing settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessOptions {
    /// Bounding box `(width, height)` frames are downscaled to fit inside.
    /// `None` keeps the decoded resolution.
    pub target_resolution: Option<(u32, u32)>,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            target_resolution: Some(DEFAULT_TARGET_RESOLUTION),
        }
    }
}

impl PreprocessOptions {
    /// Resolve the output dimensions for a source frame.
    ///
    /// The source is scaled to fit inside the target box with its aspect
    /// ratio preserved. Frames that already fit are never upscaled.
    ///
    /// Returns `(width, height)`.
    pub fn resolve_dimensions(&self, source_width: u32, source_height: u32) -> (u32, u32) {
        let Some((max_width, max_height)) = self.target_resolution else {
            return (source_width, source_height);
        };

        if source_width == 0 || source_height == 0 {
            return (source_width, source_height);
        }
        if source_width <= max_width && source_height <= max_height {
            return (source_width, source_height);
        }

        let ratio = f64::min(
            max_width as f64 / source_width as f64,
            max_height as f64 / source_height as f64,
        );
        let width = (source_width as f64 * ratio).round() as u32;
        let height = (source_height as f64 * ratio).round() as u32;
        (width.clamp(1, max_width.max(1)), height.clamp(1, max_height.max(1)))
    }
}

/// Configuration for a keyword search.
///
/// All fields have defaults matching the crate constants: 30 seconds of
/// sampled footage, batches of 5 frames, at most 3 workers, frames fitted
/// into 640×360, and a 10 second limit per recognition call.
#[derive(Clone)]
pub struct SearchOptions {
    pub(crate) max_sample_seconds: f64,
    pub(crate) sampling: SamplingMode,
    pub(crate) batch_size: usize,
    pub(crate) max_workers: usize,
    pub(crate) preprocess: PreprocessOptions,
    pub(crate) recognition_timeout: Duration,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Debug for SearchOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SearchOptions")
            .field("max_sample_seconds", &self.max_sample_seconds)
            .field("sampling", &self.sampling)
            .field("batch_size", &self.batch_size)
            .field("max_workers", &self.max_workers)
            .field("preprocess", &self.preprocess)
            .field("recognition_timeout", &self.recognition_timeout)
            .field("has_cancellation", &self.cancellation.is_some())
            .finish()
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchOptions {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self {
            max_sample_seconds: DEFAULT_MAX_SAMPLE_SECONDS,
            sampling: SamplingMode::TimeBudget,
            batch_size: DEFAULT_BATCH_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
            preprocess: PreprocessOptions::default(),
            recognition_timeout: DEFAULT_RECOGNITION_TIMEOUT,
            progress: Arc::new(NoOpProgress),
            cancellation: None,
        }
    }

    /// Set how many seconds of footage the time-budgeted planner may sample.
    ///
    /// Negative and non-finite values are treated as zero, which yields an
    /// empty plan.
    #[must_use]
    pub fn with_max_sample_seconds(mut self, seconds: f64) -> Self {
        self.max_sample_seconds = if seconds.is_finite() {
            seconds.max(0.0)
        } else {
            0.0
        };
        self
    }

    /// Choose the frame sampling mode.
    ///
    /// A [`SamplingMode::Stride`] of zero is clamped to 1.
    #[must_use]
    pub fn with_sampling(mut self, mode: SamplingMode) -> Self {
        self.sampling = match mode {
            SamplingMode::Stride(step) => SamplingMode::Stride(step.max(1)),
            other => other,
        };
        self
    }

    /// Set how many frames are processed together. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the maximum number of concurrent OCR workers.
    ///
    /// Clamped to a minimum of 1. The pool never uses more threads than the
    /// machine's available parallelism, whatever this is set to.
    #[must_use]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    /// Set the bounding box frames are downscaled into before recognition.
    ///
    /// Pass `None` to recognize frames at their decoded resolution.
    #[must_use]
    pub fn with_target_resolution(mut self, resolution: Option<(u32, u32)>) -> Self {
        self.preprocess.target_resolution = resolution;
        self
    }

    /// Set the time limit for a single recognition call.
    #[must_use]
    pub fn with_recognition_timeout(mut self, timeout: Duration) -> Self {
        self.recognition_timeout = timeout;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled the search stops at the next batch
    /// boundary and returns [`VidgrepError::Cancelled`](crate::VidgrepError::Cancelled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn max_sample_seconds(&self) -> f64 {
        self.max_sample_seconds
    }

    pub fn sampling(&self) -> SamplingMode {
        self.sampling
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn preprocess(&self) -> &PreprocessOptions {
        &self.preprocess
    }

    pub fn recognition_timeout(&self) -> Duration {
        self.recognition_timeout
    }

    /// Returns `true` if the caller has requested cancellation.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}
