//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressCallback`] for monitoring a running search,
//! [`CancellationToken`] for cooperative cancellation, and [`ProgressInfo`]
//! for progress snapshots.
//!
//! The same [`CancellationToken`] type is used internally as the early-exit
//! signal shared between the coordinator and the OCR workers: the first
//! worker that finds the keyword cancels it, and every other worker observes
//! the flag before starting its next step.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vidgrep::{ProgressCallback, ProgressInfo, SearchOptions, VidgrepError};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{:?}] {pct:.1}% complete", info.operation);
//!         }
//!     }
//! }
//!
//! let options = SearchOptions::new().with_progress(Arc::new(PrintProgress));
//! let outcome = vidgrep::search("input.mp4", "invoice", &options)?;
//! # Ok::<(), VidgrepError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// The kind of work a progress report refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Sequentially decoding the video up to the last sampled frame.
    FrameDecoding,
    /// Preprocessing and recognizing text in sampled frames.
    TextRecognition,
}

/// A snapshot of search progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// How many items (frames) have been processed so far.
    pub current: u64,
    /// Total items expected, if known ahead of time.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the operation started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// The frame index most recently processed.
    pub current_frame: Option<u64>,
}

/// Trait for receiving progress updates during a search.
///
/// Implementations must be [`Send`] and [`Sync`] because callbacks may be
/// invoked from worker threads.
///
/// Progress callbacks are **infallible**: they observe but cannot halt
/// the search. Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during a search.
    fn on_progress(&self, info: &ProgressInfo);
}

/// A no-op implementation that discards all progress notifications.
///
/// This is the default when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads; call
/// [`cancel`](CancellationToken::cancel) from any thread to request
/// cancellation. All clones observe the same flag.
///
/// # Example
///
/// ```
/// use vidgrep::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token will observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Internal helper that tracks progress timing and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    current: u64,
    report_every: u64,
    start_time: Instant,
    items_since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        report_every: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            report_every: report_every.max(1),
            start_time: Instant::now(),
            items_since_last_report: 0,
        }
    }

    /// Record `count` completed items and fire the callback once the
    /// reporting threshold is reached.
    pub(crate) fn advance_by(&mut self, count: u64, frame_index: Option<u64>) {
        self.current += count;
        self.items_since_last_report += count;

        if self.items_since_last_report >= self.report_every {
            self.report(frame_index);
            self.items_since_last_report = 0;
        }
    }

    /// Unconditionally emit a final progress report.
    pub(crate) fn finish(&mut self) {
        self.report(None);
    }

    fn report(&self, frame_index: Option<u64>) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&t| t > 0)
            .map(|t| (self.current as f32 / t as f32) * 100.0);

        let estimated_remaining = if self.current > 0 {
            self.total.map(|t| {
                let remaining = t.saturating_sub(self.current);
                elapsed.mul_f64(remaining as f64 / self.current as f64)
            })
        } else {
            None
        };

        let info = ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_frame: frame_index,
        };

        self.callback.on_progress(&info);
    }
}
