//! Bounded OCR worker pool.
//!
//! [`WorkerPool`] runs preprocessing and recognition for sampled frames on a
//! dedicated [`rayon`] thread pool. Frames arrive as a lazy iterator and are
//! grouped into fixed-size [`Batch`]es:
//!
//! - batches run one after another, frames within a batch run concurrently;
//! - a batch's frames are moved into the workers and dropped before the next
//!   batch is pulled from the iterator, so at most `batch_size` frames are
//!   alive at any time;
//! - the first worker that finds the keyword cancels the shared
//!   [`CancellationToken`]; workers check it before preprocessing and before
//!   recognition, and no further batch is started.
//!
//! A frame that fails (decode, preprocessing, recognition, even a panicking
//! engine) is recorded as [`FrameVerdict::Failed`] and counts as no match.

use std::{
    num::NonZero,
    ops::ControlFlow,
    panic::{self, AssertUnwindSafe},
};

use rayon::{
    ThreadPool, ThreadPoolBuilder,
    iter::{IntoParallelIterator, ParallelIterator},
};

use crate::config::{PreprocessOptions, SearchOptions};
use crate::error::{FrameError, VidgrepError};
use crate::preprocess;
use crate::progress::CancellationToken;
use crate::recognize::{Keyword, KeywordMatcher};
use crate::source::FrameSample;

/// What happened to one sampled frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameVerdict {
    /// The keyword was recognized in the frame.
    Match,
    /// The frame was recognized and the keyword is absent.
    NoMatch,
    /// Processing failed; treated as no match.
    Failed(FrameError),
    /// Cancellation was observed before the frame's result was needed.
    Skipped,
}

/// Per-frame result produced by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Frame index.
    pub index: u64,
    /// Outcome for this frame.
    pub verdict: FrameVerdict,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.verdict == FrameVerdict::Match
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.verdict, FrameVerdict::Failed(_))
    }
}

/// A group of sampled frames scheduled as one unit.
///
/// Entries are `Err` for planned frames that failed to decode; they are
/// recorded as failed without reaching a worker.
#[derive(Debug)]
pub struct Batch {
    number: usize,
    frames: Vec<Result<FrameSample, FrameError>>,
}

impl Batch {
    pub fn new(number: usize, frames: Vec<Result<FrameSample, FrameError>>) -> Self {
        Self { number, frames }
    }

    /// Zero-based position of this batch in the search.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Aggregate of every batch a [`WorkerPool::run`] call processed.
#[derive(Debug, Clone, Default)]
pub struct PoolReport {
    /// Results of all dispatched frames, batch by batch.
    pub results: Vec<MatchResult>,
    /// Number of batches dispatched.
    pub batches: usize,
    /// Lowest matching frame index in the batch that produced the first
    /// match.
    pub first_match: Option<u64>,
}

impl PoolReport {
    pub fn found(&self) -> bool {
        self.first_match.is_some()
    }
}

/// Fixed-size pool of OCR workers.
pub struct WorkerPool {
    thread_pool: ThreadPool,
    workers: usize,
    batch_size: usize,
    preprocess: PreprocessOptions,
}

impl WorkerPool {
    /// Create a pool sized from the options.
    ///
    /// The pool has `min(max_workers, available parallelism)` threads.
    ///
    /// # Errors
    ///
    /// Returns [`VidgrepError::WorkerPool`] if the worker threads cannot be
    /// spawned.
    pub fn new(options: &SearchOptions) -> Result<Self, VidgrepError> {
        let available = std::thread::available_parallelism()
            .map(NonZero::get)
            .unwrap_or(1);
        let workers = options.max_workers.min(available).max(1);

        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("vidgrep-ocr-{index}"))
            .build()
            .map_err(|error| VidgrepError::WorkerPool(error.to_string()))?;

        log::debug!(
            "Started OCR worker pool: {workers} worker(s), batch size {}",
            options.batch_size,
        );

        Ok(Self {
            thread_pool,
            workers,
            batch_size: options.batch_size.max(1),
            preprocess: options.preprocess.clone(),
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Process `frames` batch by batch until a match, exhaustion, or a stop
    /// request from `on_batch`.
    ///
    /// `frames` is pulled lazily: nothing beyond the current batch is taken
    /// from it, and nothing at all once `token` is cancelled. `on_batch`
    /// sees each batch's results after the batch has fully completed.
    pub fn run<I, F>(
        &self,
        frames: I,
        keyword: &Keyword,
        matcher: &KeywordMatcher,
        token: &CancellationToken,
        mut on_batch: F,
    ) -> PoolReport
    where
        I: IntoIterator<Item = Result<FrameSample, FrameError>>,
        F: FnMut(&[MatchResult]) -> ControlFlow<()>,
    {
        let mut frames = frames.into_iter();
        let mut report = PoolReport::default();

        loop {
            if token.is_cancelled() {
                break;
            }

            let batch_frames: Vec<_> = frames.by_ref().take(self.batch_size).collect();
            if batch_frames.is_empty() {
                break;
            }

            let batch = Batch::new(report.batches, batch_frames);
            let results = self.run_batch(batch, keyword, matcher, token);
            report.batches += 1;

            let first_match = results
                .iter()
                .filter(|result| result.is_match())
                .map(|result| result.index)
                .min();
            let stop = on_batch(&results);
            report.results.extend(results);

            if let Some(index) = first_match {
                report.first_match = Some(index);
                break;
            }
            if stop.is_break() {
                break;
            }
        }

        report
    }

    /// Run one batch to completion and return a result per frame.
    ///
    /// Result order follows the batch order, but frames are processed
    /// concurrently and may finish in any order.
    pub fn run_batch(
        &self,
        batch: Batch,
        keyword: &Keyword,
        matcher: &KeywordMatcher,
        token: &CancellationToken,
    ) -> Vec<MatchResult> {
        let Batch { number, frames } = batch;
        log::debug!("Dispatching batch {number} ({} frame(s))", frames.len());

        self.thread_pool.install(|| {
            frames
                .into_par_iter()
                .map(|frame| self.process_frame(frame, keyword, matcher, token))
                .collect()
        })
    }

    fn process_frame(
        &self,
        frame: Result<FrameSample, FrameError>,
        keyword: &Keyword,
        matcher: &KeywordMatcher,
        token: &CancellationToken,
    ) -> MatchResult {
        let sample = match frame {
            Ok(sample) => sample,
            Err(error) => {
                log::warn!("{error}; treating frame as no match");
                return MatchResult {
                    index: error.index(),
                    verdict: FrameVerdict::Failed(error),
                };
            }
        };
        let index = sample.index;

        if token.is_cancelled() {
            return MatchResult {
                index,
                verdict: FrameVerdict::Skipped,
            };
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let prepared = preprocess::prepare(sample, &self.preprocess)?;
            if token.is_cancelled() {
                return Ok(None);
            }
            matcher.matches_keyword(&prepared, keyword).map(Some)
        }));

        let verdict = match outcome {
            Ok(Ok(Some(true))) => {
                token.cancel();
                log::debug!("Keyword found in frame {index}");
                FrameVerdict::Match
            }
            Ok(Ok(Some(false))) if token.is_cancelled() => FrameVerdict::Skipped,
            Ok(Ok(Some(false))) => FrameVerdict::NoMatch,
            Ok(Ok(None)) => FrameVerdict::Skipped,
            Ok(Err(error)) => {
                log::warn!("{error}; treating frame as no match");
                FrameVerdict::Failed(error)
            }
            Err(_) => {
                log::warn!("Worker panicked on frame {index}; treating frame as no match");
                FrameVerdict::Failed(FrameError::Panicked { index })
            }
        };

        MatchResult { index, verdict }
    }
}
