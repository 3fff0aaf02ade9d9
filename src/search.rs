//! Search coordination.
//!
//! [`VideoSearch`] drives one keyword query end to end:
//!
//! ```text
//! Idle → Opening → Sampling → Searching → Found | NotFound | Failed
//! ```
//!
//! It opens the video, computes the [`SamplingPlan`], decodes the video
//! sequentially (only planned frames are converted and kept), feeds the
//! planned frames to the [`WorkerPool`] in batches, and ORs the per-frame
//! results. The first match ends the search; no later frame is decoded. The
//! frame source is closed on every path into a terminal state.
//!
//! # Example
//!
//! ```no_run
//! use vidgrep::{SearchOptions, SearchOutcome, TesseractRecognizer, VideoSearch, VidgrepError};
//!
//! let mut search = VideoSearch::new(TesseractRecognizer::default(), SearchOptions::new());
//! let report = search.search("input.mp4", "abcd")?;
//! match report.outcome {
//!     SearchOutcome::Found { frame_index } => println!("found in frame {frame_index}"),
//!     SearchOutcome::NotFound => println!("not found"),
//! }
//! # Ok::<(), VidgrepError>(())
//! ```

use std::{fmt, fs, ops::ControlFlow, path::Path};

use serde_json::{Value, json};

use crate::config::SearchOptions;
use crate::error::{FrameError, VidgrepError};
use crate::plan::SamplingPlan;
use crate::pool::{FrameVerdict, WorkerPool};
use crate::progress::{CancellationToken, OperationType, ProgressTracker};
use crate::recognize::{Keyword, KeywordMatcher, TesseractRecognizer, TextRecognizer};
use crate::source::{FrameSample, FrameSource, VideoSource};

/// How often decoding progress is reported, in decoded frames.
const DECODE_PROGRESS_INTERVAL: u64 = 30;

/// Lifecycle of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchState {
    #[default]
    Idle,
    Opening,
    Sampling,
    Searching,
    Found,
    NotFound,
    Failed,
}

impl SearchState {
    /// `Found`, `NotFound` and `Failed` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, SearchState::Found | SearchState::NotFound | SearchState::Failed)
    }
}

/// Definite answer of a successful search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The keyword was recognized in the frame with this index.
    Found {
        /// Index of the matching frame.
        frame_index: u64,
    },
    /// No sampled frame contained the keyword.
    NotFound,
}

impl SearchOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found { .. })
    }

    /// `{"found": true}` or `{"found": false}`.
    pub fn to_json(&self) -> Value {
        json!({ "found": self.is_found() })
    }
}

impl fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchOutcome::Found { frame_index } => write!(f, "found (frame {frame_index})"),
            SearchOutcome::NotFound => write!(f, "not found"),
        }
    }
}

/// `{"error": "<message>"}` for a failed search.
pub fn error_json(error: &VidgrepError) -> Value {
    json!({ "error": error.to_string() })
}

/// Outcome plus counters describing the work a search performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchReport {
    pub outcome: SearchOutcome,
    /// Frames in the sampling plan.
    pub planned_frames: usize,
    /// Frames pulled from the decoder, sampled or not.
    pub decoded_frames: u64,
    /// Sampled frames that reached a verdict other than skipped.
    pub processed_frames: usize,
    /// Sampled frames whose processing failed.
    pub failed_frames: usize,
    /// Batches dispatched to the worker pool.
    pub batches: usize,
}

impl SearchReport {
    fn empty_plan() -> Self {
        Self {
            outcome: SearchOutcome::NotFound,
            planned_frames: 0,
            decoded_frames: 0,
            processed_frames: 0,
            failed_frames: 0,
            batches: 0,
        }
    }
}

/// A reusable keyword search over videos.
pub struct VideoSearch {
    matcher: KeywordMatcher,
    options: SearchOptions,
    state: SearchState,
}

impl fmt::Debug for VideoSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoSearch")
            .field("options", &self.options)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl VideoSearch {
    /// Create a search that recognizes text with `recognizer`.
    pub fn new<R: TextRecognizer + 'static>(recognizer: R, options: SearchOptions) -> Self {
        let matcher = KeywordMatcher::new(recognizer, options.recognition_timeout);
        Self {
            matcher,
            options,
            state: SearchState::Idle,
        }
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// State reached by the most recent search.
    pub fn state(&self) -> SearchState {
        self.state
    }

    /// Search the video at `path` for `keyword`.
    ///
    /// The file is opened read-only and released before this returns. An
    /// empty (0-byte) file has no frames and is reported as not found
    /// without being handed to the decoder.
    ///
    /// # Errors
    ///
    /// - [`VidgrepError::EmptyKeyword`] if the keyword is blank.
    /// - [`VidgrepError::FileOpen`] if the video cannot be opened.
    /// - [`VidgrepError::WorkerPool`] if no worker can be started.
    /// - [`VidgrepError::Cancelled`] if the caller's token was cancelled.
    pub fn search<P: AsRef<Path>>(&mut self, path: P, keyword: &str) -> Result<SearchReport, VidgrepError> {
        self.state = SearchState::Idle;
        let keyword = match Keyword::new(keyword) {
            Ok(keyword) => keyword,
            Err(error) => {
                self.transition(SearchState::Failed);
                return Err(error);
            }
        };

        self.transition(SearchState::Opening);
        let path = path.as_ref();
        if fs::metadata(path).is_ok_and(|metadata| metadata.is_file() && metadata.len() == 0) {
            log::info!("{} is empty; no frames to search", path.display());
            self.transition(SearchState::Sampling);
            self.transition(SearchState::NotFound);
            return Ok(SearchReport::empty_plan());
        }

        let mut source = match VideoSource::open(path) {
            Ok(source) => source,
            Err(error) => {
                log::info!("Search failed: {error}");
                self.transition(SearchState::Failed);
                return Err(error);
            }
        };

        self.search_source(&mut source, &keyword)
    }

    /// Run the search on an already-open frame source.
    ///
    /// The source is closed before this returns, whatever the outcome.
    pub fn search_source<S: FrameSource>(
        &mut self,
        source: &mut S,
        keyword: &Keyword,
    ) -> Result<SearchReport, VidgrepError> {
        if self.state != SearchState::Opening {
            self.state = SearchState::Idle;
        }

        let result = self.run_pipeline(source, keyword);
        source.close();

        match &result {
            Ok(report) => {
                log::info!(
                    "Search for {:?}: {} ({} of {} planned frames processed, {} failed, {} decoded)",
                    keyword.as_str(),
                    report.outcome,
                    report.processed_frames,
                    report.planned_frames,
                    report.failed_frames,
                    report.decoded_frames,
                );
                self.transition(if report.outcome.is_found() {
                    SearchState::Found
                } else {
                    SearchState::NotFound
                });
            }
            Err(error) => {
                log::info!("Search for {:?} failed: {error}", keyword.as_str());
                self.transition(SearchState::Failed);
            }
        }

        result
    }

    fn run_pipeline<S: FrameSource>(
        &mut self,
        source: &mut S,
        keyword: &Keyword,
    ) -> Result<SearchReport, VidgrepError> {
        self.transition(SearchState::Sampling);
        if self.options.is_cancelled() {
            return Err(VidgrepError::Cancelled);
        }

        let plan = SamplingPlan::new(source.metadata(), &self.options);
        if plan.is_empty() {
            log::debug!("Sampling plan is empty; nothing to search");
            return Ok(SearchReport::empty_plan());
        }

        let pool = WorkerPool::new(&self.options)?;
        self.transition(SearchState::Searching);

        let token = CancellationToken::new();
        let options = &self.options;
        let mut frames = SampledFrames::new(source, &plan, &token, options);
        let mut recognition_progress = ProgressTracker::new(
            options.progress.clone(),
            OperationType::TextRecognition,
            Some(plan.len() as u64),
            1,
        );

        let pool_report = pool.run(&mut frames, keyword, &self.matcher, &token, |results| {
            recognition_progress.advance_by(
                results.len() as u64,
                results.iter().map(|result| result.index).max(),
            );
            if options.is_cancelled() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        recognition_progress.finish();
        let decoded_frames = frames.finish();

        let outcome = match pool_report.first_match {
            Some(frame_index) => SearchOutcome::Found { frame_index },
            None if options.is_cancelled() => return Err(VidgrepError::Cancelled),
            None => SearchOutcome::NotFound,
        };

        let processed_frames = pool_report
            .results
            .iter()
            .filter(|result| result.verdict != FrameVerdict::Skipped)
            .count();
        let failed_frames = pool_report
            .results
            .iter()
            .filter(|result| result.is_failed())
            .count();

        Ok(SearchReport {
            outcome,
            planned_frames: plan.len(),
            decoded_frames,
            processed_frames,
            failed_frames,
            batches: pool_report.batches,
        })
    }

    fn transition(&mut self, next: SearchState) {
        log::debug!("Search state: {:?} -> {next:?}", self.state);
        self.state = next;
    }
}

/// Search a video with the default `tesseract` recognizer.
///
/// # Example
///
/// ```no_run
/// use vidgrep::{SearchOptions, VidgrepError};
///
/// let outcome = vidgrep::search("upload.mp4", "abcd", &SearchOptions::new())?;
/// println!("{}", outcome.to_json());
/// # Ok::<(), VidgrepError>(())
/// ```
pub fn search<P: AsRef<Path>>(
    path: P,
    keyword: &str,
    options: &SearchOptions,
) -> Result<SearchOutcome, VidgrepError> {
    let mut search = VideoSearch::new(TesseractRecognizer::default(), options.clone());
    search.search(path, keyword).map(|report| report.outcome)
}

/// Lazily decodes a source and yields only the planned frames.
///
/// Stops at the last planned index, at end of stream, or as soon as the
/// early-exit token is cancelled.
struct SampledFrames<'a, S: FrameSource> {
    source: &'a mut S,
    plan: &'a [u64],
    cursor: usize,
    token: &'a CancellationToken,
    decoded: u64,
    progress: ProgressTracker,
}

impl<'a, S: FrameSource> SampledFrames<'a, S> {
    fn new(
        source: &'a mut S,
        plan: &'a SamplingPlan,
        token: &'a CancellationToken,
        options: &SearchOptions,
    ) -> Self {
        let progress = ProgressTracker::new(
            options.progress.clone(),
            OperationType::FrameDecoding,
            plan.last().map(|last| last + 1),
            DECODE_PROGRESS_INTERVAL,
        );
        Self {
            source,
            plan: plan.indices(),
            cursor: 0,
            token,
            decoded: 0,
            progress,
        }
    }

    fn record_decode(&mut self, index: u64) {
        self.decoded += 1;
        self.progress.advance_by(1, Some(index));
    }

    /// Emit the final decoding report and return the decoded-frame count.
    fn finish(mut self) -> u64 {
        self.progress.finish();
        self.decoded
    }
}

impl<S: FrameSource> Iterator for SampledFrames<'_, S> {
    type Item = Result<FrameSample, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.token.is_cancelled() {
                return None;
            }
            let &target = self.plan.get(self.cursor)?;
            let position = self.source.position();

            if position > target {
                self.cursor += 1;
                continue;
            }

            if position < target {
                match self.source.skip_frame() {
                    None => {
                        log::debug!(
                            "Stream ended at frame {position} before planned frame {target}"
                        );
                        return None;
                    }
                    Some(Ok(index)) => self.record_decode(index),
                    Some(Err(error)) => {
                        log::debug!("Skipping undecodable unsampled frame: {error}");
                        self.record_decode(error.index());
                    }
                }
                continue;
            }

            self.cursor += 1;
            let frame = self.source.next_frame()?;
            let index = match &frame {
                Ok(sample) => sample.index,
                Err(error) => error.index(),
            };
            self.record_decode(index);
            return Some(frame);
        }
    }
}
