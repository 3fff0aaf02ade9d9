//! Error types for the `vidgrep` crate.
//!
//! Two tiers of error exist. [`VidgrepError`] is returned by operations whose
//! failure makes the whole search meaningless (the video cannot be opened,
//! no worker can be scheduled). [`FrameError`] and [`RecognitionError`]
//! describe a failure on a single sampled frame; they are recorded in that
//! frame's [`MatchResult`](crate::MatchResult) and counted as "no match",
//! never propagated to the caller.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// The unified error type for fatal `vidgrep` failures.
///
/// Every public method that can abort a search returns
/// `Result<T, VidgrepError>`. Variants carry enough context to diagnose the
/// problem without additional logging at the call site.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VidgrepError {
    /// The video file could not be opened or its container could not be
    /// parsed.
    #[error("Failed to open video file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to [`crate::VideoSource::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// The keyword was empty after trimming whitespace.
    #[error("Keyword must not be empty")]
    EmptyKeyword,

    /// The worker pool could not be created, so no frame can be scheduled.
    #[error("Failed to start OCR workers: {0}")]
    WorkerPool(String),

    /// The search was cancelled via a caller-supplied
    /// [`CancellationToken`](crate::CancellationToken).
    #[error("Search cancelled")]
    Cancelled,

    /// The background task running an async search panicked.
    #[error("Search task panicked: {0}")]
    TaskPanicked(String),
}

/// Failure of the text recognition engine on one prepared image.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecognitionError {
    /// The OCR engine could not be started (e.g. the executable is missing).
    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The OCR engine ran but reported a failure.
    #[error("OCR engine failed: {0}")]
    EngineFailed(String),

    /// Recognition did not finish within the configured timeout.
    #[error("Recognition timed out after {0:?}")]
    Timeout(Duration),

    /// The prepared image could not be encoded for the engine.
    #[error("Failed to encode image for OCR: {0}")]
    Encode(String),

    /// The engine produced output that is not valid text.
    #[error("OCR engine produced invalid output: {0}")]
    InvalidOutput(String),
}

/// Failure while processing a single sampled frame.
///
/// Absorbed by the worker pool: a frame that fails is treated as "no match"
/// and sibling frames keep running.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameError {
    /// The frame at this index could not be decoded.
    #[error("Failed to decode frame {index}: {reason}")]
    Decode {
        /// Position of the frame in decode order.
        index: u64,
        /// Decoder message.
        reason: String,
    },

    /// The decoded frame could not be turned into an OCR-ready image.
    #[error("Failed to preprocess frame {index}: {reason}")]
    Preprocess {
        /// Frame index.
        index: u64,
        /// What went wrong.
        reason: String,
    },

    /// Text recognition failed on this frame.
    #[error("Recognition failed on frame {index}: {source}")]
    Recognition {
        /// Frame index.
        index: u64,
        /// Engine error.
        source: RecognitionError,
    },

    /// The worker processing this frame panicked.
    #[error("Worker panicked while processing frame {index}")]
    Panicked {
        /// Frame index.
        index: u64,
    },
}

impl FrameError {
    /// Index of the frame this error belongs to.
    pub fn index(&self) -> u64 {
        match self {
            FrameError::Decode { index, .. }
            | FrameError::Preprocess { index, .. }
            | FrameError::Recognition { index, .. }
            | FrameError::Panicked { index } => *index,
        }
    }
}
