//! Async entry point for the search.
//!
//! A search blocks on FFmpeg decoding and on the OCR workers, so it must not
//! run on an async executor's worker threads. [`search_async`] moves the
//! whole blocking search onto `tokio::task::spawn_blocking` and returns a
//! future for its outcome, which lets an async upload service await a
//! result without stalling other requests.
//!
//! # Example
//!
//! ```no_run
//! use vidgrep::{SearchOptions, VidgrepError};
//!
//! # async fn example() -> Result<(), VidgrepError> {
//! let outcome = vidgrep::search_async("upload.mp4", "abcd", SearchOptions::new()).await?;
//! println!("{}", outcome.to_json());
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::{JoinError, JoinHandle};

use crate::config::SearchOptions;
use crate::error::VidgrepError;
use crate::recognize::{TesseractRecognizer, TextRecognizer};
use crate::search::{SearchOutcome, VideoSearch};

/// A future resolving to the outcome of a background search.
///
/// If the blocking task panics the future resolves to
/// [`VidgrepError::TaskPanicked`]; if the runtime drops the task before it
/// runs, to [`VidgrepError::Cancelled`].
pub struct SearchFuture {
    handle: JoinHandle<Result<SearchOutcome, VidgrepError>>,
}

impl Future for SearchFuture {
    type Output = Result<SearchOutcome, VidgrepError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|error| Err(join_error(error))))
    }
}

fn join_error(error: JoinError) -> VidgrepError {
    if error.is_panic() {
        log::warn!("Search task panicked: {error}");
        VidgrepError::TaskPanicked(error.to_string())
    } else {
        VidgrepError::Cancelled
    }
}

/// Search a video with the default `tesseract` recognizer on a blocking
/// thread.
///
/// Must be called from within a Tokio runtime.
pub fn search_async<P, K>(path: P, keyword: K, options: SearchOptions) -> SearchFuture
where
    P: Into<PathBuf>,
    K: Into<String>,
{
    search_async_with(TesseractRecognizer::default(), path, keyword, options)
}

/// Like [`search_async`], with a caller-supplied recognizer.
pub fn search_async_with<R, P, K>(
    recognizer: R,
    path: P,
    keyword: K,
    options: SearchOptions,
) -> SearchFuture
where
    R: TextRecognizer + 'static,
    P: Into<PathBuf>,
    K: Into<String>,
{
    let path = path.into();
    let keyword = keyword.into();

    let handle = tokio::task::spawn_blocking(move || {
        let mut search = VideoSearch::new(recognizer, options);
        search.search(&path, &keyword).map(|report| report.outcome)
    });

    SearchFuture { handle }
}
