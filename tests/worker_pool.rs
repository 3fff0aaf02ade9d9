//! Worker pool tests: batching, cancellation and fault isolation.

mod common;

use std::{ops::ControlFlow, sync::Arc, time::Duration};

use vidgrep::{
    Batch, CancellationToken, FrameError, FrameSample, FrameVerdict, Keyword, KeywordMatcher,
    SearchOptions, WorkerPool,
};

use common::ScriptedRecognizer;

fn frames(indices: impl IntoIterator<Item = u64>) -> Vec<Result<FrameSample, FrameError>> {
    indices
        .into_iter()
        .map(|index| Ok(FrameSample::new(index, common::synthetic_frame(48, 27))))
        .collect()
}

fn matcher(recognizer: Arc<ScriptedRecognizer>) -> KeywordMatcher {
    KeywordMatcher::new(recognizer, Duration::from_secs(1))
}

#[test]
fn pool_size_is_clamped() {
    let pool = WorkerPool::new(&SearchOptions::new().with_max_workers(64).with_batch_size(7))
        .expect("pool");
    let available = std::thread::available_parallelism().map_or(1, usize::from);
    assert!(pool.workers() >= 1);
    assert!(pool.workers() <= 64.min(available));
    assert_eq!(pool.batch_size(), 7);
}

#[test]
fn run_batch_returns_one_result_per_frame() {
    let recognizer = Arc::new(ScriptedRecognizer::new());
    let pool = WorkerPool::new(&SearchOptions::new()).expect("pool");
    let keyword = Keyword::new("abcd").expect("keyword");
    let token = CancellationToken::new();

    let batch = Batch::new(0, frames([3, 4, 5]));
    assert_eq!(batch.len(), 3);
    assert_eq!(batch.number(), 0);

    let results = pool.run_batch(batch, &keyword, &matcher(recognizer.clone()), &token);
    let indices: Vec<u64> = results.iter().map(|result| result.index).collect();
    assert_eq!(indices, vec![3, 4, 5]);
    assert!(results.iter().all(|result| result.verdict == FrameVerdict::NoMatch));
    assert_eq!(recognizer.calls(), 3);
}

#[test]
fn decode_errors_are_failed_without_recognition() {
    let recognizer = Arc::new(ScriptedRecognizer::new());
    let pool = WorkerPool::new(&SearchOptions::new()).expect("pool");
    let keyword = Keyword::new("abcd").expect("keyword");
    let token = CancellationToken::new();

    let error = FrameError::Decode {
        index: 9,
        reason: "bad packet".to_string(),
    };
    let batch = Batch::new(0, vec![Err(error.clone())]);
    let results = pool.run_batch(batch, &keyword, &matcher(recognizer.clone()), &token);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].index, 9);
    assert_eq!(results[0].verdict, FrameVerdict::Failed(error));
    assert_eq!(recognizer.calls(), 0);
}

#[test]
fn cancelled_token_skips_recognition() {
    let recognizer = Arc::new(ScriptedRecognizer::new());
    let pool = WorkerPool::new(&SearchOptions::new()).expect("pool");
    let keyword = Keyword::new("abcd").expect("keyword");
    let token = CancellationToken::new();
    token.cancel();

    let results = pool.run_batch(
        Batch::new(0, frames(0..4)),
        &keyword,
        &matcher(recognizer.clone()),
        &token,
    );
    assert!(results.iter().all(|result| result.verdict == FrameVerdict::Skipped));
    assert_eq!(recognizer.calls(), 0);
}

#[test]
fn run_stops_after_matching_batch() {
    let recognizer = Arc::new(ScriptedRecognizer::new().with_text(6, "abcd"));
    let pool = WorkerPool::new(&SearchOptions::new().with_batch_size(3)).expect("pool");
    let keyword = Keyword::new("abcd").expect("keyword");
    let token = CancellationToken::new();

    let mut pulled = 0;
    let source = frames(0..30).into_iter().inspect(|_| pulled += 1);
    let mut seen_batches = 0;
    let report = pool.run(source, &keyword, &matcher(recognizer), &token, |results| {
        seen_batches += 1;
        assert!(results.len() <= 3);
        ControlFlow::Continue(())
    });

    assert_eq!(report.first_match, Some(6));
    assert!(report.found());
    assert_eq!(report.batches, 3);
    assert_eq!(seen_batches, 3);
    assert_eq!(pulled, 9);
    assert!(token.is_cancelled());
}

#[test]
fn run_honors_break_from_callback() {
    let recognizer = Arc::new(ScriptedRecognizer::new());
    let pool = WorkerPool::new(&SearchOptions::new().with_batch_size(2)).expect("pool");
    let keyword = Keyword::new("abcd").expect("keyword");
    let token = CancellationToken::new();

    let report = pool.run(frames(0..10), &keyword, &matcher(recognizer.clone()), &token, |_| {
        ControlFlow::Break(())
    });

    assert_eq!(report.batches, 1);
    assert!(!report.found());
    assert_eq!(recognizer.calls(), 2);
}

#[test]
fn run_exhausts_frames_without_match() {
    let recognizer = Arc::new(ScriptedRecognizer::new().failing_on(&[1]).panicking_on(&[2]));
    let pool = WorkerPool::new(&SearchOptions::new().with_batch_size(4)).expect("pool");
    let keyword = Keyword::new("abcd").expect("keyword");
    let token = CancellationToken::new();

    let report = pool.run(frames(0..10), &keyword, &matcher(recognizer), &token, |_| {
        ControlFlow::Continue(())
    });

    assert_eq!(report.batches, 3);
    assert_eq!(report.results.len(), 10);
    assert!(!report.found());
    let failed: Vec<u64> = report
        .results
        .iter()
        .filter(|result| result.is_failed())
        .map(|result| result.index)
        .collect();
    assert_eq!(failed, vec![1, 2]);
    assert_eq!(
        report.results[2].verdict,
        FrameVerdict::Failed(FrameError::Panicked { index: 2 })
    );
}
