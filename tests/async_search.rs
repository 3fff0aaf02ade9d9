//! Async search tests (requires the `async` feature).

#![cfg(feature = "async")]

mod common;

use std::sync::Arc;

use vidgrep::{SearchOptions, VidgrepError};

use common::ScriptedRecognizer;

#[tokio::test]
async fn async_search_of_missing_file_fails() {
    let recognizer = Arc::new(ScriptedRecognizer::new());
    let result = vidgrep::search_async_with(
        recognizer.clone(),
        "this_file_does_not_exist.mp4",
        "abcd",
        SearchOptions::new(),
    )
    .await;

    assert!(matches!(result, Err(VidgrepError::FileOpen { .. })));
    assert_eq!(recognizer.calls(), 0);
}

#[tokio::test]
async fn async_search_rejects_blank_keyword() {
    let result = vidgrep::search_async("this_file_does_not_exist.mp4", " ", SearchOptions::new()).await;
    assert!(matches!(result, Err(VidgrepError::EmptyKeyword)));
}

#[tokio::test]
async fn async_search_of_fixture() {
    let path = common::sample_video_path();
    if !std::path::Path::new(path).exists() {
        return;
    }

    let recognizer = Arc::new(ScriptedRecognizer::new().with_text(0, "abcd"));
    let outcome = vidgrep::search_async_with(recognizer, path, "abcd", SearchOptions::new())
        .await
        .expect("search");
    assert_eq!(outcome, vidgrep::SearchOutcome::Found { frame_index: 0 });
}
