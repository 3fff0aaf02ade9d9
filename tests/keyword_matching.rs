//! Keyword and recognizer tests.

mod common;

use std::{sync::Arc, time::Duration};

use image::GrayImage;
use vidgrep::{
    FrameError, Keyword, KeywordMatcher, PreparedImage, RecognitionError, TesseractOptions,
    TesseractRecognizer, TextRecognizer, VidgrepError,
};

use common::ScriptedRecognizer;

fn blank(index: u64) -> PreparedImage {
    PreparedImage::new(index, GrayImage::from_pixel(32, 16, image::Luma([255])))
}

#[test]
fn keyword_is_case_insensitive() {
    let keyword = Keyword::new("AbCd").expect("keyword");
    assert!(keyword.is_found_in("xxabcdxx"));
    assert!(keyword.is_found_in("ABCD"));
    assert!(keyword.is_found_in("order ref: aBcD-19"));
    assert!(!keyword.is_found_in("ab cd"));
    assert!(!keyword.is_found_in(""));
}

#[test]
fn keyword_is_trimmed() {
    let keyword = Keyword::new("  total due \n").expect("keyword");
    assert_eq!(keyword.as_str(), "total due");
    assert!(keyword.is_found_in("TOTAL DUE: 42"));
}

#[test]
fn empty_keyword_is_rejected() {
    assert!(matches!(Keyword::new(""), Err(VidgrepError::EmptyKeyword)));
    assert!(matches!(Keyword::new(" \t "), Err(VidgrepError::EmptyKeyword)));
}

#[test]
fn matcher_reports_containment() {
    let recognizer = ScriptedRecognizer::new().with_text(3, "Invoice #ABCD-42");
    let matcher = KeywordMatcher::new(recognizer, Duration::from_secs(1));
    let keyword = Keyword::new("abcd").expect("keyword");

    assert_eq!(matcher.matches_keyword(&blank(3), &keyword), Ok(true));
    assert_eq!(matcher.matches_keyword(&blank(4), &keyword), Ok(false));
}

#[test]
fn matcher_wraps_engine_errors_with_frame_index() {
    let recognizer = ScriptedRecognizer::new().failing_on(&[9]);
    let matcher = KeywordMatcher::new(recognizer, Duration::from_secs(1));
    let keyword = Keyword::new("abcd").expect("keyword");

    match matcher.matches_keyword(&blank(9), &keyword) {
        Err(FrameError::Recognition { index, source }) => {
            assert_eq!(index, 9);
            assert!(matches!(source, RecognitionError::EngineFailed(_)));
        }
        other => panic!("expected a recognition error, got {other:?}"),
    }
}

#[test]
fn shared_recognizer_is_a_recognizer() {
    let recognizer = Arc::new(ScriptedRecognizer::new().with_text(0, "hello"));
    let text = recognizer
        .recognize(&blank(0), Duration::from_secs(1))
        .expect("recognize");
    assert_eq!(text, "hello");
    assert_eq!(recognizer.calls(), 1);
}

#[test]
fn tesseract_options_builder() {
    let options = TesseractOptions::default()
        .with_executable("/opt/ocr/bin/tesseract")
        .with_language("eng+deu")
        .with_page_segmentation_mode(Some(6));
    assert_eq!(options.executable.to_str(), Some("/opt/ocr/bin/tesseract"));
    assert_eq!(options.language, "eng+deu");
    assert_eq!(options.page_segmentation_mode, Some(6));

    let defaults = TesseractOptions::default();
    assert_eq!(defaults.executable.to_str(), Some("tesseract"));
    assert_eq!(defaults.language, "eng");
    assert_eq!(defaults.page_segmentation_mode, None);
}

#[test]
fn missing_tesseract_is_engine_unavailable() {
    let recognizer = TesseractRecognizer::new(
        TesseractOptions::default().with_executable("/nonexistent/vidgrep-test/tesseract"),
    );
    assert!(!recognizer.is_available());

    let result = recognizer.recognize(&blank(0), Duration::from_secs(1));
    assert!(
        matches!(result, Err(RecognitionError::EngineUnavailable(_))),
        "unexpected result: {result:?}",
    );
}

#[test]
fn tesseract_reads_blank_page_without_keyword() {
    let recognizer = TesseractRecognizer::default();
    if !recognizer.is_available() {
        return;
    }

    let keyword = Keyword::new("abcd").expect("keyword");
    let matcher = KeywordMatcher::new(recognizer, Duration::from_secs(30));
    let page = PreparedImage::new(0, GrayImage::from_pixel(400, 200, image::Luma([255])));
    assert_eq!(matcher.matches_keyword(&page, &keyword), Ok(false));
}

/// Write an executable stand-in for the OCR engine.
#[cfg(unix)]
fn fake_engine(directory: &std::path::Path, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = directory.join("fake-tesseract");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to mark script executable");
    path
}

/// Run a recognition, retrying while a freshly written script is still
/// reported busy by the kernel.
#[cfg(unix)]
fn recognize_with(
    recognizer: &TesseractRecognizer,
    timeout: Duration,
) -> Result<String, RecognitionError> {
    let mut result = recognizer.recognize(&blank(0), timeout);
    for _ in 0..5 {
        match &result {
            Err(RecognitionError::EngineUnavailable(message)) if message.contains("busy") => {
                std::thread::sleep(Duration::from_millis(50));
                result = recognizer.recognize(&blank(0), timeout);
            }
            _ => break,
        }
    }
    result
}

#[cfg(unix)]
#[test]
fn slow_engine_is_killed_at_timeout() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let script = fake_engine(temporary_directory.path(), "exec sleep 5");
    let recognizer = TesseractRecognizer::new(TesseractOptions::default().with_executable(script));

    let started = std::time::Instant::now();
    let result = recognize_with(&recognizer, Duration::from_millis(100));
    let elapsed = started.elapsed();

    assert_eq!(result, Err(RecognitionError::Timeout(Duration::from_millis(100))));
    assert!(elapsed < Duration::from_secs(3), "recognition took {elapsed:?}");
}

#[cfg(unix)]
#[test]
fn slow_engine_with_child_processes_does_not_block() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let script = fake_engine(temporary_directory.path(), "sleep 5");
    let recognizer = TesseractRecognizer::new(TesseractOptions::default().with_executable(script));

    let started = std::time::Instant::now();
    let result = recognize_with(&recognizer, Duration::from_millis(100));

    assert!(matches!(result, Err(RecognitionError::Timeout(_))), "{result:?}");
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[cfg(unix)]
#[test]
fn failing_engine_reports_stderr() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let script = fake_engine(
        temporary_directory.path(),
        "echo 'Failed loading language xyz' >&2\nexit 1",
    );
    let recognizer = TesseractRecognizer::new(TesseractOptions::default().with_executable(script));

    match recognize_with(&recognizer, Duration::from_secs(5)) {
        Err(RecognitionError::EngineFailed(message)) => {
            assert!(message.contains("Failed loading language"), "{message}");
        }
        other => panic!("expected an engine failure, got {other:?}"),
    }
}

#[cfg(unix)]
#[test]
fn engine_output_is_returned() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let script = fake_engine(temporary_directory.path(), "cat > /dev/null\necho 'Invoice ABCD'");
    let recognizer = TesseractRecognizer::new(TesseractOptions::default().with_executable(script));

    let text = recognize_with(&recognizer, Duration::from_secs(5)).expect("recognize");
    assert_eq!(text.trim(), "Invoice ABCD");
}
