//! Text recognition and keyword matching.
//!
//! [`TextRecognizer`] is the OCR capability the workers call. The crate ships
//! [`TesseractRecognizer`], which drives the `tesseract` command-line engine,
//! but any engine can be plugged in by implementing the trait.
//!
//! [`KeywordMatcher`] combines a recognizer with a [`Keyword`] check:
//! containment is a case-insensitive substring search over the recognized
//! text.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    io::{Cursor, Read, Write},
    path::PathBuf,
    process::{Command, Stdio},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use image::ImageFormat;

use crate::error::{FrameError, RecognitionError, VidgrepError};
use crate::preprocess::PreparedImage;

/// How often a running `tesseract` process is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// An OCR engine.
///
/// Implementations must be [`Send`] and [`Sync`]: one recognizer instance is
/// shared by every worker thread.
pub trait TextRecognizer: Send + Sync {
    /// Extract free-form text from a prepared image.
    ///
    /// Implementations should give up and return
    /// [`RecognitionError::Timeout`] once `timeout` has elapsed.
    fn recognize(&self, image: &PreparedImage, timeout: Duration) -> Result<String, RecognitionError>;
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for Arc<T> {
    fn recognize(&self, image: &PreparedImage, timeout: Duration) -> Result<String, RecognitionError> {
        (**self).recognize(image, timeout)
    }
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for Box<T> {
    fn recognize(&self, image: &PreparedImage, timeout: Duration) -> Result<String, RecognitionError> {
        (**self).recognize(image, timeout)
    }
}

/// A non-empty search term, compared case-insensitively.
///
/// # Example
///
/// ```
/// use vidgrep::Keyword;
///
/// let keyword = Keyword::new("  Invoice ")?;
/// assert!(keyword.is_found_in("TOTAL INVOICE AMOUNT"));
/// assert!(!keyword.is_found_in("receipt"));
/// assert!(Keyword::new("   ").is_err());
/// # Ok::<(), vidgrep::VidgrepError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    original: String,
    folded: String,
}

impl Keyword {
    /// Trim and validate a keyword.
    ///
    /// # Errors
    ///
    /// Returns [`VidgrepError::EmptyKeyword`] if nothing is left after
    /// trimming.
    pub fn new(keyword: &str) -> Result<Self, VidgrepError> {
        let trimmed = keyword.trim();
        if trimmed.is_empty() {
            return Err(VidgrepError::EmptyKeyword);
        }
        Ok(Self {
            original: trimmed.to_string(),
            folded: trimmed.to_lowercase(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Case-insensitive containment check.
    pub fn is_found_in(&self, text: &str) -> bool {
        text.to_lowercase().contains(&self.folded)
    }
}

/// Runs a recognizer on prepared images and checks for a keyword.
pub struct KeywordMatcher {
    recognizer: Box<dyn TextRecognizer>,
    timeout: Duration,
}

impl Debug for KeywordMatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("KeywordMatcher")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl KeywordMatcher {
    pub fn new<R: TextRecognizer + 'static>(recognizer: R, timeout: Duration) -> Self {
        Self {
            recognizer: Box::new(recognizer),
            timeout,
        }
    }

    /// Recognize the text in `image` and report whether it contains
    /// `keyword`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Recognition`] if the engine fails; callers
    /// treat that as "no match" for this frame.
    pub fn matches_keyword(&self, image: &PreparedImage, keyword: &Keyword) -> Result<bool, FrameError> {
        let text = self
            .recognizer
            .recognize(image, self.timeout)
            .map_err(|source| FrameError::Recognition {
                index: image.index(),
                source,
            })?;

        let found = keyword.is_found_in(&text);
        log::trace!(
            "Frame {}: recognized {} chars, keyword {}",
            image.index(),
            text.len(),
            if found { "found" } else { "absent" },
        );
        Ok(found)
    }
}

/// Settings for the `tesseract` command-line engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TesseractOptions {
    /// Executable name or path. Defaults to `tesseract` (looked up in `PATH`).
    pub executable: PathBuf,
    /// Language pack(s), e.g. `"eng"` or `"eng+deu"`.
    pub language: String,
    /// Page segmentation mode (`--psm`). `None` keeps the engine default.
    pub page_segmentation_mode: Option<u8>,
}

impl Default for TesseractOptions {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            page_segmentation_mode: None,
        }
    }
}

impl TesseractOptions {
    #[must_use]
    pub fn with_executable<P: Into<PathBuf>>(mut self, executable: P) -> Self {
        self.executable = executable.into();
        self
    }

    #[must_use]
    pub fn with_language<S: Into<String>>(mut self, language: S) -> Self {
        self.language = language.into();
        self
    }

    #[must_use]
    pub fn with_page_segmentation_mode(mut self, mode: Option<u8>) -> Self {
        self.page_segmentation_mode = mode;
        self
    }
}

/// [`TextRecognizer`] backed by the `tesseract` executable.
///
/// Each call encodes the image as PNG, pipes it to
/// `tesseract stdin stdout`, and collects the recognized text. A call that
/// exceeds its timeout has its process killed.
#[derive(Debug, Clone, Default)]
pub struct TesseractRecognizer {
    options: TesseractOptions,
}

impl TesseractRecognizer {
    pub fn new(options: TesseractOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TesseractOptions {
        &self.options
    }

    /// Check that the configured executable can be started.
    pub fn is_available(&self) -> bool {
        Command::new(&self.options.executable)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.options.executable);
        command
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.options.language);
        if let Some(mode) = self.options.page_segmentation_mode {
            command.arg("--psm").arg(mode.to_string());
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image: &PreparedImage, timeout: Duration) -> Result<String, RecognitionError> {
        let mut png = Vec::new();
        image
            .image()
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|error| RecognitionError::Encode(error.to_string()))?;

        let mut child = self.command().spawn().map_err(|error| {
            RecognitionError::EngineUnavailable(format!(
                "{}: {error}",
                self.options.executable.display()
            ))
        })?;

        // Feed and drain the pipes on helper threads so a full pipe can never
        // block the timeout loop.
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || {
                let _ = stdin.write_all(&png);
            })
        });
        let stdout_reader = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut buffer = Vec::new();
                let _ = stdout.read_to_end(&mut buffer);
                buffer
            })
        });
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buffer = String::new();
                let _ = stderr.read_to_string(&mut buffer);
                buffer
            })
        });

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break Err(RecognitionError::Timeout(timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(error) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break Err(RecognitionError::EngineFailed(error.to_string()));
                }
            }
        };

        // On failure the pipe threads are left to finish once every process
        // holding the pipes has exited; joining them could outlast the timeout.
        let status = status?;

        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let stdout = stdout_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let message = stderr.trim();
            return Err(RecognitionError::EngineFailed(if message.is_empty() {
                format!("tesseract exited with {status}")
            } else {
                message.to_string()
            }));
        }

        String::from_utf8(stdout).map_err(|error| RecognitionError::InvalidOutput(error.to_string()))
    }
}
