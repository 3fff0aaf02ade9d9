//! In-memory frame source and scripted recognizer shared by the
//! integration tests.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use image::{Rgb, RgbImage};
use vidgrep::{
    FrameError, FrameSample, FrameSource, PreparedImage, RecognitionError, TextRecognizer,
    VideoMetadata,
};

pub fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

/// A frame with dark "text" stripes on a light background.
pub fn synthetic_frame(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if (x / 4) % 3 == 0 && y > height / 3 && y < 2 * height / 3 {
            Rgb([20, 20, 30])
        } else {
            Rgb([230, 225, 220])
        }
    })
}

/// Counters a [`MockSource`] shares with the test after being moved into a
/// search.
#[derive(Debug, Clone, Default)]
pub struct SourceCounters {
    decoded: Arc<AtomicU64>,
    converted: Arc<AtomicU64>,
    closes: Arc<AtomicUsize>,
}

impl SourceCounters {
    /// Frames pulled from the source, converted or skipped.
    pub fn decoded(&self) -> u64 {
        self.decoded.load(Ordering::SeqCst)
    }

    /// Frames returned with pixels.
    pub fn converted(&self) -> u64 {
        self.converted.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Sequential source producing synthetic frames.
pub struct MockSource {
    metadata: VideoMetadata,
    available: u64,
    position: u64,
    open: bool,
    broken: HashSet<u64>,
    counters: SourceCounters,
}

impl MockSource {
    pub fn new(frame_count: u64, frames_per_second: f64) -> Self {
        let mut metadata = VideoMetadata::from_counts(frame_count, frames_per_second);
        metadata.width = 64;
        metadata.height = 36;
        Self {
            metadata,
            available: frame_count,
            position: 0,
            open: true,
            broken: HashSet::new(),
            counters: SourceCounters::default(),
        }
    }

    /// Frames that fail to decode.
    pub fn with_broken_frames(mut self, indices: &[u64]) -> Self {
        self.broken.extend(indices);
        self
    }

    /// Stream holds fewer frames than the metadata reports.
    pub fn with_available_frames(mut self, available: u64) -> Self {
        self.available = available;
        self
    }

    pub fn counters(&self) -> SourceCounters {
        self.counters.clone()
    }

    fn advance(&mut self) -> Option<Result<u64, FrameError>> {
        if !self.open || self.position >= self.available {
            return None;
        }
        let index = self.position;
        self.position += 1;
        self.counters.decoded.fetch_add(1, Ordering::SeqCst);
        if self.broken.contains(&index) {
            return Some(Err(FrameError::Decode {
                index,
                reason: "corrupt packet".to_string(),
            }));
        }
        Some(Ok(index))
    }
}

impl FrameSource for MockSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn next_frame(&mut self) -> Option<Result<FrameSample, FrameError>> {
        let index = match self.advance()? {
            Ok(index) => index,
            Err(error) => return Some(Err(error)),
        };
        self.counters.converted.fetch_add(1, Ordering::SeqCst);
        Some(Ok(FrameSample::new(
            index,
            synthetic_frame(self.metadata.width, self.metadata.height),
        )))
    }

    fn skip_frame(&mut self) -> Option<Result<u64, FrameError>> {
        self.advance()
    }

    fn close(&mut self) {
        self.open = false;
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Recognizer whose output is scripted per frame index.
#[derive(Debug, Default)]
pub struct ScriptedRecognizer {
    texts: HashMap<u64, String>,
    failures: HashSet<u64>,
    panics: HashSet<u64>,
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    completed: AtomicU64,
    watched: Option<SourceCounters>,
    max_frames_in_flight: AtomicU64,
    seen: Mutex<Vec<u64>>,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame `index` reads as `text`; every other frame reads as filler.
    pub fn with_text(mut self, index: u64, text: &str) -> Self {
        self.texts.insert(index, text.to_string());
        self
    }

    pub fn failing_on(mut self, indices: &[u64]) -> Self {
        self.failures.extend(indices);
        self
    }

    pub fn panicking_on(mut self, indices: &[u64]) -> Self {
        self.panics.extend(indices);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Track how many converted frames have not finished recognition each
    /// time a recognition starts.
    pub fn watching(mut self, counters: SourceCounters) -> Self {
        self.watched = Some(counters);
        self
    }

    /// Highest `converted - completed` seen at the start of a recognition.
    pub fn max_frames_in_flight(&self) -> u64 {
        self.max_frames_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Indices recognized so far, sorted.
    pub fn seen(&self) -> Vec<u64> {
        let mut seen = self.seen.lock().expect("seen lock").clone();
        seen.sort_unstable();
        seen
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&self, image: &PreparedImage, _timeout: Duration) -> Result<String, RecognitionError> {
        let index = image.index();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().expect("seen lock").push(index);
        if let Some(counters) = &self.watched {
            let in_flight = counters.converted().saturating_sub(self.completed.load(Ordering::SeqCst));
            self.max_frames_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        }

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        if self.panics.contains(&index) {
            panic!("engine crashed on frame {index}");
        }
        if self.failures.contains(&index) {
            return Err(RecognitionError::EngineFailed(format!("no text layer for frame {index}")));
        }
        Ok(self
            .texts
            .get(&index)
            .cloned()
            .unwrap_or_else(|| "Lorem ipsum dolor sit amet".to_string()))
    }
}
