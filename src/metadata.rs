//! Video metadata types.
//!
//! [`VideoMetadata`] is extracted once when a [`VideoSource`](crate::VideoSource)
//! is opened and cached for the lifetime of the source. The sampling planner
//! only reads `frame_count` and `frames_per_second`.

use std::time::Duration;

/// Metadata for the video stream being searched.
///
/// # Example
///
/// ```no_run
/// use vidgrep::{FrameSource, VideoSource};
///
/// let source = VideoSource::open("input.mp4").unwrap();
/// let metadata = source.metadata();
/// println!("{} frames at {:.2} fps", metadata.frame_count, metadata.frames_per_second);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct VideoMetadata {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second (may be approximate for variable-frame-rate content).
    pub frames_per_second: f64,
    /// Total number of frames, from the container when it records one,
    /// otherwise estimated from duration and frame rate.
    pub frame_count: u64,
    /// Total duration of the file.
    pub duration: Duration,
    /// Codec name (e.g. `"h264"`, `"vp9"`, `"av1"`).
    pub codec: String,
    /// Container format name (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`, `"avi"`).
    pub format: String,
}

impl VideoMetadata {
    /// Metadata carrying only a frame count and rate.
    ///
    /// Useful for planning against a video that has not been opened, and
    /// for in-memory frame sources.
    pub fn from_counts(frame_count: u64, frames_per_second: f64) -> Self {
        let duration = if frames_per_second > 0.0 && frames_per_second.is_finite() {
            Duration::from_secs_f64(frame_count as f64 / frames_per_second)
        } else {
            Duration::ZERO
        };
        Self {
            width: 0,
            height: 0,
            frames_per_second,
            frame_count,
            duration,
            codec: "unknown".to_string(),
            format: "unknown".to_string(),
        }
    }
}
