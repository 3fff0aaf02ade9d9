//! Frame sampling plans.
//!
//! A [`SamplingPlan`] is the ordered list of frame indices a search will
//! inspect. It is computed once per video from its metadata and the
//! [`SearchOptions`], and never changes afterwards.
//!
//! In the default [`SamplingMode::TimeBudget`] mode the planner samples at
//! most `floor(fps × max_sample_seconds)` frames, spread at an even integer
//! interval from the first frame:
//!
//! ```text
//! frames_to_process = min(total, floor(fps × max_sample_seconds))
//! interval          = max(1, floor(total / frames_to_process))
//! indices           = 0, interval, 2 × interval, …   (< total, ≤ frames_to_process of them)
//! ```
//!
//! When `frames_to_process` is zero (no frames, no frame rate, or a budget
//! shorter than one frame) the plan is empty and the search reports
//! "not found" without starting any worker.

use crate::config::{SamplingMode, SearchOptions};
use crate::metadata::VideoMetadata;

/// Ordered, strictly increasing frame indices selected for inspection.
///
/// Every index lies in `[0, frame_count)`.
///
/// # Example
///
/// ```
/// use vidgrep::{SamplingPlan, SearchOptions, VideoMetadata};
///
/// let metadata = VideoMetadata::from_counts(300, 30.0);
/// let options = SearchOptions::new().with_max_sample_seconds(5.0);
/// let plan = SamplingPlan::new(&metadata, &options);
///
/// assert_eq!(plan.len(), 150);
/// assert_eq!(&plan.indices()[..3], &[0, 2, 4]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SamplingPlan {
    indices: Vec<u64>,
}

impl SamplingPlan {
    /// Compute the plan for a video.
    pub fn new(metadata: &VideoMetadata, options: &SearchOptions) -> Self {
        let plan = match options.sampling {
            SamplingMode::TimeBudget => Self::time_budget(
                metadata.frame_count,
                metadata.frames_per_second,
                options.max_sample_seconds,
            ),
            SamplingMode::Stride(step) => Self::stride(metadata.frame_count, step),
        };

        log::debug!(
            "Sampling plan: {} of {} frames ({:?}, {:.2} fps, budget {:.1}s)",
            plan.len(),
            metadata.frame_count,
            options.sampling,
            metadata.frames_per_second,
            options.max_sample_seconds,
        );

        plan
    }

    /// Time-budgeted sampling.
    ///
    /// Returns an empty plan when `total_frames` is zero, `frames_per_second`
    /// is not a positive finite number, or the budget covers less than one
    /// frame.
    pub fn time_budget(total_frames: u64, frames_per_second: f64, max_seconds: f64) -> Self {
        if total_frames == 0 || !(frames_per_second > 0.0) || !frames_per_second.is_finite() {
            return Self::default();
        }
        if !(max_seconds > 0.0) {
            return Self::default();
        }

        let budget = (frames_per_second * max_seconds).floor();
        let frames_to_process = if budget >= total_frames as f64 {
            total_frames
        } else {
            budget as u64
        };
        if frames_to_process == 0 {
            return Self::default();
        }

        let interval = (total_frames / frames_to_process).max(1);
        let indices = (0..total_frames)
            .step_by(interval as usize)
            .take(frames_to_process as usize)
            .collect();

        Self { indices }
    }

    /// Legacy fixed-stride sampling: the `step`-th, `2 × step`-th, … frame,
    /// i.e. zero-based indices `step - 1, 2 × step - 1, …` below
    /// `total_frames`. A `step` of zero is treated as 1.
    pub fn stride(total_frames: u64, step: u64) -> Self {
        let step = step.max(1);
        let indices = (step - 1..total_frames).step_by(step as usize).collect();
        Self { indices }
    }

    /// Build a plan from explicit indices.
    ///
    /// Indices at or beyond `total_frames` are dropped; the rest are sorted
    /// and deduplicated so the plan stays strictly increasing.
    pub fn from_indices(mut indices: Vec<u64>, total_frames: u64) -> Self {
        indices.retain(|&index| index < total_frames);
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    pub fn indices(&self) -> &[u64] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// The highest index in the plan; decoding can stop after it.
    pub fn last(&self) -> Option<u64> {
        self.indices.last().copied()
    }

    /// Whether `index` is sampled.
    pub fn contains(&self, index: u64) -> bool {
        self.indices.binary_search(&index).is_ok()
    }
}
