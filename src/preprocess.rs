//! Frame preprocessing for OCR.
//!
//! [`prepare`] turns a decoded RGB [`FrameSample`] into a [`PreparedImage`]:
//! downscaled into the configured bounding box, converted to 8-bit luma, and
//! binarized with Otsu's method so no threshold has to be hand-tuned.

use image::{
    GrayImage, RgbImage,
    imageops::{self, FilterType},
};

use crate::config::PreprocessOptions;
use crate::error::FrameError;
use crate::source::FrameSample;

/// A binarized single-channel image ready for text recognition.
///
/// Every pixel is either 0 or 255.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    index: u64,
    image: GrayImage,
}

impl PreparedImage {
    /// Wrap an already-binarized image.
    pub fn new(index: u64, image: GrayImage) -> Self {
        Self { index, image }
    }

    /// Index of the frame this image was prepared from.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn into_image(self) -> GrayImage {
        self.image
    }
}

/// Prepare a decoded frame for OCR.
///
/// Consumes the sample, so its RGB buffer is released as soon as the
/// prepared image exists.
///
/// # Errors
///
/// Returns [`FrameError::Preprocess`] if the frame has no pixels.
pub fn prepare(sample: FrameSample, options: &PreprocessOptions) -> Result<PreparedImage, FrameError> {
    let index = sample.index;
    let rgb = sample.image;

    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(FrameError::Preprocess {
            index,
            reason: format!("frame has no pixels ({}x{})", rgb.width(), rgb.height()),
        });
    }

    let rgb = downscale(rgb, options);
    let mut gray = imageops::grayscale(&rgb);
    drop(rgb);

    let threshold = otsu_threshold(&gray);
    binarize(&mut gray, threshold);

    Ok(PreparedImage { index, image: gray })
}

fn downscale(rgb: RgbImage, options: &PreprocessOptions) -> RgbImage {
    let (width, height) = options.resolve_dimensions(rgb.width(), rgb.height());
    if (width, height) == rgb.dimensions() {
        rgb
    } else {
        imageops::resize(&rgb, width, height, FilterType::Triangle)
    }
}

/// Compute Otsu's global threshold for a grayscale image.
///
/// Picks the level `t` that maximizes the between-class variance of the
/// pixel populations `≤ t` and `> t`, which is equivalent to minimizing the
/// intra-class variance. Returns 0 for an empty image.
///
/// # Example
///
/// ```
/// use image::{GrayImage, Luma};
///
/// let image = GrayImage::from_fn(4, 1, |x, _| if x < 2 { Luma([20]) } else { Luma([200]) });
/// let threshold = vidgrep::otsu_threshold(&image);
/// assert!((20..200).contains(&threshold));
/// ```
pub fn otsu_threshold(image: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in image.as_raw() {
        histogram[*pixel as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }

    let weighted_sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut background_weight = 0u64;
    let mut background_sum = 0.0f64;
    let mut best_variance = 0.0f64;
    let mut threshold = 0u8;

    for (level, &count) in histogram.iter().enumerate() {
        background_weight += count;
        if background_weight == 0 {
            continue;
        }
        let foreground_weight = total - background_weight;
        if foreground_weight == 0 {
            break;
        }

        background_sum += level as f64 * count as f64;
        let background_mean = background_sum / background_weight as f64;
        let foreground_mean = (weighted_sum - background_sum) / foreground_weight as f64;
        let mean_difference = background_mean - foreground_mean;
        let variance = background_weight as f64
            * foreground_weight as f64
            * mean_difference
            * mean_difference;

        if variance > best_variance {
            best_variance = variance;
            threshold = level as u8;
        }
    }

    threshold
}

/// Pixels strictly above `threshold` become 255, the rest 0.
fn binarize(image: &mut GrayImage, threshold: u8) {
    for pixel in image.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > threshold { 255 } else { 0 };
    }
}
