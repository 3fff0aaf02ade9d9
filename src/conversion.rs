//! Internal conversion helpers shared by the FFmpeg frame source.

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy pixel data from an FFmpeg video frame into a tightly-packed buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width ×
/// `bytes_per_pixel`). This strips that padding so the result can be passed
/// directly to [`image::RgbImage::from_raw`].
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let expected_stride = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == expected_stride {
        data[..expected_stride * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(expected_stride * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + expected_stride]);
        }
        buffer
    }
}

/// Convert an FFmpeg rational to a float, or `None` for a zero denominator
/// or a non-positive rate.
pub(crate) fn rational_to_rate(rational: Rational) -> Option<f64> {
    if rational.denominator() == 0 {
        return None;
    }
    let rate = rational.numerator() as f64 / rational.denominator() as f64;
    (rate > 0.0).then_some(rate)
}

/// Rescale a PTS/duration value from stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}
