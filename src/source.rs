//! Sequential frame sources.
//!
//! [`FrameSource`] is the decoding capability the search coordinator pulls
//! frames from. Decoding is strictly sequential and forward-only: frame
//! indices are assigned in decode order, starting at 0, and there is no
//! seeking. [`VideoSource`] implements it on top of FFmpeg.
//!
//! A source owns its demuxer and decoder exclusively. [`FrameSource::close`]
//! may be called any number of times, and [`VideoSource`] also closes itself
//! when dropped, so the underlying file handle is released on every exit
//! path.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    time::Duration,
};

use ffmpeg_next::{
    Error as FfmpegError, Packet,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::RgbImage;

use crate::error::{FrameError, VidgrepError};
use crate::metadata::VideoMetadata;

/// Consecutive decode failures after which the rest of the stream is
/// treated as unreadable.
const MAX_CONSECUTIVE_DECODE_ERRORS: u32 = 32;

/// A decoded RGB frame and its position in decode order.
#[derive(Debug, Clone)]
pub struct FrameSample {
    /// Zero-based index of the frame in the video.
    pub index: u64,
    /// Decoded pixels at the source resolution.
    pub image: RgbImage,
}

impl FrameSample {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }
}

/// Sequential, forward-only access to the frames of one video.
pub trait FrameSource {
    /// Metadata read when the source was opened.
    fn metadata(&self) -> &VideoMetadata;

    /// Index the next decoded frame will carry.
    fn position(&self) -> u64;

    /// Decode the next frame and return its pixels.
    ///
    /// Returns `None` at end of stream or once the source is closed. A
    /// decode failure consumes the frame position and yields
    /// `Some(Err(FrameError::Decode { .. }))`; decoding can continue with
    /// the following frame.
    fn next_frame(&mut self) -> Option<Result<FrameSample, FrameError>>;

    /// Decode the next frame and discard it, returning its index.
    ///
    /// Sources that can skip the pixel conversion should override this.
    fn skip_frame(&mut self) -> Option<Result<u64, FrameError>> {
        self.next_frame().map(|result| result.map(|sample| sample.index))
    }

    /// Release the underlying resources. Safe to call more than once.
    fn close(&mut self);

    /// `false` once [`close`](FrameSource::close) has run.
    fn is_open(&self) -> bool;
}

/// FFmpeg-backed [`FrameSource`] for a video file on disk.
///
/// The file is opened read-only; it is never moved or deleted.
///
/// # Example
///
/// ```no_run
/// use vidgrep::{FrameSource, VideoSource, VidgrepError};
///
/// let mut source = VideoSource::open("input.mp4")?;
/// while let Some(frame) = source.next_frame() {
///     let frame = frame?;
///     println!("frame {} is {}x{}", frame.index, frame.image.width(), frame.image.height());
/// }
/// source.close();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct VideoSource {
    path: PathBuf,
    input_context: Option<Input>,
    decoder: Option<VideoDecoder>,
    scaler: Option<ScalingContext>,
    video_stream_index: usize,
    metadata: VideoMetadata,
    decoded_frame: VideoFrame,
    rgb_frame: VideoFrame,
    position: u64,
    consecutive_errors: u32,
    eof_sent: bool,
    done: bool,
}

impl Debug for VideoSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoSource")
            .field("path", &self.path)
            .field("metadata", &self.metadata)
            .field("video_stream_index", &self.video_stream_index)
            .field("position", &self.position)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl VideoSource {
    /// Open a video file for sequential decoding.
    ///
    /// Initializes FFmpeg (idempotent), opens the container, locates the
    /// best video stream, and caches its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`VidgrepError::FileOpen`] if the file cannot be read, the
    /// container cannot be parsed, or it has no decodable video stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VidgrepError> {
        let path = path.as_ref().to_path_buf();
        let open_error = |reason: String| VidgrepError::FileOpen {
            path: path.clone(),
            reason,
        };

        log::debug!("Opening video file: {}", path.display());

        ffmpeg_next::init()
            .map_err(|error| open_error(format!("FFmpeg initialisation failed: {error}")))?;

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| open_error(error.to_string()))?;

        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or_else(|| open_error(VidgrepError::NoVideoStream.to_string()))?;
        let video_stream_index = stream.index();

        let decoder_context = CodecContext::from_parameters(stream.parameters())
            .map_err(|error| open_error(format!("Failed to read video codec parameters: {error}")))?;
        let decoder = decoder_context
            .decoder()
            .video()
            .map_err(|error| open_error(format!("Failed to create video decoder: {error}")))?;

        let frames_per_second = crate::conversion::rational_to_rate(stream.avg_frame_rate())
            .or_else(|| crate::conversion::rational_to_rate(stream.rate()))
            .unwrap_or(0.0);

        let duration = if input_context.duration() > 0 {
            Duration::from_micros(input_context.duration() as u64)
        } else if stream.duration() > 0 {
            Duration::from_secs_f64(crate::conversion::pts_to_seconds(
                stream.duration(),
                stream.time_base(),
            ))
        } else {
            Duration::ZERO
        };

        let frame_count = if stream.frames() > 0 {
            stream.frames() as u64
        } else if frames_per_second > 0.0 {
            (duration.as_secs_f64() * frames_per_second) as u64
        } else {
            0
        };

        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            frames_per_second,
            frame_count,
            duration,
            codec,
            format: input_context.format().name().to_string(),
        };

        log::info!(
            "Opened video file: {} (format={}, {}x{}, {:.2} fps, ~{} frames, codec={})",
            path.display(),
            metadata.format,
            metadata.width,
            metadata.height,
            metadata.frames_per_second,
            metadata.frame_count,
            metadata.codec,
        );

        Ok(Self {
            path,
            input_context: Some(input_context),
            decoder: Some(decoder),
            scaler: None,
            video_stream_index,
            metadata,
            decoded_frame: VideoFrame::empty(),
            rgb_frame: VideoFrame::empty(),
            position: 0,
            consecutive_errors: 0,
            eof_sent: false,
            done: false,
        })
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Advance the decoder until the next frame is in `decoded_frame`.
    fn decode_next(&mut self) -> Option<Result<(), FrameError>> {
        if self.done {
            return None;
        }
        let (Some(input_context), Some(decoder)) =
            (self.input_context.as_mut(), self.decoder.as_mut())
        else {
            self.done = true;
            return None;
        };

        loop {
            if decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                self.consecutive_errors = 0;
                return Some(Ok(()));
            }

            if self.eof_sent {
                self.done = true;
                return None;
            }

            let mut packet = Packet::empty();
            match packet.read(input_context) {
                Ok(()) => {
                    if packet.stream() != self.video_stream_index {
                        continue;
                    }
                    if let Err(error) = decoder.send_packet(&packet) {
                        let index = self.position;
                        self.position += 1;
                        self.consecutive_errors += 1;
                        if self.consecutive_errors >= MAX_CONSECUTIVE_DECODE_ERRORS {
                            log::warn!(
                                "{} consecutive decode failures in {}; treating the rest of the stream as unreadable",
                                self.consecutive_errors,
                                self.path.display(),
                            );
                            self.done = true;
                        }
                        return Some(Err(FrameError::Decode {
                            index,
                            reason: error.to_string(),
                        }));
                    }
                }
                Err(FfmpegError::Eof) => {
                    if decoder.send_eof().is_err() {
                        self.done = true;
                        return None;
                    }
                    self.eof_sent = true;
                }
                Err(error) => {
                    self.consecutive_errors += 1;
                    if self.consecutive_errors >= MAX_CONSECUTIVE_DECODE_ERRORS {
                        log::warn!(
                            "Giving up reading {} after repeated errors: {error}",
                            self.path.display(),
                        );
                        self.done = true;
                        return None;
                    }
                }
            }
        }
    }

    /// Scale the current `decoded_frame` to packed RGB24.
    fn convert_current_frame(&mut self, index: u64) -> Result<RgbImage, FrameError> {
        let decode_error = |reason: String| FrameError::Decode { index, reason };

        let format = self.decoded_frame.format();
        let width = self.decoded_frame.width();
        let height = self.decoded_frame.height();

        let needs_scaler = self.scaler.as_ref().is_none_or(|scaler| {
            let input = scaler.input();
            input.format != format || input.width != width || input.height != height
        });
        if needs_scaler {
            let scaler = ScalingContext::get(
                format,
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                ScalingFlags::BILINEAR,
            )
            .map_err(|error| decode_error(error.to_string()))?;
            self.scaler = Some(scaler);
        }

        let Some(scaler) = self.scaler.as_mut() else {
            return Err(decode_error("no pixel converter".to_string()));
        };
        scaler
            .run(&self.decoded_frame, &mut self.rgb_frame)
            .map_err(|error| decode_error(error.to_string()))?;

        let buffer = crate::conversion::frame_to_buffer(&self.rgb_frame, width, height, 3);
        RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
            decode_error("Failed to construct RGB image from decoded frame data".to_string())
        })
    }
}

impl FrameSource for VideoSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn next_frame(&mut self) -> Option<Result<FrameSample, FrameError>> {
        match self.decode_next()? {
            Ok(()) => {
                let index = self.position;
                self.position += 1;
                Some(
                    self.convert_current_frame(index)
                        .map(|image| FrameSample { index, image }),
                )
            }
            Err(error) => Some(Err(error)),
        }
    }

    fn skip_frame(&mut self) -> Option<Result<u64, FrameError>> {
        match self.decode_next()? {
            Ok(()) => {
                let index = self.position;
                self.position += 1;
                Some(Ok(index))
            }
            Err(error) => Some(Err(error)),
        }
    }

    fn close(&mut self) {
        if self.input_context.is_none() {
            return;
        }
        self.scaler = None;
        self.decoder = None;
        self.input_context = None;
        self.done = true;
        log::debug!(
            "Closed video file: {} (decoded {} frames)",
            self.path.display(),
            self.position,
        );
    }

    fn is_open(&self) -> bool {
        self.input_context.is_some()
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        self.close();
    }
}
