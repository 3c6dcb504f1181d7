/*!
    Video stream encoder.
*/

use ffmpeg_next::{
    Packet,
    encoder::video::Encoder as VideoEncoderFFmpeg,
    ffi,
    format::Pixel,
    software::scaling::{context::Context as ScalerContext, flag::Flags as ScalerFlags},
    util::frame::video::Video as VideoFrameFFmpeg,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use ffmpeg_types::{PixelFormat, Result, StreamError, VideoFrame};

use crate::convert::{make_video_frame, pixel_format_to_ffmpeg};
use crate::encode::{self, Phase, Track};
use crate::util::{NANOS, rescale_ts};

/**
    Encodes raw camera frames into one video stream of an output.

    Every method takes the stream lock, so producer threads may call
    [`send_frame`](Self::send_frame) while another thread reconfigures or
    stops the stream.

    The source format is negotiated with the first frame and the source size
    follows the frames. Whenever either differs from what the encoder was
    opened with, frames pass through a conversion stage first.
*/
pub struct VideoStream {
    track: Track,
    state: Mutex<VideoState>,
}

struct VideoState {
    index: usize,
    encoder: VideoEncoderFFmpeg,
    packet: Packet,
    /// Borrowed view of the producer frame being encoded. Holds no buffers
    /// outside of `send_frame`.
    view: VideoFrameFFmpeg,
    converter: Option<Converter>,
    /// Encoder-sized output of the conversion stage.
    scratch: Option<VideoFrameFFmpeg>,
    pixel_format: Option<PixelFormat>,
    width: u32,
    height: u32,
    needs_conversion: bool,
    phase: Phase,
    start_ts: Option<i64>,
    last_pts: Option<i64>,
}

// SAFETY: the encoder, frames and scaler are only used while holding the
// stream lock, and the view never outlives the call that filled it.
unsafe impl Send for VideoState {}

/**
    Cached scaler and the source geometry it was created for.
*/
struct Converter {
    context: ScalerContext,
    format: Pixel,
    width: u32,
    height: u32,
}

impl Converter {
    fn matches(&self, format: Pixel, width: u32, height: u32) -> bool {
        self.format == format && self.width == width && self.height == height
    }
}

impl VideoStream {
    pub(crate) fn new(track: Track, encoder: VideoEncoderFFmpeg) -> Self {
        let state = VideoState {
            index: track.index(),
            width: encoder.width(),
            height: encoder.height(),
            encoder,
            packet: Packet::empty(),
            view: VideoFrameFFmpeg::empty(),
            converter: None,
            scratch: None,
            pixel_format: None,
            needs_conversion: false,
            phase: Phase::Stopped,
            start_ts: None,
            last_pts: None,
        };

        Self {
            track,
            state: Mutex::new(state),
        }
    }

    /**
        Start accepting frames. Starting a started stream does nothing.
    */
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Finished => {
                warn!(stream = state.index, "Cannot start a flushed stream");
                Err(StreamError::InvalidState)
            }
            Phase::Started => Ok(()),
            Phase::Stopped => {
                state.phase = Phase::Started;
                info!(stream = state.index, "Video stream started");
                Ok(())
            }
        }
    }

    /**
        Stop accepting frames. Frames sent while stopped are dropped.
    */
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if state.phase == Phase::Started {
            state.phase = Phase::Stopped;
            info!(stream = state.index, "Video stream stopped");
        }
    }

    /**
        Encode one frame and write the resulting packets to the output.

        A frame sent to a stopped stream is dropped and `Ok(())` is returned.
        The frame is only read during this call.
    */
    pub fn send_frame(&self, frame: &VideoFrame) -> Result<()> {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Started => {}
            Phase::Stopped => {
                trace!(stream = state.index, ts = frame.ts, "Stream is not started, dropping frame");
                return Ok(());
            }
            Phase::Finished => {
                error!(stream = state.index, "Frame sent to a flushed stream");
                return Err(StreamError::InvalidState);
            }
        }

        let format = state.resolve_format(frame).inspect_err(|e| {
            error!(stream = state.index, error = %e, "Unable to determine frame format");
        })?;

        frame.validate(format).inspect_err(|e| {
            error!(
                stream = state.index,
                error = %e,
                width = frame.width,
                height = frame.height,
                %format,
                planes = frame.planes.len(),
                "Rejected frame"
            );
        })?;

        if state.pixel_format != Some(format) {
            if let Some(current) = state.pixel_format {
                info!(stream = state.index, from = %current, to = %format, "Frame format changed");
            }
            state.set_pixel_format(format)?;
        }

        if frame.width != state.width || frame.height != state.height {
            warn!(
                stream = state.index,
                from = ?(state.width, state.height),
                to = ?(frame.width, frame.height),
                "Frame size was incorrect, updating"
            );
            state.set_frame_size(frame.width, frame.height)?;
        }

        state.encode(frame, format, &self.track)
    }

    /**
        Set the layout of the frames the producer will send.
    */
    pub fn set_pixel_format(&self, format: PixelFormat) -> Result<()> {
        self.state.lock().set_pixel_format(format)
    }

    /**
        Set the size of the frames the producer will send.
    */
    pub fn set_frame_size(&self, width: u32, height: u32) -> Result<()> {
        self.state.lock().set_frame_size(width, height)
    }

    /**
        Drain the packets the encoder is still holding and finish the stream.

        Call this before closing the output. A flushed stream accepts no more
        frames and cannot be restarted. If writing fails the stream is left
        as it was and the flush can be repeated; packets already taken from
        the encoder are lost.
    */
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.phase == Phase::Finished {
            return Err(StreamError::InvalidState);
        }

        let VideoState {
            index,
            encoder,
            packet,
            ..
        } = &mut *state;
        let written = encode::flush(encoder, packet, &self.track)?;
        info!(stream = *index, packets = written, "Video stream flushed");
        state.phase = Phase::Finished;
        Ok(())
    }

    /// Index of this stream in the output.
    pub fn index(&self) -> usize {
        self.track.index()
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().phase == Phase::Started
    }

    /// The negotiated source format, if any frame or call has set one.
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.state.lock().pixel_format
    }

    pub fn has_pixel_format(&self) -> bool {
        self.pixel_format().is_some()
    }

    /// Planes per frame of the negotiated source format.
    pub fn plane_count(&self) -> usize {
        self.pixel_format().map_or(0, PixelFormat::plane_count)
    }

    /// Current source frame size.
    pub fn frame_size(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.width, state.height)
    }

    /// True if frames are converted before they reach the encoder.
    pub fn needs_conversion(&self) -> bool {
        self.state.lock().needs_conversion
    }
}

impl std::fmt::Debug for VideoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("VideoStream")
            .field("index", &state.index)
            .field("phase", &state.phase)
            .field("pixel_format", &state.pixel_format)
            .field("size", &(state.width, state.height))
            .field("needs_conversion", &state.needs_conversion)
            .finish_non_exhaustive()
    }
}

impl VideoState {
    /**
        Work out the format of `frame`: the one it declares, else the one
        already negotiated, else the YUV 4:2:0 layout its planes describe.
        Nothing is changed until the frame has been validated.
    */
    fn resolve_format(&self, frame: &VideoFrame) -> Result<PixelFormat> {
        match (self.pixel_format, frame.format) {
            (_, Some(format)) => Ok(format),
            (Some(current), None) => Ok(current),
            (None, None) => {
                let format = frame.detect_yuv420_layout()?;
                debug!(stream = self.index, %format, "Detected frame layout");
                Ok(format)
            }
        }
    }

    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()> {
        if format == PixelFormat::Unknown {
            return Err(StreamError::InvalidPixelFormat);
        }
        info!(stream = self.index, %format, planes = format.plane_count(), "Set pixel format");
        self.pixel_format = Some(format);
        self.update_conversion()
    }

    fn set_frame_size(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(StreamError::InvalidResolution);
        }
        info!(stream = self.index, width, height, "Set frame size");
        self.width = width;
        self.height = height;
        self.update_conversion()
    }

    /**
        Decide whether frames must be converted for the encoder and make sure
        the conversion output exists if so. The scaler itself is created on
        first use.
    */
    fn update_conversion(&mut self) -> Result<()> {
        let encoder_format = self.encoder.format();
        let (encoder_width, encoder_height) = (self.encoder.width(), self.encoder.height());

        let format_differs = self
            .pixel_format
            .is_some_and(|f| pixel_format_to_ffmpeg(f) != encoder_format);
        let size_differs = self.width != encoder_width || self.height != encoder_height;
        let needs_conversion = format_differs || size_differs;

        if needs_conversion && !self.needs_conversion {
            warn!(
                stream = self.index,
                source_format = ?self.pixel_format,
                source_size = ?(self.width, self.height),
                encoder_format = ?encoder_format,
                encoder_size = ?(encoder_width, encoder_height),
                "Source differs from encoder, converting frames"
            );
        }

        if needs_conversion && self.scratch.is_none() {
            let scratch = make_video_frame(encoder_width, encoder_height, encoder_format)
                .ok_or_else(|| {
                    error!(stream = self.index, "Failed to allocate conversion frame");
                    StreamError::AllocFailed
                })?;
            self.scratch = Some(scratch);
        }

        self.needs_conversion = needs_conversion;
        Ok(())
    }

    /**
        Encode a validated frame of `format`.
    */
    fn encode(&mut self, frame: &VideoFrame, format: PixelFormat, track: &Track) -> Result<()> {
        self.fill_view(frame, format)?;
        let pts = self.next_pts(frame.ts, track);
        self.view.set_pts(Some(pts));

        let result = self.submit(track);

        // Drop every reference to the producer's planes.
        unsafe { ffi::av_frame_unref(self.view.as_mut_ptr()) };
        result
    }

    /**
        Point the view at the producer's planes.
    */
    fn fill_view(&mut self, frame: &VideoFrame, format: PixelFormat) -> Result<()> {
        let mut planes = [(std::ptr::null_mut::<u8>(), 0i32); 4];
        for (index, slot) in planes.iter_mut().enumerate().take(format.plane_count()) {
            let plane = frame
                .working_plane(format, index)
                .ok_or(StreamError::InvalidPlaneCount)?;
            let stride = i32::try_from(plane.stride).map_err(|_| StreamError::InvalidStride)?;
            *slot = (plane.data.as_ptr().cast_mut(), stride);
        }

        self.view.set_format(pixel_format_to_ffmpeg(format));
        self.view.set_width(frame.width);
        self.view.set_height(frame.height);

        // The engine copies unreferenced frame data on submission and the
        // scaler only reads it, so the planes are never written through.
        unsafe {
            let ptr = self.view.as_mut_ptr();
            for (index, (data, linesize)) in planes.into_iter().enumerate() {
                (*ptr).data[index] = data;
                (*ptr).linesize[index] = linesize;
            }
        }
        Ok(())
    }

    /**
        Timestamp of a frame in encoder ticks, counted from the first frame
        of the stream and kept strictly increasing.
    */
    fn next_pts(&mut self, ts: i64, track: &Track) -> i64 {
        let start = *self.start_ts.get_or_insert(ts);
        let mut pts = rescale_ts(ts.saturating_sub(start), NANOS, track.time_base());

        if let Some(last) = self.last_pts {
            if pts <= last {
                warn!(stream = self.index, ts, pts, last, "Non-increasing frame timestamp, bumping");
                pts = last + 1;
            }
        }

        self.last_pts = Some(pts);
        pts
    }

    fn submit(&mut self, track: &Track) -> Result<()> {
        if !self.needs_conversion {
            return encode::encode_frame(&mut self.encoder, &self.view, &mut self.packet, track);
        }

        self.convert()?;
        let scratch = self.scratch.as_ref().ok_or(StreamError::AllocFailed)?;
        encode::encode_frame(&mut self.encoder, scratch, &mut self.packet, track)
    }

    /**
        Scale and convert the view into the scratch frame.

        The scaler is kept for as long as the source geometry stays the same
        and replaced as a whole when it changes.
    */
    fn convert(&mut self) -> Result<()> {
        let index = self.index;
        let scratch = self.scratch.as_mut().ok_or(StreamError::AllocFailed)?;

        // The encoder may still hold a reference to the previous output.
        if unsafe { ffi::av_frame_make_writable(scratch.as_mut_ptr()) } < 0 {
            error!(stream = index, "Conversion frame is not writable");
            return Err(StreamError::AllocFailed);
        }

        let (format, width, height) = (self.view.format(), self.view.width(), self.view.height());
        let converter = match self.converter.take() {
            Some(converter) if converter.matches(format, width, height) => converter,
            stale => {
                drop(stale);
                let context = ScalerContext::get(
                    format,
                    width,
                    height,
                    scratch.format(),
                    scratch.width(),
                    scratch.height(),
                    ScalerFlags::FAST_BILINEAR,
                )
                .map_err(|e| {
                    error!(stream = index, error = %e, "Failed to create conversion context");
                    StreamError::AllocFailed
                })?;
                debug!(
                    stream = index,
                    from = ?(format, width, height),
                    to = ?(scratch.format(), scratch.width(), scratch.height()),
                    "Created conversion context"
                );
                Converter {
                    context,
                    format,
                    width,
                    height,
                }
            }
        };
        let converter = self.converter.insert(converter);

        converter.context.run(&self.view, scratch).map_err(|e| {
            error!(stream = index, error = %e, "Failed to convert frame");
            StreamError::InvalidFormat
        })?;
        scratch.set_pts(self.view.pts());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ffmpeg_types::{Plane, VideoConfig};

    use super::*;
    use crate::OutputMuxer;
    use crate::testing::{I420, engine, packet_counts, packet_pts};

    const FRAME_NS: i64 = 40_000_000;

    fn mpeg4_config() -> VideoConfig {
        VideoConfig::new("mpeg4", PixelFormat::Yuv420p, 64, 48, 25)
    }

    fn started_null_stream() -> (OutputMuxer, VideoStream) {
        let muxer = OutputMuxer::build(&engine(), "null", Some("null")).unwrap();
        let stream = muxer.make_video_stream(&mpeg4_config()).unwrap();
        muxer.open().unwrap();
        stream.start().unwrap();
        (muxer, stream)
    }

    #[test]
    fn frames_are_dropped_until_started() {
        let muxer = OutputMuxer::build(&engine(), "null", Some("null")).unwrap();
        let stream = muxer.make_video_stream(&mpeg4_config()).unwrap();
        muxer.open().unwrap();

        let image = I420::new(64, 48);
        assert_eq!(image.send_to(&stream, 0), Ok(()));
        assert!(!stream.has_pixel_format());
        assert_eq!(stream.state.lock().last_pts, None);

        stream.start().unwrap();
        assert_eq!(image.send_to(&stream, 0), Ok(()));
        assert_eq!(stream.state.lock().last_pts, Some(0));

        stream.stop();
        assert!(!stream.is_started());
        assert_eq!(image.send_to(&stream, FRAME_NS), Ok(()));
        assert_eq!(stream.state.lock().last_pts, Some(0));
    }

    #[test]
    fn matching_frames_skip_conversion() {
        let (_muxer, stream) = started_null_stream();
        let image = I420::new(64, 48);

        image.send_to(&stream, 0).unwrap();

        assert_eq!(stream.pixel_format(), Some(PixelFormat::Yuv420p));
        assert_eq!(stream.plane_count(), 3);
        assert!(!stream.needs_conversion());
        let state = stream.state.lock();
        assert!(state.converter.is_none());
        assert!(state.scratch.is_none());
    }

    #[test]
    fn first_frame_negotiates_semi_planar_layout() {
        let (_muxer, stream) = started_null_stream();
        let y = vec![16u8; 64 * 48];
        let chroma = vec![128u8; 64 * 24];
        let planes = [
            Plane::new(&y, 64),
            Plane::new(&chroma, 64).with_pixel_stride(2),
            Plane::new(&chroma[1..], 64).with_pixel_stride(2),
        ];

        stream.send_frame(&VideoFrame::new(0, 64, 48, &planes)).unwrap();

        assert_eq!(stream.pixel_format(), Some(PixelFormat::Nv12));
        assert_eq!(stream.plane_count(), 2);
        assert!(stream.needs_conversion());
        assert!(stream.state.lock().converter.is_some());
    }

    #[test]
    fn explicit_format_renegotiates() {
        let (_muxer, stream) = started_null_stream();
        let image = I420::new(64, 48);
        image.send_to(&stream, 0).unwrap();
        assert!(!stream.needs_conversion());

        let rgba = vec![0u8; 64 * 48 * 4];
        let planes = [Plane::new(&rgba, 64 * 4)];
        let frame = VideoFrame::new(FRAME_NS, 64, 48, &planes).with_format(PixelFormat::Rgba);
        stream.send_frame(&frame).unwrap();

        assert_eq!(stream.pixel_format(), Some(PixelFormat::Rgba));
        assert!(stream.needs_conversion());
    }

    #[test]
    fn frame_size_follows_frames() {
        let (_muxer, stream) = started_null_stream();
        let image = I420::new(32, 24);

        image.send_to(&stream, 0).unwrap();

        assert_eq!(stream.frame_size(), (32, 24));
        assert!(stream.needs_conversion());
        let state = stream.state.lock();
        let scratch = state.scratch.as_ref().unwrap();
        assert_eq!((scratch.width(), scratch.height()), (64, 48));
        let converter = state.converter.as_ref().unwrap();
        assert!(converter.matches(Pixel::YUV420P, 32, 24));
    }

    #[test]
    fn converter_is_replaced_when_source_changes() {
        let (_muxer, stream) = started_null_stream();

        I420::new(32, 24).send_to(&stream, 0).unwrap();
        I420::new(16, 12).send_to(&stream, FRAME_NS).unwrap();

        let state = stream.state.lock();
        assert!(state.converter.as_ref().unwrap().matches(Pixel::YUV420P, 16, 12));
    }

    #[test]
    fn returning_to_encoder_geometry_stops_conversion() {
        let (_muxer, stream) = started_null_stream();

        I420::new(32, 24).send_to(&stream, 0).unwrap();
        assert!(stream.needs_conversion());
        I420::new(64, 48).send_to(&stream, FRAME_NS).unwrap();
        assert!(!stream.needs_conversion());
    }

    #[test]
    fn timestamps_start_at_zero_and_increase() {
        let (_muxer, stream) = started_null_stream();
        let image = I420::new(64, 48);
        let base = 5_000_000_000;

        image.send_to(&stream, base).unwrap();
        assert_eq!(stream.state.lock().last_pts, Some(0));

        image.send_to(&stream, base + FRAME_NS).unwrap();
        assert_eq!(stream.state.lock().last_pts, Some(1));

        // Same timestamp again gets bumped rather than rejected.
        image.send_to(&stream, base + FRAME_NS).unwrap();
        assert_eq!(stream.state.lock().last_pts, Some(2));

        image.send_to(&stream, base + 10 * FRAME_NS).unwrap();
        assert_eq!(stream.state.lock().last_pts, Some(10));
    }

    #[test]
    fn invalid_frames_are_rejected_and_stream_stays_usable() {
        let (_muxer, stream) = started_null_stream();
        let image = I420::new(64, 48);
        image.send_to(&stream, 0).unwrap();

        let y = vec![0u8; 64 * 48];
        let planes = [Plane::new(&y, 64)];
        let frame = VideoFrame::new(FRAME_NS, 64, 48, &planes);
        assert_eq!(stream.send_frame(&frame), Err(StreamError::InvalidPlaneCount));

        let short = I420::new(64, 48);
        let planes = [
            Plane::new(&short.y, 32),
            Plane::new(&short.u, 32),
            Plane::new(&short.v, 32),
        ];
        let frame = VideoFrame::new(FRAME_NS, 64, 48, &planes);
        assert_eq!(stream.send_frame(&frame), Err(StreamError::InvalidStride));

        assert_eq!(image.send_to(&stream, FRAME_NS), Ok(()));
        assert_eq!(stream.state.lock().last_pts, Some(1));
    }

    #[test]
    fn rejected_frame_keeps_negotiated_format() {
        let (_muxer, stream) = started_null_stream();
        let image = I420::new(64, 48);
        image.send_to(&stream, 0).unwrap();

        let rgba = vec![0u8; 64 * 48 * 4];
        let planes = [Plane::new(&rgba, 10)];
        let frame = VideoFrame::new(FRAME_NS, 64, 48, &planes).with_format(PixelFormat::Rgba);
        assert_eq!(stream.send_frame(&frame), Err(StreamError::InvalidStride));

        assert_eq!(stream.pixel_format(), Some(PixelFormat::Yuv420p));
        assert!(!stream.needs_conversion());
        assert_eq!(image.send_to(&stream, FRAME_NS), Ok(()));
        assert_eq!(stream.state.lock().last_pts, Some(1));
    }

    #[test]
    fn undetectable_first_frame_is_rejected() {
        let (_muxer, stream) = started_null_stream();
        let rgba = vec![0u8; 64 * 48 * 4];
        let planes = [Plane::new(&rgba, 64 * 4)];

        let frame = VideoFrame::new(0, 64, 48, &planes);
        assert_eq!(stream.send_frame(&frame), Err(StreamError::InvalidPlaneCount));
        assert!(!stream.has_pixel_format());
    }

    #[test]
    fn explicit_reconfiguration() {
        let (_muxer, stream) = started_null_stream();

        assert_eq!(
            stream.set_pixel_format(PixelFormat::Unknown),
            Err(StreamError::InvalidPixelFormat)
        );
        assert_eq!(stream.set_frame_size(0, 48), Err(StreamError::InvalidResolution));

        stream.set_pixel_format(PixelFormat::Nv21).unwrap();
        assert!(stream.needs_conversion());
        assert!(stream.state.lock().scratch.is_some());
        // Nothing is built until a frame actually needs converting.
        assert!(stream.state.lock().converter.is_none());

        stream.set_pixel_format(PixelFormat::Yuv420p).unwrap();
        stream.set_frame_size(64, 48).unwrap();
        assert!(!stream.needs_conversion());
    }

    #[test]
    fn flush_finishes_the_stream() {
        let (_muxer, stream) = started_null_stream();
        I420::new(64, 48).send_to(&stream, 0).unwrap();

        assert_eq!(stream.flush(), Ok(()));
        assert!(!stream.is_started());
        assert_eq!(
            I420::new(64, 48).send_to(&stream, FRAME_NS),
            Err(StreamError::InvalidState)
        );
        assert_eq!(stream.start(), Err(StreamError::InvalidState));
        assert_eq!(stream.flush(), Err(StreamError::InvalidState));
    }

    #[test]
    fn failed_flush_can_be_repeated() {
        if ffmpeg_next::encoder::find_by_name("libx264").is_none() {
            eprintln!("libx264 not available, skipping");
            return;
        }

        let muxer = OutputMuxer::build(&engine(), "null", Some("null")).unwrap();
        let config = VideoConfig::new("libx264", PixelFormat::Yuv420p, 64, 48, 25);
        let stream = muxer.make_video_stream(&config).unwrap();
        stream.start().unwrap();

        // libx264 holds frames back for lookahead, so nothing is written yet.
        let image = I420::new(64, 48);
        for i in 0..3 {
            image.send_to(&stream, i * FRAME_NS).unwrap();
        }
        assert_eq!(stream.flush(), Err(StreamError::InvalidState));
        assert!(stream.is_started());

        muxer.open().unwrap();
        assert_eq!(stream.flush(), Ok(()));
        assert!(!stream.is_started());
        assert_eq!(stream.flush(), Err(StreamError::InvalidState));
    }

    #[test]
    fn sending_before_open_fails_to_write() {
        let muxer = OutputMuxer::build(&engine(), "null", Some("null")).unwrap();
        let stream = muxer.make_video_stream(&mpeg4_config()).unwrap();
        stream.start().unwrap();

        // mpeg4 emits a packet per frame, which has nowhere to go yet.
        assert_eq!(
            I420::new(64, 48).send_to(&stream, 0),
            Err(StreamError::InvalidState)
        );
    }

    #[test]
    fn every_frame_reaches_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.nut");
        let muxer = OutputMuxer::build(&engine(), path.to_str().unwrap(), None).unwrap();
        let stream = muxer.make_video_stream(&mpeg4_config()).unwrap();
        muxer.open().unwrap();
        stream.start().unwrap();

        let image = I420::new(64, 48);
        for i in 0..50 {
            image.send_to(&stream, i * FRAME_NS).unwrap();
        }
        stream.flush().unwrap();
        muxer.close().unwrap();

        assert_eq!(packet_counts(&path), vec![50]);
    }

    #[test]
    fn converted_frames_keep_increasing_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.nut");
        let muxer = OutputMuxer::build(&engine(), path.to_str().unwrap(), None).unwrap();
        let stream = muxer.make_video_stream(&mpeg4_config()).unwrap();
        muxer.open().unwrap();
        stream.start().unwrap();

        let y = vec![16u8; 32 * 24];
        let chroma = vec![128u8; 32 * 12];
        let planes = [
            Plane::new(&y, 32),
            Plane::new(&chroma, 32).with_pixel_stride(2),
            Plane::new(&chroma[1..], 32).with_pixel_stride(2),
        ];
        for i in 0..10 {
            stream.send_frame(&VideoFrame::new(i * FRAME_NS, 32, 24, &planes)).unwrap();
        }
        assert_eq!(stream.pixel_format(), Some(PixelFormat::Nv12));
        assert!(stream.needs_conversion());

        stream.flush().unwrap();
        muxer.close().unwrap();

        let pts = packet_pts(&path);
        assert_eq!(pts.len(), 1);
        assert_eq!(pts[0].len(), 10);
        assert!(pts[0].windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn concurrent_producers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.nut");
        let muxer = OutputMuxer::build(&engine(), path.to_str().unwrap(), None).unwrap();
        let stream = Arc::new(muxer.make_video_stream(&mpeg4_config()).unwrap());
        muxer.open().unwrap();
        stream.start().unwrap();

        let handles: Vec<_> = (0..2)
            .map(|producer| {
                let stream = Arc::clone(&stream);
                std::thread::spawn(move || {
                    let image = I420::new(64, 48);
                    for i in 0..10 {
                        let ts = (i * 2 + producer) * FRAME_NS;
                        image.send_to(&stream, ts).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        stream.flush().unwrap();
        muxer.close().unwrap();
        assert_eq!(packet_counts(&path), vec![20]);
    }

    #[test]
    fn camera_frames_through_libx264() {
        if ffmpeg_next::encoder::find_by_name("libx264").is_none() {
            eprintln!("libx264 not available, skipping");
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.mkv");
        let muxer = OutputMuxer::build(&engine(), path.to_str().unwrap(), None).unwrap();
        let config = VideoConfig::new("libx264", PixelFormat::Yuv420p, 1920, 1080, 30)
            .with_preset(ffmpeg_types::EncoderPreset::Ultrafast);
        let stream = muxer.make_video_stream(&config).unwrap();
        muxer.open().unwrap();
        stream.start().unwrap();

        let y = vec![64u8; 1920 * 1080];
        let chroma = vec![128u8; 1920 * 540];
        let planes = [
            Plane::new(&y, 1920),
            Plane::new(&chroma[1..], 1920).with_pixel_stride(2),
            Plane::new(&chroma, 1920).with_pixel_stride(2),
        ];
        for i in 0..10 {
            let frame = VideoFrame::new(i * 33_333_333, 1920, 1080, &planes);
            stream.send_frame(&frame).unwrap();
        }
        assert_eq!(stream.pixel_format(), Some(PixelFormat::Nv21));

        stream.flush().unwrap();
        muxer.close().unwrap();
        assert_eq!(packet_counts(&path), vec![10]);
    }

    #[test]
    fn libx264_timestamps_do_not_go_backwards() {
        if ffmpeg_next::encoder::find_by_name("libx264").is_none() {
            eprintln!("libx264 not available, skipping");
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.mkv");
        let muxer = OutputMuxer::build(&engine(), path.to_str().unwrap(), None).unwrap();
        // Ultrafast disables B-frames, so packets arrive in presentation order.
        let config = VideoConfig::new("libx264", PixelFormat::Yuv420p, 1920, 1080, 30)
            .with_bitrate(2_000_000)
            .with_preset(ffmpeg_types::EncoderPreset::Ultrafast);
        let stream = muxer.make_video_stream(&config).unwrap();
        muxer.open().unwrap();
        stream.start().unwrap();

        let image = I420::new(1920, 1080);
        for ts in [0, 33_333_333, 66_666_666] {
            image.send_to(&stream, ts).unwrap();
        }
        stream.flush().unwrap();
        muxer.close().unwrap();

        let pts = packet_pts(&path);
        assert_eq!(pts.len(), 1);
        assert_eq!(pts[0].len(), 3);
        assert!(pts[0].windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
