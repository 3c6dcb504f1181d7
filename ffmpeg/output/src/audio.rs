/*!
    Audio stream encoder.
*/

use ffmpeg_next::{
    ChannelLayout as FFmpegChannelLayout, Packet,
    encoder::audio::Encoder as AudioEncoderFFmpeg,
    ffi,
    format::Sample,
    software::resampling::context::Context as ResamplerContext,
    util::frame::audio::Audio as AudioFrameFFmpeg,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use ffmpeg_types::{AudioConfig, AudioData, Result, SampleFormat, StreamError};

use crate::convert::sample_format_to_ffmpeg;
use crate::encode::{self, Phase, Track};

/// Window used when the encoder accepts any number of samples per frame.
const DEFAULT_WINDOW: usize = 1024;

/**
    Encodes interleaved PCM from the microphone into one audio stream of an
    output.

    Incoming samples are buffered and handed to the encoder in windows of the
    size it requires. Presentation time is the number of samples encoded so
    far, so gaps between producer calls do not show up in the output.
*/
pub struct AudioStream {
    track: Track,
    state: Mutex<AudioState>,
}

struct AudioState {
    index: usize,
    encoder: AudioEncoderFFmpeg,
    packet: Packet,
    layout: FFmpegChannelLayout,
    sample_rate: u32,
    channel_count: u16,
    /// Format the encoder was opened with.
    encoder_format: Sample,
    /// Samples per channel in one encoder frame.
    window: usize,
    /// Format the producer delivers until told otherwise.
    default_format: SampleFormat,
    sample_format: Option<SampleFormat>,
    resampler: Option<Resampler>,
    /// Window in the producer format, reused across windows.
    input: Option<AudioFrameFFmpeg>,
    /// Window in the encoder format, reused while resampling.
    output: Option<AudioFrameFFmpeg>,
    /// Interleaved samples not yet encoded.
    pending: Vec<u8>,
    /// Presentation time of the next window, in samples.
    cursor: i64,
    phase: Phase,
}

// SAFETY: the encoder and resampler are only used while holding the stream
// lock.
unsafe impl Send for AudioState {}

struct Resampler {
    context: ResamplerContext,
    format: Sample,
}

impl AudioStream {
    pub(crate) fn new(
        track: Track,
        encoder: AudioEncoderFFmpeg,
        config: &AudioConfig,
        layout: FFmpegChannelLayout,
    ) -> Self {
        let window = match encoder.frame_size() {
            0 => DEFAULT_WINDOW,
            size => size as usize,
        };

        let state = AudioState {
            index: track.index(),
            encoder_format: encoder.format(),
            encoder,
            packet: Packet::empty(),
            layout,
            sample_rate: config.sample_rate,
            channel_count: config.channel_count,
            window,
            default_format: config.sample_format,
            sample_format: None,
            resampler: None,
            input: None,
            output: None,
            pending: Vec::new(),
            cursor: 0,
            phase: Phase::Stopped,
        };

        Self {
            track,
            state: Mutex::new(state),
        }
    }

    /**
        Start accepting samples. Starting a started stream does nothing.
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
                info!(stream = state.index, "Audio stream started");
                Ok(())
            }
        }
    }

    /**
        Stop accepting samples. Samples sent while stopped are dropped;
        samples already buffered are kept.
    */
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if state.phase == Phase::Started {
            state.phase = Phase::Stopped;
            info!(stream = state.index, "Audio stream stopped");
        }
    }

    /**
        Buffer a chunk of samples and encode every full window.

        Samples sent to a stopped stream are dropped and `Ok(())` is returned.
        The chunk must match the configured sample rate and channel count.
    */
    pub fn send(&self, data: &AudioData) -> Result<()> {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Started => {}
            Phase::Stopped => {
                trace!(stream = state.index, ts = data.ts, "Stream is not started, dropping samples");
                return Ok(());
            }
            Phase::Finished => {
                error!(stream = state.index, "Samples sent to a flushed stream");
                return Err(StreamError::InvalidState);
            }
        }

        if data.sample_rate != state.sample_rate || data.channel_count != state.channel_count {
            error!(
                stream = state.index,
                sample_rate = data.sample_rate,
                channels = data.channel_count,
                expected_sample_rate = state.sample_rate,
                expected_channels = state.channel_count,
                "Audio does not match the stream configuration"
            );
            return Err(StreamError::InvalidArgument);
        }

        let format = state.negotiated_format();
        let bytes = data.interleaved(format.bytes_per_sample()).inspect_err(|_| {
            error!(
                stream = state.index,
                samples = data.samples,
                planes = data.planes.len(),
                "Expected one plane of interleaved samples"
            );
        })?;

        state.pending.extend_from_slice(bytes);
        state.encode_pending(format, &self.track)
    }

    /**
        Set the sample format the producer delivers. Samples buffered in a
        different format are discarded.
    */
    pub fn set_format(&self, format: SampleFormat) {
        let mut state = self.state.lock();
        let current = state.negotiated_format();
        if current != format && !state.pending.is_empty() {
            warn!(
                stream = state.index,
                from = %current,
                to = %format,
                bytes = state.pending.len(),
                "Sample format changed, dropping buffered samples"
            );
            state.pending.clear();
        }
        info!(stream = state.index, %format, "Set sample format");
        state.sample_format = Some(format);
    }

    /**
        Encode what is still buffered, padded with silence to a full window,
        and drain the encoder.

        Call this before closing the output. A flushed stream accepts no more
        samples and cannot be restarted. If writing fails the stream is left
        as it was and the flush can be repeated; packets already taken from
        the encoder are lost.
    */
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.phase == Phase::Finished {
            return Err(StreamError::InvalidState);
        }

        let format = state.negotiated_format();
        if !state.pending.is_empty() {
            let window_bytes = state.window_bytes(format);
            let padding = window_bytes - state.pending.len() % window_bytes;
            if padding != window_bytes {
                let len = state.pending.len() + padding;
                state.pending.resize(len, 0);
            }
            state.encode_pending(format, &self.track)?;
        }

        let AudioState {
            index,
            encoder,
            packet,
            ..
        } = &mut *state;
        let written = encode::flush(encoder, packet, &self.track)?;
        info!(stream = *index, packets = written, "Audio stream flushed");
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

    /// The producer sample format, once set or used.
    pub fn sample_format(&self) -> Option<SampleFormat> {
        self.state.lock().sample_format
    }

    pub fn has_sample_format(&self) -> bool {
        self.sample_format().is_some()
    }

    /// Samples per channel handed to the encoder at a time.
    pub fn window_size(&self) -> usize {
        self.state.lock().window
    }

    /// Samples per channel buffered and waiting for a full window.
    pub fn buffered_samples(&self) -> usize {
        let state = self.state.lock();
        let format = state.sample_format.unwrap_or(state.default_format);
        state.pending.len() / state.frame_bytes(format)
    }
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AudioStream")
            .field("index", &state.index)
            .field("phase", &state.phase)
            .field("sample_format", &state.sample_format)
            .field("sample_rate", &state.sample_rate)
            .field("channels", &state.channel_count)
            .field("window", &state.window)
            .finish_non_exhaustive()
    }
}

impl AudioState {
    fn negotiated_format(&mut self) -> SampleFormat {
        *self.sample_format.get_or_insert(self.default_format)
    }

    /// Bytes of one sample across all channels.
    fn frame_bytes(&self, format: SampleFormat) -> usize {
        format.bytes_per_sample() * self.channel_count as usize
    }

    fn window_bytes(&self, format: SampleFormat) -> usize {
        self.window * self.frame_bytes(format)
    }

    /**
        Encode every full window in the buffer.

        Stops at the first failing window; later windows stay buffered.
    */
    fn encode_pending(&mut self, format: SampleFormat, track: &Track) -> Result<()> {
        let window_bytes = self.window_bytes(format);
        let mut consumed = 0;
        let mut result = Ok(());

        while self.pending.len() - consumed >= window_bytes {
            result = self.encode_window(consumed, format, track);
            consumed += window_bytes;
            if result.is_err() {
                break;
            }
        }

        self.pending.drain(..consumed);
        result
    }

    /**
        Encode the window starting at byte `offset` of the buffer.
    */
    fn encode_window(&mut self, offset: usize, format: SampleFormat, track: &Track) -> Result<()> {
        let bytes = self.window_bytes(format);
        let input_format = sample_format_to_ffmpeg(format);

        let input = reuse_frame(
            &mut self.input,
            input_format,
            self.window,
            self.layout,
            self.sample_rate,
        )
        .ok_or_else(|| {
            error!(stream = self.index, "Failed to allocate audio frame");
            StreamError::AllocFailed
        })?;
        input.data_mut(0)[..bytes].copy_from_slice(&self.pending[offset..offset + bytes]);

        let pts = self.cursor;
        self.cursor += self.window as i64;
        input.set_pts(Some(pts));

        let frame = if input_format == self.encoder_format {
            self.input.as_ref()
        } else {
            self.resample(input_format)?;
            self.output.as_ref()
        };
        let frame = frame.ok_or(StreamError::AllocFailed)?;

        encode::encode_frame(&mut self.encoder, frame, &mut self.packet, track)
    }

    /**
        Convert the current input window to the encoder's sample format.

        The resampler is kept while the input format stays the same and
        replaced as a whole when it changes.
    */
    fn resample(&mut self, format: Sample) -> Result<()> {
        let index = self.index;

        let resampler = match self.resampler.take() {
            Some(resampler) if resampler.format == format => resampler,
            stale => {
                drop(stale);
                let context = ResamplerContext::get(
                    format,
                    self.layout,
                    self.sample_rate,
                    self.encoder_format,
                    self.layout,
                    self.sample_rate,
                )
                .map_err(|e| {
                    error!(stream = index, error = %e, "Failed to create resampler");
                    StreamError::AllocFailed
                })?;
                debug!(
                    stream = index,
                    from = ?format,
                    to = ?self.encoder_format,
                    "Created sample format conversion"
                );
                Resampler { context, format }
            }
        };
        let resampler = self.resampler.insert(resampler);

        let input = self.input.as_ref().ok_or(StreamError::AllocFailed)?;
        let output = reuse_frame(
            &mut self.output,
            self.encoder_format,
            self.window,
            self.layout,
            self.sample_rate,
        )
        .ok_or_else(|| {
            error!(stream = index, "Failed to allocate conversion frame");
            StreamError::AllocFailed
        })?;

        resampler.context.run(input, output).map_err(|e| {
            error!(stream = index, error = %e, "Failed to convert samples");
            StreamError::InvalidArgument
        })?;
        output.set_pts(input.pts());
        Ok(())
    }
}

/**
    Hand out `slot` ready to be refilled with one window of `format`.

    The frame is allocated on first use or when the format changes. While the
    encoder still references the previous contents the buffers are copied
    first, so the refill never touches data the encoder holds.
*/
fn reuse_frame(
    slot: &mut Option<AudioFrameFFmpeg>,
    format: Sample,
    samples: usize,
    layout: FFmpegChannelLayout,
    rate: u32,
) -> Option<&mut AudioFrameFFmpeg> {
    if !slot.as_ref().is_some_and(|frame| frame.format() == format) {
        let mut frame = AudioFrameFFmpeg::new(format, samples, layout);
        if unsafe { frame.is_empty() } {
            return None;
        }
        frame.set_rate(rate);
        *slot = Some(frame);
    }

    let frame = slot.as_mut()?;
    if unsafe { ffi::av_frame_make_writable(frame.as_mut_ptr()) } < 0 {
        return None;
    }
    frame.set_samples(samples);
    Some(frame)
}
