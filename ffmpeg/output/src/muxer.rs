/*!
    Output muxer implementation.
*/

use std::ffi::CString;
use std::ptr;
use std::sync::Arc;

use ffmpeg_next::{
    Dictionary, Packet, Rational as FFmpegRational,
    codec::{self, Flags as CodecFlags},
    encoder, ffi,
    format::{self, context::Output as OutputContext, flag::Flags as FormatFlags},
};
use parking_lot::Mutex;
use tracing::{Level, debug, enabled, error, info, warn};

use ffmpeg_types::{AudioConfig, PixelFormat, Result, SampleFormat, StreamError, VideoConfig};

use crate::audio::AudioStream;
use crate::convert::{
    channel_layout_for, pixel_format_from_ffmpeg, pixel_format_to_ffmpeg,
    sample_format_from_ffmpeg, sample_format_to_ffmpeg,
};
use crate::encode::Track;
use crate::engine::Engine;
use crate::util::{err_to_string, log_packet};
use crate::video::VideoStream;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Streams may be added.
    Building,
    /// Header written, packets flow.
    Open,
    /// Trailer written, nothing more is accepted.
    Closed,
}

struct MuxerState {
    output: OutputContext,
    phase: Phase,
    /// True when we opened the I/O sink ourselves and must close it.
    owns_sink: bool,
}

// SAFETY: the format context is only touched while holding the mutex around
// this state, never from two threads at once.
unsafe impl Send for MuxerState {}

/**
    State shared between the muxer and the streams it created.
*/
pub(crate) struct MuxerShared {
    url: String,
    state: Mutex<MuxerState>,
}

impl MuxerShared {
    /**
        Write one encoded packet produced in `time_base` to stream `index`.
    */
    pub fn write_packet(
        &self,
        packet: &mut Packet,
        index: usize,
        time_base: FFmpegRational,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.phase != Phase::Open {
            error!(url = %self.url, stream = index, "Packet written while the output is not open");
            return Err(StreamError::InvalidState);
        }

        let stream_time_base = state
            .output
            .stream(index)
            .map(|s| s.time_base())
            .ok_or(StreamError::InvalidArgument)?;

        packet.set_stream(index);
        packet.rescale_ts(time_base, stream_time_base);
        log_packet(packet, stream_time_base);

        packet.write_interleaved(&mut state.output).map_err(|e| {
            error!(url = %self.url, stream = index, error = %e, "Failed to write packet");
            StreamError::WriteFailed
        })
    }
}

/**
    Writes the encoded streams of a recording into one container.

    A muxer is built for a destination, gets its streams added, is opened
    (sink opened, header written), receives packets from its streams and is
    finally closed (trailer written, sink closed). Streams are created by the
    muxer and stay bound to it; they can be moved to the threads that feed
    them.
*/
pub struct OutputMuxer {
    shared: Arc<MuxerShared>,
}

impl OutputMuxer {
    /**
        Prepare a container for `url`.

        The container format is guessed from the url unless `format` names
        one explicitly (e.g. `"flv"` for an `rtmp://` destination). Nothing is
        opened yet.
    */
    pub fn build(_engine: &Engine, url: impl Into<String>, format: Option<&str>) -> Result<Self> {
        let url = url.into();
        let c_url = CString::new(url.as_str()).map_err(|_| StreamError::InvalidArgument)?;
        let c_format = format
            .map(CString::new)
            .transpose()
            .map_err(|_| StreamError::InvalidArgument)?;

        let mut ctx = ptr::null_mut();
        let ret = unsafe {
            ffi::avformat_alloc_output_context2(
                &mut ctx,
                ptr::null(),
                c_format.as_ref().map_or(ptr::null(), |f| f.as_ptr()),
                c_url.as_ptr(),
            )
        };
        if ret < 0 || ctx.is_null() {
            error!(%url, format, error = %err_to_string(ret), "Failed to allocate output context");
            return Err(StreamError::AllocFailed);
        }

        let output = unsafe { OutputContext::wrap(ctx) };
        debug!(%url, format = output.format().name(), "Output muxer built");

        Ok(Self {
            shared: Arc::new(MuxerShared {
                url,
                state: Mutex::new(MuxerState {
                    output,
                    phase: Phase::Building,
                    owns_sink: false,
                }),
            }),
        })
    }

    /**
        Open the sink and write the container header.

        On failure the muxer stays closed.
    */
    pub fn open(&self) -> Result<()> {
        let url = &self.shared.url;
        let mut state = self.shared.state.lock();
        if state.phase != Phase::Building {
            warn!(%url, "Output is already open or closed");
            return Err(StreamError::InvalidState);
        }

        info!(%url, "Opening output");

        if enabled!(Level::DEBUG) {
            format::context::output::dump(&state.output, 0, Some(url.as_str()));
        }

        let no_file = state.output.format().flags().contains(FormatFlags::NO_FILE);
        if !no_file {
            let c_url = CString::new(url.as_str()).map_err(|_| StreamError::InvalidArgument)?;
            let ret = unsafe {
                ffi::avio_open(
                    &mut (*state.output.as_mut_ptr()).pb,
                    c_url.as_ptr(),
                    ffi::AVIO_FLAG_WRITE,
                )
            };
            if ret < 0 {
                error!(%url, error = %err_to_string(ret), "Failed to open output");
                return Err(StreamError::WriteFailed);
            }
            state.owns_sink = true;
        }

        if let Err(e) = state.output.write_header() {
            error!(%url, error = %e, "Failed to write header");
            close_sink(&mut state);
            return Err(StreamError::StreamParametersFailed);
        }

        state.phase = Phase::Open;
        Ok(())
    }

    /**
        Write the container trailer and close the sink.

        The sink is closed even if the trailer cannot be written.
    */
    pub fn close(&self) -> Result<()> {
        let url = &self.shared.url;
        let mut state = self.shared.state.lock();
        if state.phase != Phase::Open {
            warn!(%url, "Output is not open");
            return Err(StreamError::InvalidState);
        }

        info!(%url, "Closing output");

        let trailer = state.output.write_trailer();
        close_sink(&mut state);
        state.phase = Phase::Closed;

        trailer.map_err(|e| {
            error!(%url, error = %e, "Failed to write trailer");
            StreamError::WriteFailed
        })
    }

    /**
        Add a video stream and open its encoder.

        Streams can only be added before the muxer is opened.
    */
    pub fn make_video_stream(&self, config: &VideoConfig) -> Result<VideoStream> {
        let url = &self.shared.url;
        config.validate().inspect_err(|e| {
            error!(%url, error = %e, ?config, "Invalid video stream configuration");
        })?;

        let mut state = self.shared.state.lock();
        if state.phase != Phase::Building {
            error!(%url, "Streams cannot be added once the output is open");
            return Err(StreamError::InvalidState);
        }

        let codec = encoder::find_by_name(&config.codec_name).ok_or_else(|| {
            error!(%url, codec = %config.codec_name, "Encoder not found");
            StreamError::CodecNotFound
        })?;

        let mut video = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| {
                error!(%url, error = %e, "Failed to allocate video encoder");
                StreamError::AllocFailed
            })?;

        let time_base = FFmpegRational::new(1, config.framerate as i32);
        video.set_width(config.width);
        video.set_height(config.height);
        video.set_format(pixel_format_to_ffmpeg(config.pixel_format));
        video.set_bit_rate(config.bitrate as usize);
        video.set_time_base(time_base);
        video.set_frame_rate(Some(FFmpegRational::new(config.framerate as i32, 1)));
        if let Some(gop) = config.keyframe_interval {
            video.set_gop(gop);
        }
        if state.output.format().flags().contains(FormatFlags::GLOBAL_HEADER) {
            video.set_flags(CodecFlags::GLOBAL_HEADER);
        }

        let mut opts = Dictionary::new();
        if let Some(preset) = config.preset {
            opts.set("preset", preset.as_str());
        }

        let encoder = video.open_with(opts).map_err(|e| {
            error!(%url, codec = %config.codec_name, error = %e, "Failed to open video encoder");
            StreamError::CodecOpenFailed
        })?;

        let index = add_stream(&mut state, codec, time_base, url, |codecpar| unsafe {
            ffi::avcodec_parameters_from_context(codecpar, encoder.as_ptr())
        })?;

        debug!(
            %url,
            stream = index,
            codec = %config.codec_name,
            width = config.width,
            height = config.height,
            framerate = config.framerate,
            format = %config.pixel_format,
            "Video stream created"
        );

        Ok(VideoStream::new(
            Track::new(Arc::clone(&self.shared), index, time_base),
            encoder,
        ))
    }

    /**
        Add an audio stream and open its encoder.

        The encoder runs in the configured sample format when it supports it,
        otherwise in its preferred one with a conversion stage in front.
    */
    pub fn make_audio_stream(&self, config: &AudioConfig) -> Result<AudioStream> {
        let url = &self.shared.url;
        config.validate().inspect_err(|e| {
            error!(%url, error = %e, ?config, "Invalid audio stream configuration");
        })?;
        let layout = channel_layout_for(config.channel_count).ok_or_else(|| {
            error!(%url, channels = config.channel_count, "Only mono and stereo audio is supported");
            StreamError::InvalidArgument
        })?;

        let mut state = self.shared.state.lock();
        if state.phase != Phase::Building {
            error!(%url, "Streams cannot be added once the output is open");
            return Err(StreamError::InvalidState);
        }

        let codec = encoder::find_by_name(&config.codec_name).ok_or_else(|| {
            error!(%url, codec = %config.codec_name, "Encoder not found");
            StreamError::CodecNotFound
        })?;

        let requested = sample_format_to_ffmpeg(config.sample_format);
        let advertised: Vec<_> = codec
            .audio()
            .ok()
            .and_then(|a| a.formats())
            .map(|formats| formats.collect())
            .unwrap_or_default();
        let sample_format = match advertised.first() {
            Some(&first) if !advertised.contains(&requested) => first,
            _ => requested,
        };

        let mut audio = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(|e| {
                error!(%url, error = %e, "Failed to allocate audio encoder");
                StreamError::AllocFailed
            })?;

        let time_base = FFmpegRational::new(1, config.sample_rate as i32);
        audio.set_rate(config.sample_rate as i32);
        audio.set_channel_layout(layout);
        audio.set_format(sample_format);
        audio.set_bit_rate(config.bitrate as usize);
        audio.set_time_base(time_base);
        if state.output.format().flags().contains(FormatFlags::GLOBAL_HEADER) {
            audio.set_flags(CodecFlags::GLOBAL_HEADER);
        }

        let encoder = audio.open_with(Dictionary::new()).map_err(|e| {
            error!(%url, codec = %config.codec_name, error = %e, "Failed to open audio encoder");
            StreamError::CodecOpenFailed
        })?;

        let index = add_stream(&mut state, codec, time_base, url, |codecpar| unsafe {
            ffi::avcodec_parameters_from_context(codecpar, encoder.as_ptr())
        })?;

        debug!(
            %url,
            stream = index,
            codec = %config.codec_name,
            sample_rate = config.sample_rate,
            channels = config.channel_count,
            format = %config.sample_format,
            encoder_format = ?sample_format,
            "Audio stream created"
        );

        Ok(AudioStream::new(
            Track::new(Arc::clone(&self.shared), index, time_base),
            encoder,
            config,
            layout,
        ))
    }

    /**
        Pixel formats the named video encoder accepts, limited to the ones
        this crate knows. Empty if the encoder does not exist or does not
        advertise its formats.
    */
    pub fn supported_formats(_engine: &Engine, codec_name: &str) -> Vec<PixelFormat> {
        let mut formats = Vec::new();
        let Some(video) = encoder::find_by_name(codec_name).and_then(|c| c.video().ok()) else {
            return formats;
        };

        for format in video.formats().into_iter().flatten().map(pixel_format_from_ffmpeg) {
            if format != PixelFormat::Unknown && !formats.contains(&format) {
                formats.push(format);
            }
        }
        formats
    }

    /**
        Sample formats the named audio encoder accepts, packed and planar
        variants folded together.
    */
    pub fn supported_sample_formats(_engine: &Engine, codec_name: &str) -> Vec<SampleFormat> {
        let mut formats = Vec::new();
        let Some(audio) = encoder::find_by_name(codec_name).and_then(|c| c.audio().ok()) else {
            return formats;
        };

        for format in audio.formats().into_iter().flatten().filter_map(sample_format_from_ffmpeg) {
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        formats
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn is_open(&self) -> bool {
        self.shared.state.lock().phase == Phase::Open
    }

    pub fn stream_count(&self) -> usize {
        self.shared.state.lock().output.nb_streams() as usize
    }

    /**
        Short name of the container format, e.g. `mp4`.
    */
    pub fn format_name(&self) -> String {
        self.shared.state.lock().output.format().name().to_string()
    }
}

impl Drop for OutputMuxer {
    fn drop(&mut self) {
        if self.is_open() {
            warn!(url = %self.shared.url, "Output dropped while open, finalizing");
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for OutputMuxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("OutputMuxer")
            .field("url", &self.shared.url)
            .field("phase", &state.phase)
            .field("streams", &state.output.nb_streams())
            .finish_non_exhaustive()
    }
}

/**
    Add a container stream for an opened encoder and copy the encoder's
    parameters onto it.
*/
fn add_stream(
    state: &mut MuxerState,
    codec: codec::Codec,
    time_base: FFmpegRational,
    url: &str,
    copy_parameters: impl FnOnce(*mut ffi::AVCodecParameters) -> i32,
) -> Result<usize> {
    let mut stream = state.output.add_stream(codec).map_err(|e| {
        error!(%url, error = %e, "Failed to create stream");
        StreamError::StreamCreationFailed
    })?;

    stream.set_time_base(time_base);
    let index = stream.index();

    let ret = unsafe {
        let ptr = stream.as_mut_ptr();
        (*ptr).id = index as i32;
        copy_parameters((*ptr).codecpar)
    };
    if ret < 0 {
        error!(%url, stream = index, error = %err_to_string(ret), "Failed to copy stream parameters");
        return Err(StreamError::StreamParametersFailed);
    }

    Ok(index)
}

fn close_sink(state: &mut MuxerState) {
    if state.owns_sink {
        unsafe {
            ffi::avio_closep(&mut (*state.output.as_mut_ptr()).pb);
        }
        state.owns_sink = false;
    }
}
