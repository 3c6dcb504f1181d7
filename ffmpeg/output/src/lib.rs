/*!
    Camera and microphone output for the ffmpeg crate ecosystem.

    This crate takes raw frames as a capture pipeline delivers them, encodes
    them and muxes every stream into one container. An [`OutputMuxer`] owns
    the container; each [`VideoStream`] and [`AudioStream`] it creates owns
    one encoder and hands its packets back to the muxer. Streams are safe to
    feed from different threads.

    # Recording

    ```ignore
    use ffmpeg_output::{AudioConfig, Engine, OutputMuxer, PixelFormat, SampleFormat, VideoConfig};

    let engine = Engine::init()?;
    let muxer = OutputMuxer::build(&engine, "out.mp4", None)?;

    // Streams must be created before the output is opened
    let video = muxer.make_video_stream(&VideoConfig::new(
        "libx264",
        PixelFormat::Yuv420p,
        1280,
        720,
        30,
    ))?;
    let audio = muxer.make_audio_stream(&AudioConfig::new("aac", SampleFormat::S16, 48000, 2))?;

    muxer.open()?;
    video.start()?;
    audio.start()?;

    // From the capture callbacks, timestamps in nanoseconds
    video.send_frame(&frame)?;
    audio.send(&samples)?;

    video.stop();
    audio.stop();
    video.flush()?;
    audio.flush()?;
    muxer.close()?;
    ```

    # Frames

    Video frames are borrowed views over up to three planes. When no pixel
    format is given, the first frame decides between planar YUV 4:2:0, NV12
    and NV21 from the plane layout. Frames whose format or size differs from
    the encoder's are converted before encoding.

    Audio arrives as interleaved PCM and is regrouped into windows of the
    size the encoder requires.
*/

mod audio;
mod convert;
mod encode;
mod engine;
mod muxer;
mod util;
mod video;

#[cfg(test)]
mod testing;

pub use ffmpeg_types::{
    AudioConfig, AudioData, EncoderPreset, ParseFormatError, PixelFormat, Plane, Result,
    SampleFormat, StreamError, VideoConfig, VideoFrame,
};

pub use audio::AudioStream;
pub use convert::{
    pixel_format_from_ffmpeg, pixel_format_to_ffmpeg, sample_format_from_ffmpeg,
    sample_format_to_ffmpeg,
};
pub use engine::Engine;
pub use muxer::OutputMuxer;
pub use util::{ts_to_string, ts_to_time_string};
pub use video::VideoStream;
