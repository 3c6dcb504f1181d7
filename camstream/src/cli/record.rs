use std::thread;
use std::time::Instant;

use anyhow::{Result, anyhow, bail};
use clap::Parser;
use tracing::info;

use ffmpeg_output::{
    AudioConfig, AudioData, AudioStream, EncoderPreset, Engine, OutputMuxer, PixelFormat,
    SampleFormat, VideoConfig, VideoFrame, VideoStream,
};

use crate::synth::{TestPattern, Tone};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

#[derive(Parser, Debug)]
pub struct RecordCommand {
    /// Destination file or URL
    #[arg(short, long)]
    pub output: String,

    /// Container format, guessed from the destination when omitted
    #[arg(long)]
    pub protocol: Option<String>,

    /// Video encoder
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// Pixel format the video encoder runs in
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: PixelFormat,

    /// Pixel format of the synthetic camera
    #[arg(long, default_value = "nv12")]
    pub source_pix_fmt: PixelFormat,

    #[arg(long, default_value = "1280")]
    pub width: u32,

    #[arg(long, default_value = "720")]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value = "30")]
    pub fps: u32,

    /// Video bitrate in bits per second
    #[arg(long, default_value = "2000000")]
    pub bitrate: u64,

    /// Number of video frames to record
    #[arg(short = 'n', long, default_value = "90")]
    pub frames: u64,

    /// Encoder preset, e.g. ultrafast or medium
    #[arg(long)]
    pub preset: Option<EncoderPreset>,

    /// Frames between keyframes
    #[arg(long)]
    pub keyframe_interval: Option<u32>,

    /// Audio encoder
    #[arg(long, default_value = "aac")]
    pub audio_codec: String,

    /// Sample format of the synthetic microphone
    #[arg(long, default_value = "s16")]
    pub sample_fmt: SampleFormat,

    #[arg(long, default_value = "48000")]
    pub sample_rate: u32,

    #[arg(long, default_value = "1")]
    pub channels: u16,

    /// Audio bitrate in bits per second
    #[arg(long, default_value = "128000")]
    pub audio_bitrate: u64,

    /// Record video only
    #[arg(long)]
    pub no_audio: bool,
}

impl RecordCommand {
    pub fn run(self, log_level: &str) -> Result<()> {
        if self.source_pix_fmt == PixelFormat::Unknown {
            bail!("Unsupported source pixel format '{}'", self.source_pix_fmt);
        }

        let engine = Engine::init()?;
        if let Ok(level) = log_level.parse() {
            engine.set_log_level(level);
        }

        let muxer = OutputMuxer::build(&engine, self.output.as_str(), self.protocol.as_deref())?;

        let mut video_config =
            VideoConfig::new(&self.codec, self.pix_fmt, self.width, self.height, self.fps)
                .with_bitrate(self.bitrate);
        if let Some(preset) = self.preset {
            video_config = video_config.with_preset(preset);
        }
        if let Some(frames) = self.keyframe_interval {
            video_config = video_config.with_keyframe_interval(frames);
        }
        let video = muxer.make_video_stream(&video_config)?;

        let audio = if self.no_audio {
            None
        } else {
            let config =
                AudioConfig::new(&self.audio_codec, self.sample_fmt, self.sample_rate, self.channels)
                    .with_bitrate(self.audio_bitrate);
            Some(muxer.make_audio_stream(&config)?)
        };

        muxer.open()?;
        info!(
            output = %self.output,
            format = %muxer.format_name(),
            streams = muxer.stream_count(),
            "Recording"
        );

        let started = Instant::now();
        video.start()?;
        if let Some(audio) = &audio {
            audio.start()?;
        }

        let this = &self;
        thread::scope(|s| -> Result<()> {
            let video_task = s.spawn(|| this.feed_video(&video));
            let audio_task = audio
                .as_ref()
                .map(|audio| s.spawn(move || this.feed_audio(audio)));

            video_task
                .join()
                .map_err(|_| anyhow!("Video producer panicked"))??;
            if let Some(task) = audio_task {
                task.join()
                    .map_err(|_| anyhow!("Audio producer panicked"))??;
            }
            Ok(())
        })?;

        muxer.close()?;
        info!(
            output = %self.output,
            frames = self.frames,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recording finished"
        );
        Ok(())
    }

    fn frame_interval(&self) -> i64 {
        NANOS_PER_SECOND / self.fps as i64
    }

    fn feed_video(&self, stream: &VideoStream) -> Result<()> {
        let mut pattern = TestPattern::new(self.source_pix_fmt, self.width, self.height);

        for index in 0..self.frames {
            pattern.render(index);
            let planes = pattern.planes();
            let ts = index as i64 * self.frame_interval();
            let mut frame = VideoFrame::new(ts, self.width, self.height, &planes);
            if let Some(format) = pattern.declared_format() {
                frame = frame.with_format(format);
            }
            stream.send_frame(&frame)?;
        }

        stream.stop();
        stream.flush()?;
        Ok(())
    }

    /// One chunk of microphone samples per video frame.
    fn feed_audio(&self, stream: &AudioStream) -> Result<()> {
        let mut tone = Tone::new(440.0, self.sample_rate, self.channels);
        let samples = (self.sample_rate / self.fps).max(1) as usize;

        for index in 0..self.frames {
            let bytes = tone.next_chunk(samples, self.sample_fmt);
            let planes = [bytes.as_slice()];
            let ts = index as i64 * self.frame_interval();
            let data = AudioData::new(ts, samples, self.sample_rate, self.channels, &planes);
            stream.send(&data)?;
        }

        stream.stop();
        stream.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Args, Command};

    fn parse(args: &[&str]) -> RecordCommand {
        let args = Args::try_parse_from([&["camstream", "record"][..], args].concat()).unwrap();
        match args.command {
            Command::Record(cmd) => cmd,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn defaults() {
        let cmd = parse(&["--output", "out.mp4"]);
        assert_eq!(cmd.codec, "libx264");
        assert_eq!(cmd.pix_fmt, PixelFormat::Yuv420p);
        assert_eq!(cmd.source_pix_fmt, PixelFormat::Nv12);
        assert_eq!((cmd.width, cmd.height, cmd.fps), (1280, 720, 30));
        assert_eq!(cmd.sample_fmt, SampleFormat::S16);
        assert_eq!(cmd.preset, None);
        assert!(!cmd.no_audio);
        assert_eq!(cmd.frame_interval(), 33_333_333);
    }

    #[test]
    fn formats_and_presets_parse() {
        let cmd = parse(&[
            "-o",
            "rtmp://localhost/live/cam",
            "--protocol",
            "flv",
            "--source-pix-fmt",
            "NV21",
            "--preset",
            "ultrafast",
            "--sample-fmt",
            "f32",
        ]);
        assert_eq!(cmd.protocol.as_deref(), Some("flv"));
        assert_eq!(cmd.source_pix_fmt, PixelFormat::Nv21);
        assert_eq!(cmd.preset, Some(EncoderPreset::Ultrafast));
        assert_eq!(cmd.sample_fmt, SampleFormat::F32);
    }

    #[test]
    fn rejects_unknown_formats() {
        assert!(
            Args::try_parse_from(["camstream", "record", "-o", "x.mp4", "--pix-fmt", "yuyv422"])
                .is_err()
        );
        assert!(Args::try_parse_from(["camstream", "record"]).is_err());
    }

    #[test]
    fn records_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mkv");
        let cmd = parse(&[
            "-o",
            path.to_str().unwrap(),
            "--codec",
            "mpeg4",
            "--width",
            "160",
            "--height",
            "120",
            "--frames",
            "15",
            "--source-pix-fmt",
            "nv21",
            "--audio-codec",
            "pcm_s16le",
            "--channels",
            "2",
        ]);
        cmd.run("warn").unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        assert!(len > 0);
    }
}
