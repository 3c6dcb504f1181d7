/*!
    Stream encoder configuration types.
*/

use crate::{PixelFormat, Result, SampleFormat, StreamError};

/**
    Encoder speed preset.

    Slower presets produce better compression (smaller output at the same
    quality) but take longer to encode. Only encoders that understand the
    `preset` option are affected.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EncoderPreset {
    /// Fastest encoding, largest output.
    Ultrafast,
    /// Very fast encoding.
    Superfast,
    /// Fast encoding.
    Veryfast,
    /// Faster than default.
    Faster,
    /// Fast encoding, good for live capture.
    Fast,
    /// Default balance of speed and compression.
    #[default]
    Medium,
    /// Better compression, slower.
    Slow,
    /// Even better compression.
    Slower,
    /// Best compression, slowest.
    Veryslow,
}

impl EncoderPreset {
    /**
        Get the engine preset string.
    */
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
        }
    }
}

impl std::str::FromStr for EncoderPreset {
    type Err = crate::ParseFormatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        const ALL: [EncoderPreset; 9] = [
            EncoderPreset::Ultrafast,
            EncoderPreset::Superfast,
            EncoderPreset::Veryfast,
            EncoderPreset::Faster,
            EncoderPreset::Fast,
            EncoderPreset::Medium,
            EncoderPreset::Slow,
            EncoderPreset::Slower,
            EncoderPreset::Veryslow,
        ];

        ALL.into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::ParseFormatError(s.to_string()))
    }
}

/**
    Configuration for a video stream encoder.

    Supplied once when the stream is created and never mutated afterwards.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct VideoConfig {
    /// Encoder name as known to the codec engine (e.g. `libx264`).
    pub codec_name: String,
    /// Pixel format the encoder is opened with.
    pub pixel_format: PixelFormat,
    /// Target bitrate in bits per second.
    pub bitrate: u64,
    /// Frames per second.
    pub framerate: u32,
    /// Encoded frame width in pixels.
    pub width: u32,
    /// Encoded frame height in pixels.
    pub height: u32,
    /// Encoder speed preset (None = encoder default).
    pub preset: Option<EncoderPreset>,
    /// Keyframe interval in frames (None = encoder default).
    pub keyframe_interval: Option<u32>,
}

impl VideoConfig {
    /**
        Create a new video configuration.
    */
    pub fn new(
        codec_name: impl Into<String>,
        pixel_format: PixelFormat,
        width: u32,
        height: u32,
        framerate: u32,
    ) -> Self {
        Self {
            codec_name: codec_name.into(),
            pixel_format,
            bitrate: 2_000_000,
            framerate,
            width,
            height,
            preset: None,
            keyframe_interval: None,
        }
    }

    /**
        Set the target bitrate in bits per second.
    */
    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    /**
        Set the encoder preset.
    */
    pub fn with_preset(mut self, preset: EncoderPreset) -> Self {
        self.preset = Some(preset);
        self
    }

    /**
        Set the keyframe interval in frames.
    */
    pub fn with_keyframe_interval(mut self, frames: u32) -> Self {
        self.keyframe_interval = Some(frames);
        self
    }

    /**
        Check that the configuration can describe an encoder at all.
    */
    pub fn validate(&self) -> Result<()> {
        if self.codec_name.is_empty() || self.framerate == 0 || self.bitrate == 0 {
            return Err(StreamError::InvalidArgument);
        }
        if self.width == 0 || self.height == 0 {
            return Err(StreamError::InvalidResolution);
        }
        if self.pixel_format == PixelFormat::Unknown {
            return Err(StreamError::InvalidPixelFormat);
        }
        Ok(())
    }
}

/**
    Configuration for an audio stream encoder.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct AudioConfig {
    /// Encoder name as known to the codec engine (e.g. `aac`).
    pub codec_name: String,
    /// Sample format the producer delivers.
    pub sample_format: SampleFormat,
    /// Target bitrate in bits per second.
    pub bitrate: u64,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channel_count: u16,
}

impl AudioConfig {
    /**
        Create a new audio configuration.
    */
    pub fn new(
        codec_name: impl Into<String>,
        sample_format: SampleFormat,
        sample_rate: u32,
        channel_count: u16,
    ) -> Self {
        Self {
            codec_name: codec_name.into(),
            sample_format,
            bitrate: 128_000,
            sample_rate,
            channel_count,
        }
    }

    /**
        Set the target bitrate in bits per second.
    */
    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.codec_name.is_empty()
            || self.sample_rate == 0
            || self.channel_count == 0
            || self.bitrate == 0
        {
            return Err(StreamError::InvalidArgument);
        }
        Ok(())
    }
}
