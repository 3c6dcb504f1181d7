/*!
    Pixel and sample format types.
*/

/**
    Video pixel formats.

    The set of layouts a producer may hand to a video stream and an encoder may
    be configured with. Formats the codec engine knows but this enumeration
    does not are reported as [`PixelFormat::Unknown`] rather than dropped.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 12bpp (most common encoder input)
    Yuv420p,
    /// Planar YUV 4:4:4, 24bpp
    Yuv444p,
    /// Semi-planar YUV 4:2:0, interleaved UV
    Nv12,
    /// Semi-planar YUV 4:2:0, interleaved VU (common camera output)
    Nv21,
    /// Packed RGBA, 32bpp
    Rgba,
    /// Packed RGB, 24bpp
    Rgb24,
    /// A format without a counterpart in this enumeration.
    Unknown,
}

impl PixelFormat {
    /// Every known format, in host ordinal order.
    pub const ALL: [PixelFormat; 6] = [
        Self::Yuv420p,
        Self::Yuv444p,
        Self::Nv12,
        Self::Nv21,
        Self::Rgba,
        Self::Rgb24,
    ];

    /**
        Returns the number of data planes a frame of this format carries.

        `Unknown` has no planes.
    */
    pub const fn plane_count(self) -> usize {
        match self {
            Self::Yuv420p | Self::Yuv444p => 3,
            Self::Nv12 | Self::Nv21 => 2,
            Self::Rgba | Self::Rgb24 => 1,
            Self::Unknown => 0,
        }
    }

    /**
        Returns the minimum `(row_bytes, rows)` of `plane` for a frame of the
        given size, or `None` if the format has no such plane.
    */
    pub const fn plane_extent(self, plane: usize, width: u32, height: u32) -> Option<(usize, usize)> {
        let w = width as usize;
        let h = height as usize;
        let half_w = w.div_ceil(2);
        let half_h = h.div_ceil(2);

        match (self, plane) {
            (Self::Yuv420p, 0) | (Self::Yuv444p, 0) | (Self::Nv12, 0) | (Self::Nv21, 0) => {
                Some((w, h))
            }
            (Self::Yuv420p, 1 | 2) => Some((half_w, half_h)),
            (Self::Yuv444p, 1 | 2) => Some((w, h)),
            (Self::Nv12, 1) | (Self::Nv21, 1) => Some((half_w * 2, half_h)),
            (Self::Rgba, 0) => Some((w * 4, h)),
            (Self::Rgb24, 0) => Some((w * 3, h)),
            _ => None,
        }
    }

    /**
        Returns the host-side ordinal of this format, `-1` for `Unknown`.
    */
    pub const fn ordinal(self) -> i32 {
        match self {
            Self::Yuv420p => 0,
            Self::Yuv444p => 1,
            Self::Nv12 => 2,
            Self::Nv21 => 3,
            Self::Rgba => 4,
            Self::Rgb24 => 5,
            Self::Unknown => -1,
        }
    }

    /**
        Looks a format up by its host-side ordinal.
    */
    pub fn from_ordinal(ordinal: i32) -> Self {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or(Self::Unknown)
    }

    /**
        Returns the lowercase engine-style name of the format.
    */
    pub const fn name(self) -> &'static str {
        match self {
            Self::Yuv420p => "yuv420p",
            Self::Yuv444p => "yuv444p",
            Self::Nv12 => "nv12",
            Self::Nv21 => "nv21",
            Self::Rgba => "rgba",
            Self::Rgb24 => "rgb24",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for PixelFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseFormatError(s.to_string()))
    }
}

/**
    Audio sample formats.

    All formats are packed (interleaved) little-endian PCM as delivered by the
    capture side.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Signed 16-bit integer
    S16,
    /// Signed 32-bit integer
    S32,
    /// 32-bit floating point, range [-1.0, 1.0]
    F32,
}

impl SampleFormat {
    /// Every format, in host ordinal order.
    pub const ALL: [SampleFormat; 3] = [Self::S16, Self::S32, Self::F32];

    /**
        Returns the number of bytes per sample.
    */
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
        }
    }

    /**
        Returns true if this is a floating-point format.
    */
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32)
    }

    /**
        Looks a format up by its host-side ordinal.
    */
    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        usize::try_from(ordinal).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::F32 => "f32",
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SampleFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseFormatError(s.to_string()))
    }
}

/// Error returned when parsing a format name fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown format '{0}'")]
pub struct ParseFormatError(pub String);
