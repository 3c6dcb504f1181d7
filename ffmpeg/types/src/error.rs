use thiserror::Error;

/**
    Errors reported by the output muxer and its stream encoders.

    Every variant carries a stable numeric code so that hosts on the other
    side of a foreign boundary can branch on the specific kind. Success is
    `Ok(())` and has no variant.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum StreamError {
    // ── General ───────────────────────────────────────────────────────
    #[error("unknown error")]
    Unknown,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("operation not allowed in the current state")]
    InvalidState,

    // ── Codec engine ──────────────────────────────────────────────────
    #[error("codec engine allocation failed")]
    AllocFailed,
    #[error("encoder not found")]
    CodecNotFound,
    #[error("unable to open encoder")]
    CodecOpenFailed,
    #[error("unable to create container stream")]
    StreamCreationFailed,
    #[error("unable to copy stream parameters")]
    StreamParametersFailed,
    #[error("unable to write to output")]
    WriteFailed,

    // ── Video ─────────────────────────────────────────────────────────
    #[error("invalid video format")]
    InvalidFormat,
    #[error("invalid video resolution")]
    InvalidResolution,
    #[error("invalid pixel format")]
    InvalidPixelFormat,
    #[error("invalid plane count")]
    InvalidPlaneCount,
    #[error("invalid plane stride")]
    InvalidStride,
}

impl StreamError {
    /// Every variant, in code order.
    pub const ALL: [StreamError; 14] = [
        Self::Unknown,
        Self::InvalidArgument,
        Self::InvalidState,
        Self::AllocFailed,
        Self::CodecNotFound,
        Self::CodecOpenFailed,
        Self::StreamCreationFailed,
        Self::StreamParametersFailed,
        Self::WriteFailed,
        Self::InvalidFormat,
        Self::InvalidResolution,
        Self::InvalidPixelFormat,
        Self::InvalidPlaneCount,
        Self::InvalidStride,
    ];

    /**
        Returns the numeric code of this error. Codes are always negative.
    */
    pub const fn code(self) -> i32 {
        match self {
            Self::Unknown => -1,
            Self::InvalidArgument => -2,
            Self::InvalidState => -3,
            Self::AllocFailed => -100,
            Self::CodecNotFound => -101,
            Self::CodecOpenFailed => -102,
            Self::StreamCreationFailed => -103,
            Self::StreamParametersFailed => -104,
            Self::WriteFailed => -105,
            Self::InvalidFormat => -200,
            Self::InvalidResolution => -201,
            Self::InvalidPixelFormat => -202,
            Self::InvalidPlaneCount => -203,
            Self::InvalidStride => -204,
        }
    }

    /**
        Looks an error up by its numeric code. `0` (success) and unassigned
        codes return `None`.
    */
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.code() == code)
    }

    /**
        Returns true if retrying the operation later may succeed, i.e. the
        error describes the lifecycle phase rather than a broken resource.
    */
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::InvalidState)
    }
}

/// Type alias for results that may return a [`StreamError`].
pub type Result<T> = std::result::Result<T, StreamError>;
