/*!
    Shared types for the camera output pipeline.

    This crate defines the vocabulary that crosses the boundary between the
    producing application and the encoders: formats, stream configuration,
    borrowed frame views and the error taxonomy. It has no dependency on
    FFmpeg, so hosts and marshaling layers can use it without pulling in the
    bindings.
*/

mod config;
mod error;
mod format;
mod frame;

pub use config::{AudioConfig, EncoderPreset, VideoConfig};
pub use error::{Result, StreamError};
pub use format::{ParseFormatError, PixelFormat, SampleFormat};
pub use frame::{AudioData, Plane, VideoFrame};
