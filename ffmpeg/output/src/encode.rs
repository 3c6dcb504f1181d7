/*!
    The send/receive loop shared by the video and audio encoders.
*/

use std::sync::Arc;

use ffmpeg_next::{Packet, Rational as FFmpegRational, encoder::Encoder, frame::Frame};
use tracing::{error, warn};

use ffmpeg_types::{Result, StreamError};

use crate::muxer::MuxerShared;
use crate::util::is_again;

/**
    Lifecycle of a stream encoder.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Input is dropped.
    Stopped,
    /// Input is encoded.
    Started,
    /// Flushed; the encoder accepts nothing more.
    Finished,
}

/**
    Where the packets of one encoder end up: a stream of the shared muxer.
*/
pub(crate) struct Track {
    muxer: Arc<MuxerShared>,
    index: usize,
    time_base: FFmpegRational,
}

impl Track {
    pub fn new(muxer: Arc<MuxerShared>, index: usize, time_base: FFmpegRational) -> Self {
        Self {
            muxer,
            index,
            time_base,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn time_base(&self) -> FFmpegRational {
        self.time_base
    }

    fn write(&self, packet: &mut Packet) -> Result<()> {
        self.muxer.write_packet(packet, self.index, self.time_base)
    }
}

/**
    Submit one frame and write every packet the encoder produces for it.

    When the encoder reports backpressure on submission, its pending output
    is written first and the frame is submitted again.
*/
pub(crate) fn encode_frame(
    encoder: &mut Encoder,
    frame: &Frame,
    packet: &mut Packet,
    track: &Track,
) -> Result<()> {
    loop {
        let accepted = match encoder.send_frame(frame) {
            Ok(()) => true,
            Err(e) if is_again(&e) => false,
            Err(e) => {
                error!(stream = track.index, error = %e, "Failed to send frame to encoder");
                return Err(StreamError::Unknown);
            }
        };

        let written = drain(encoder, packet, track)?;

        if accepted {
            return Ok(());
        }
        if written == 0 {
            error!(stream = track.index, "Encoder refused input without producing output");
            return Err(StreamError::Unknown);
        }
    }
}

/**
    Signal end of stream and write everything the encoder still holds.
    Returns the number of packets written.
*/
pub(crate) fn flush(encoder: &mut Encoder, packet: &mut Packet, track: &Track) -> Result<usize> {
    if let Err(e) = encoder.send_eof() {
        warn!(stream = track.index, error = %e, "Failed to signal end of stream");
    }
    drain(encoder, packet, track)
}

fn drain(encoder: &mut Encoder, packet: &mut Packet, track: &Track) -> Result<usize> {
    let mut written = 0;
    loop {
        match encoder.receive_packet(packet) {
            Ok(()) => {
                track.write(packet)?;
                written += 1;
            }
            Err(e) if is_again(&e) => return Ok(written),
            Err(ffmpeg_next::Error::Eof) => return Ok(written),
            Err(e) => {
                error!(stream = track.index, error = %e, "Failed to receive packet from encoder");
                return Err(StreamError::Unknown);
            }
        }
    }
}
