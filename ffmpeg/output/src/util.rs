/*!
    Timestamp and error helpers shared by the muxer and the encoders.
*/

use ffmpeg_next::{Packet, Rational as FFmpegRational, ffi};
use tracing::trace;

/// Time base of producer timestamps (nanoseconds).
pub const NANOS: FFmpegRational = FFmpegRational(1, 1_000_000_000);

/**
    Render a timestamp, or `NOPTS` when it is absent.
*/
pub fn ts_to_string(ts: Option<i64>) -> String {
    match ts {
        Some(ts) => ts.to_string(),
        None => "NOPTS".to_string(),
    }
}

/**
    Render a timestamp as seconds in the given time base, or `NOPTS` when it
    is absent.
*/
pub fn ts_to_time_string(ts: Option<i64>, time_base: FFmpegRational) -> String {
    match ts {
        Some(ts) if time_base.denominator() != 0 => {
            let seconds = ts as f64 * f64::from(time_base);
            format!("{seconds:.6}")
        }
        _ => "NOPTS".to_string(),
    }
}

/**
    Render an engine status code as text.
*/
pub fn err_to_string(code: i32) -> String {
    ffmpeg_next::Error::from(code).to_string()
}

/**
    Returns true if the engine asked to be called again later.
*/
pub fn is_again(error: &ffmpeg_next::Error) -> bool {
    matches!(error, ffmpeg_next::Error::Other { errno } if *errno == ffi::EAGAIN)
}

/**
    Rescale a timestamp from one time base to another, rounding to the
    nearest tick.
*/
pub fn rescale_ts(ts: i64, from: FFmpegRational, to: FFmpegRational) -> i64 {
    if from == to {
        return ts;
    }

    // ts * from.num / from.den * to.den / to.num
    let num = ts as i128 * from.numerator() as i128 * to.denominator() as i128;
    let den = from.denominator() as i128 * to.numerator() as i128;
    if den == 0 {
        return ts;
    }

    let half = den.abs() / 2;
    let rounded = if (num < 0) == (den < 0) {
        (num.abs() + half) / den.abs()
    } else {
        -((num.abs() + half) / den.abs())
    };
    rounded as i64
}

/**
    Log the timing of a packet about to be written.
*/
pub fn log_packet(packet: &Packet, time_base: FFmpegRational) {
    trace!(
        stream_index = packet.stream(),
        pts = %ts_to_string(packet.pts()),
        pts_time = %ts_to_time_string(packet.pts(), time_base),
        dts = %ts_to_string(packet.dts()),
        dts_time = %ts_to_time_string(packet.dts(), time_base),
        duration = packet.duration(),
        size = packet.size(),
        "Writing packet"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_render() {
        assert_eq!(ts_to_string(Some(42)), "42");
        assert_eq!(ts_to_string(None), "NOPTS");
        assert_eq!(
            ts_to_time_string(Some(3), FFmpegRational::new(1, 2)),
            "1.500000"
        );
        assert_eq!(ts_to_time_string(None, FFmpegRational::new(1, 30)), "NOPTS");
    }

    #[test]
    fn rescale_rounds_to_nearest() {
        let fps30 = FFmpegRational::new(1, 30);
        assert_eq!(rescale_ts(0, NANOS, fps30), 0);
        assert_eq!(rescale_ts(33_333_333, NANOS, fps30), 1);
        assert_eq!(rescale_ts(1_000_000_000, NANOS, fps30), 30);
        // 49ms is closer to one frame than to two at 30fps
        assert_eq!(rescale_ts(49_000_000, NANOS, fps30), 1);
        assert_eq!(rescale_ts(-33_333_333, NANOS, fps30), -1);
        assert_eq!(rescale_ts(7, fps30, fps30), 7);
    }

    #[test]
    fn again_is_detected() {
        let again = ffmpeg_next::Error::from(ffi::AVERROR(ffi::EAGAIN));
        assert!(is_again(&again));
        assert!(!is_again(&ffmpeg_next::Error::Eof));
    }
}
