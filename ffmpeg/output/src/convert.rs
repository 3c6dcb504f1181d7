/*!
    Conversion between ffmpeg-next types and ffmpeg-types.
*/

use ffmpeg_next::{
    ChannelLayout as FFmpegChannelLayout, ffi,
    format::{Pixel, Sample, sample::Type},
    util::frame::video::Video as VideoFrameFFmpeg,
};

use ffmpeg_types::{PixelFormat, SampleFormat};

/**
    Convert our PixelFormat to FFmpeg's Pixel format.

    `Unknown` maps to the engine's "no format" value.
*/
pub fn pixel_format_to_ffmpeg(format: PixelFormat) -> Pixel {
    match format {
        PixelFormat::Yuv420p => Pixel::YUV420P,
        PixelFormat::Yuv444p => Pixel::YUV444P,
        PixelFormat::Nv12 => Pixel::NV12,
        PixelFormat::Nv21 => Pixel::NV21,
        PixelFormat::Rgba => Pixel::RGBA,
        PixelFormat::Rgb24 => Pixel::RGB24,
        PixelFormat::Unknown => Pixel::None,
    }
}

/**
    Convert FFmpeg's Pixel format to our PixelFormat.
*/
pub fn pixel_format_from_ffmpeg(format: Pixel) -> PixelFormat {
    match format {
        Pixel::YUV420P => PixelFormat::Yuv420p,
        Pixel::YUV444P => PixelFormat::Yuv444p,
        Pixel::NV12 => PixelFormat::Nv12,
        Pixel::NV21 => PixelFormat::Nv21,
        Pixel::RGBA => PixelFormat::Rgba,
        Pixel::RGB24 => PixelFormat::Rgb24,
        _ => PixelFormat::Unknown,
    }
}

/**
    Convert our SampleFormat to FFmpeg's packed Sample format.
*/
pub fn sample_format_to_ffmpeg(format: SampleFormat) -> Sample {
    match format {
        SampleFormat::S16 => Sample::I16(Type::Packed),
        SampleFormat::S32 => Sample::I32(Type::Packed),
        SampleFormat::F32 => Sample::F32(Type::Packed),
    }
}

/**
    Convert FFmpeg's Sample format to our SampleFormat, ignoring whether it
    is packed or planar.
*/
pub fn sample_format_from_ffmpeg(format: Sample) -> Option<SampleFormat> {
    match format {
        Sample::I16(_) => Some(SampleFormat::S16),
        Sample::I32(_) => Some(SampleFormat::S32),
        Sample::F32(_) => Some(SampleFormat::F32),
        _ => None,
    }
}

/**
    Channel layout for an interleaved channel count. Only mono and stereo are
    supported.
*/
pub fn channel_layout_for(channels: u16) -> Option<FFmpegChannelLayout> {
    match channels {
        1 => Some(FFmpegChannelLayout::MONO),
        2 => Some(FFmpegChannelLayout::STEREO),
        _ => None,
    }
}

/**
    Allocate a video frame with engine-owned, aligned buffers.

    Returns `None` if the engine refuses the allocation.
*/
pub fn make_video_frame(width: u32, height: u32, format: Pixel) -> Option<VideoFrameFFmpeg> {
    let mut frame = VideoFrameFFmpeg::empty();
    frame.set_width(width);
    frame.set_height(height);
    frame.set_format(format);

    let ret = unsafe { ffi::av_frame_get_buffer(frame.as_mut_ptr(), 0) };
    (ret >= 0).then_some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_formats_round_trip() {
        for format in PixelFormat::ALL {
            assert_eq!(pixel_format_from_ffmpeg(pixel_format_to_ffmpeg(format)), format);
        }
        assert_eq!(pixel_format_to_ffmpeg(PixelFormat::Unknown), Pixel::None);
    }

    #[test]
    fn unmapped_pixel_formats_are_unknown() {
        assert_eq!(pixel_format_from_ffmpeg(Pixel::BGRA), PixelFormat::Unknown);
        assert_eq!(pixel_format_from_ffmpeg(Pixel::YUV422P), PixelFormat::Unknown);
        assert_eq!(pixel_format_from_ffmpeg(Pixel::None), PixelFormat::Unknown);
    }

    #[test]
    fn sample_formats_ignore_packing() {
        for format in SampleFormat::ALL {
            assert_eq!(sample_format_from_ffmpeg(sample_format_to_ffmpeg(format)), Some(format));
        }
        assert_eq!(
            sample_format_from_ffmpeg(Sample::F32(Type::Planar)),
            Some(SampleFormat::F32)
        );
        assert_eq!(sample_format_from_ffmpeg(Sample::F64(Type::Packed)), None);
        assert_eq!(sample_format_from_ffmpeg(Sample::U8(Type::Packed)), None);
    }

    #[test]
    fn channel_layouts() {
        assert_eq!(channel_layout_for(1), Some(FFmpegChannelLayout::MONO));
        assert_eq!(channel_layout_for(2), Some(FFmpegChannelLayout::STEREO));
        assert_eq!(channel_layout_for(6), None);
        assert_eq!(channel_layout_for(0), None);
    }

    #[test]
    fn allocated_frame_has_requested_geometry() {
        crate::Engine::init().unwrap();
        let frame = make_video_frame(64, 48, Pixel::YUV420P).unwrap();
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.format(), Pixel::YUV420P);
        assert!(frame.stride(0) >= 64);
        assert!(frame.stride(1) >= 32);
    }
}
