/*!
    Borrowed views over producer-owned frame and sample buffers.

    The producer owns every buffer. A view is only valid for the duration of
    one `send` call and nothing downstream keeps a reference past it.
*/

use crate::{PixelFormat, Result, StreamError};

/**
    One image plane: the bytes plus the distance between rows and between
    horizontally adjacent samples.
*/
#[derive(Clone, Copy, Debug)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    /// Bytes between the starts of two consecutive rows.
    pub stride: usize,
    /// Bytes between two horizontally adjacent samples of this plane.
    pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], stride: usize) -> Self {
        Self {
            data,
            stride,
            pixel_stride: 1,
        }
    }

    pub fn with_pixel_stride(mut self, pixel_stride: usize) -> Self {
        self.pixel_stride = pixel_stride;
        self
    }
}

/**
    A raw video frame as handed over by the producer.
*/
#[derive(Clone, Copy, Debug)]
pub struct VideoFrame<'a> {
    /// Capture timestamp in nanoseconds.
    pub ts: i64,
    pub width: u32,
    pub height: u32,
    /// Layout of the planes, if the producer knows it. When `None` the stream
    /// falls back to its negotiated format or detects a YUV 4:2:0 layout.
    pub format: Option<PixelFormat>,
    /// Up to four planes.
    pub planes: &'a [Plane<'a>],
}

impl<'a> VideoFrame<'a> {
    pub fn new(ts: i64, width: u32, height: u32, planes: &'a [Plane<'a>]) -> Self {
        Self {
            ts,
            width,
            height,
            format: None,
            planes,
        }
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = Some(format);
        self
    }

    /**
        Returns the plane that backs working plane `index` of `format`.

        Cameras hand semi-planar chroma over as separate U and V planes that
        alias the same interleaved memory. For NV21 the interleaved VU data
        begins at the V plane, so with three planes supplied the third one is
        used as the second working plane.
    */
    pub fn working_plane(&self, format: PixelFormat, index: usize) -> Option<&Plane<'a>> {
        match (format, index) {
            (PixelFormat::Nv21, 1) if self.planes.len() >= 3 => self.planes.get(2),
            _ => self.planes.get(index),
        }
    }

    /**
        Check that this frame can be read as `format` without touching memory
        outside of its planes.
    */
    pub fn validate(&self, format: PixelFormat) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(StreamError::InvalidResolution);
        }
        if format == PixelFormat::Unknown {
            return Err(StreamError::InvalidPixelFormat);
        }

        let plane_count = format.plane_count();
        if self.planes.len() < plane_count || self.planes.len() > 4 {
            return Err(StreamError::InvalidPlaneCount);
        }

        for index in 0..plane_count {
            let plane = self
                .working_plane(format, index)
                .ok_or(StreamError::InvalidPlaneCount)?;
            let (row_bytes, rows) = format
                .plane_extent(index, self.width, self.height)
                .ok_or(StreamError::InvalidPlaneCount)?;

            if plane.stride < row_bytes {
                return Err(StreamError::InvalidStride);
            }
            let required = plane
                .stride
                .checked_mul(rows - 1)
                .and_then(|bytes| bytes.checked_add(row_bytes))
                .ok_or(StreamError::InvalidStride)?;
            if plane.data.len() < required {
                return Err(StreamError::InvalidStride);
            }
        }

        Ok(())
    }

    /**
        Work out the layout of a three-plane YUV 4:2:0 image from its chroma
        pixel strides and plane addresses.

        A chroma pixel stride of 1 means fully planar. A stride of 2 means the
        chroma planes interleave in one buffer, and whichever of U or V starts
        first tells NV12 from NV21.
    */
    pub fn detect_yuv420_layout(&self) -> Result<PixelFormat> {
        let (Some(u), Some(v)) = (self.planes.get(1), self.planes.get(2)) else {
            return Err(StreamError::InvalidPlaneCount);
        };

        if u.pixel_stride != v.pixel_stride {
            return Err(StreamError::InvalidFormat);
        }

        match u.pixel_stride {
            1 => Ok(PixelFormat::Yuv420p),
            2 if u.data.as_ptr() < v.data.as_ptr() => Ok(PixelFormat::Nv12),
            2 => Ok(PixelFormat::Nv21),
            _ => Err(StreamError::InvalidFormat),
        }
    }
}

/**
    A chunk of raw audio as handed over by the producer.
*/
#[derive(Clone, Copy, Debug)]
pub struct AudioData<'a> {
    /// Capture timestamp in nanoseconds.
    pub ts: i64,
    /// Samples per channel in this chunk.
    pub samples: usize,
    pub sample_rate: u32,
    pub channel_count: u16,
    /// Sample planes. Only packed (interleaved) audio in a single plane is
    /// accepted.
    pub planes: &'a [&'a [u8]],
}

impl<'a> AudioData<'a> {
    pub fn new(
        ts: i64,
        samples: usize,
        sample_rate: u32,
        channel_count: u16,
        planes: &'a [&'a [u8]],
    ) -> Self {
        Self {
            ts,
            samples,
            sample_rate,
            channel_count,
            planes,
        }
    }

    /**
        Returns the interleaved bytes of this chunk, checked against the
        declared sample count.
    */
    pub fn interleaved(&self, bytes_per_sample: usize) -> Result<&'a [u8]> {
        let &[plane] = self.planes else {
            return Err(StreamError::InvalidArgument);
        };

        let len = self.samples * self.channel_count as usize * bytes_per_sample;
        plane.get(..len).ok_or(StreamError::InvalidArgument)
    }
}
