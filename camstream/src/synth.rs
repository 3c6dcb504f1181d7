/*!
    Synthetic capture sources standing in for a camera and a microphone.
*/

use std::f64::consts::TAU;

use ffmpeg_types::{PixelFormat, Plane, SampleFormat};

/**
    A moving test pattern in any supported pixel format.

    Semi-planar images are handed out the way mobile cameras deliver them:
    three planes where U and V alias one interleaved chroma buffer, so the
    receiving stream has to work the layout out itself.
*/
pub struct TestPattern {
    format: PixelFormat,
    width: u32,
    height: u32,
    buffers: Vec<Vec<u8>>,
}

impl TestPattern {
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        let buffers = (0..format.plane_count())
            .filter_map(|plane| format.plane_extent(plane, width, height))
            .map(|(row_bytes, rows)| vec![0; row_bytes * rows])
            .collect();

        Self {
            format,
            width,
            height,
            buffers,
        }
    }

    /**
        The format to declare on frames, or `None` when the stream is
        expected to detect it from the plane layout.
    */
    pub fn declared_format(&self) -> Option<PixelFormat> {
        match self.format {
            PixelFormat::Yuv420p | PixelFormat::Nv12 | PixelFormat::Nv21 => None,
            format => Some(format),
        }
    }

    /**
        Draw frame number `index`: a diagonal gradient with a bright bar
        sweeping across and slowly cycling colors.
    */
    pub fn render(&mut self, index: u64) {
        let w = self.width as usize;
        let h = self.height as usize;
        let shift = (index * 4) as usize;
        let bar_start = (index as usize * 8) % w.max(1);
        let bar_width = (w / 16).max(1);
        let in_bar = |x: usize| (x + w - bar_start) % w < bar_width;
        let hue = (index * 2 % 256) as u8;

        match self.format {
            PixelFormat::Rgba | PixelFormat::Rgb24 => {
                let bpp = if self.format == PixelFormat::Rgba { 4 } else { 3 };
                let image = &mut self.buffers[0];
                for y in 0..h {
                    for x in 0..w {
                        let pixel = &mut image[(y * w + x) * bpp..][..bpp];
                        if in_bar(x) {
                            pixel.fill(255);
                        } else {
                            pixel[0] = (x * 255 / w) as u8;
                            pixel[1] = (y * 255 / h) as u8;
                            pixel[2] = hue;
                            if bpp == 4 {
                                pixel[3] = 255;
                            }
                        }
                    }
                }
            }
            PixelFormat::Unknown => {}
            _ => {
                let luma = &mut self.buffers[0];
                for y in 0..h {
                    for x in 0..w {
                        luma[y * w + x] = if in_bar(x) {
                            235
                        } else {
                            ((x + y + shift) % 220 + 16) as u8
                        };
                    }
                }

                let (u, v) = (hue, 255 - hue);
                match self.format {
                    PixelFormat::Nv12 => fill_interleaved(&mut self.buffers[1], u, v),
                    PixelFormat::Nv21 => fill_interleaved(&mut self.buffers[1], v, u),
                    _ => {
                        self.buffers[1].fill(u);
                        self.buffers[2].fill(v);
                    }
                }
            }
        }
    }

    /// Planes of the current image.
    pub fn planes(&self) -> Vec<Plane<'_>> {
        let stride = |plane| {
            self.format
                .plane_extent(plane, self.width, self.height)
                .map_or(0, |(row_bytes, _)| row_bytes)
        };

        match self.format {
            PixelFormat::Nv12 | PixelFormat::Nv21 => {
                let luma = &self.buffers[0];
                let chroma = &self.buffers[1];
                let first = Plane::new(chroma, stride(1)).with_pixel_stride(2);
                let second = Plane::new(&chroma[1..], stride(1)).with_pixel_stride(2);

                // Planes are always handed out as Y, U, V
                if self.format == PixelFormat::Nv12 {
                    vec![Plane::new(luma, stride(0)), first, second]
                } else {
                    vec![Plane::new(luma, stride(0)), second, first]
                }
            }
            _ => self
                .buffers
                .iter()
                .enumerate()
                .map(|(plane, data)| Plane::new(data, stride(plane)))
                .collect(),
        }
    }
}

fn fill_interleaved(chroma: &mut [u8], first: u8, second: u8) {
    for pair in chroma.chunks_mut(2) {
        pair[0] = first;
        if let Some(b) = pair.get_mut(1) {
            *b = second;
        }
    }
}

/**
    A continuous sine tone as interleaved PCM.
*/
pub struct Tone {
    frequency: f64,
    sample_rate: u32,
    channels: u16,
    position: u64,
}

impl Tone {
    pub fn new(frequency: f64, sample_rate: u32, channels: u16) -> Self {
        Self {
            frequency,
            sample_rate,
            channels,
            position: 0,
        }
    }

    /**
        The next `samples` samples per channel, continuing where the previous
        chunk stopped.
    */
    pub fn next_chunk(&mut self, samples: usize, format: SampleFormat) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(samples * self.channels as usize * format.bytes_per_sample());

        for _ in 0..samples {
            let t = self.position as f64 / self.sample_rate as f64;
            let value = (TAU * self.frequency * t).sin() * 0.25;
            self.position += 1;

            for _ in 0..self.channels {
                match format {
                    SampleFormat::S16 => {
                        bytes.extend_from_slice(&((value * i16::MAX as f64) as i16).to_le_bytes())
                    }
                    SampleFormat::S32 => {
                        bytes.extend_from_slice(&((value * i32::MAX as f64) as i32).to_le_bytes())
                    }
                    SampleFormat::F32 => bytes.extend_from_slice(&(value as f32).to_le_bytes()),
                }
            }
        }

        bytes
    }
}
