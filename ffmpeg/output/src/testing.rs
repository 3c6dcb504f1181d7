/*!
    Helpers shared by the engine-backed tests.
*/

use std::path::Path;

use ffmpeg_next::Packet;

use ffmpeg_types::{Plane, Result, VideoFrame};

use crate::{Engine, VideoStream};

pub fn engine() -> Engine {
    Engine::init().unwrap()
}

/// A planar YUV 4:2:0 image with tightly packed planes.
pub struct I420 {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl I420 {
    pub fn new(width: u32, height: u32) -> Self {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        Self {
            width,
            height,
            y: (0..w * h).map(|i| (i % 251) as u8).collect(),
            u: vec![96; cw * ch],
            v: vec![160; cw * ch],
        }
    }

    pub fn send_to(&self, stream: &VideoStream, ts: i64) -> Result<()> {
        let chroma_stride = (self.width as usize).div_ceil(2);
        let planes = [
            Plane::new(&self.y, self.width as usize),
            Plane::new(&self.u, chroma_stride),
            Plane::new(&self.v, chroma_stride),
        ];
        stream.send_frame(&VideoFrame::new(ts, self.width, self.height, &planes))
    }
}

/// Number of packets per stream in a finished file.
pub fn packet_counts(path: &Path) -> Vec<usize> {
    let mut input = ffmpeg_next::format::input(&path).unwrap();
    let mut counts = vec![0; input.nb_streams() as usize];
    let mut packet = Packet::empty();
    while packet.read(&mut input).is_ok() {
        counts[packet.stream()] += 1;
    }
    counts
}

/// Presentation timestamps per stream in a finished file, in file order.
pub fn packet_pts(path: &Path) -> Vec<Vec<i64>> {
    let mut input = ffmpeg_next::format::input(&path).unwrap();
    let mut pts = vec![Vec::new(); input.nb_streams() as usize];
    let mut packet = Packet::empty();
    while packet.read(&mut input).is_ok() {
        pts[packet.stream()].push(packet.pts().unwrap());
    }
    pts
}
