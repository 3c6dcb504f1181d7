use anyhow::{Result, bail};
use clap::Parser;

use ffmpeg_output::{Engine, OutputMuxer};

#[derive(Parser, Debug)]
pub struct FormatsCommand {
    /// Encoder name, e.g. libx264 or aac
    pub codec: String,
}

impl FormatsCommand {
    pub fn run(self) -> Result<()> {
        let engine = Engine::init()?;

        let pixel_formats = OutputMuxer::supported_formats(&engine, &self.codec);
        if !pixel_formats.is_empty() {
            println!("Pixel formats accepted by {}:", self.codec);
            for format in pixel_formats {
                println!("  - {}", format);
            }
            return Ok(());
        }

        let sample_formats = OutputMuxer::supported_sample_formats(&engine, &self.codec);
        if !sample_formats.is_empty() {
            println!("Sample formats accepted by {}:", self.codec);
            for format in sample_formats {
                println!("  - {}", format);
            }
            return Ok(());
        }

        bail!("No usable formats found for encoder '{}'", self.codec)
    }
}
