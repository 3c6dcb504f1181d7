use anyhow::Result;
use clap::Parser;

mod cli;
mod synth;

fn main() -> Result<()> {
    cli::Args::parse().run()
}
