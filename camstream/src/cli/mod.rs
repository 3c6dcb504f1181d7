use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod formats;
mod record;

pub use formats::FormatsCommand;
pub use record::RecordCommand;

#[derive(Parser, Debug)]
#[command(name = "camstream")]
#[command(about = "Encode camera and microphone input into a single recording or stream")]
pub struct Args {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record a synthetic camera and microphone feed
    Record(RecordCommand),
    /// List the input formats an encoder accepts
    Formats(FormatsCommand),
}

impl Args {
    pub fn run(self) -> Result<()> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();

        match self.command {
            Command::Record(cmd) => cmd.run(&self.log_level),
            Command::Formats(cmd) => cmd.run(),
        }
    }
}
