use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "minuta")]
#[command(about = "Meeting transcription and summary delivery service", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Print version information
    Version,
}
