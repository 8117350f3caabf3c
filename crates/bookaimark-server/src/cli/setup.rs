use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "bookaimark",
    bin_name = "bookaimark",
    version,
    disable_help_subcommand = true
)]
#[command(about = "File-backed bookmark data API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,

        /// Config file (defaults to ./bookaimark.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print a commented configuration template
    Config {
        /// Config file to resolve with --effective
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the resolved configuration as JSON instead
        #[arg(long)]
        effective: bool,
    },
}
