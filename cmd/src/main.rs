mod blocks;
mod split;

use std::io::stderr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split miniSEED files into per-channel segments.
    ///
    /// Filters are globs where `*` matches any run of characters and `?` matches a
    /// single character. A blank location is matched as `--`.
    Split {
        #[arg(short, long)]
        network: Option<String>,
        #[arg(short, long)]
        station: Option<String>,
        #[arg(short, long)]
        location: Option<String>,
        #[arg(short, long)]
        channel: Option<String>,

        /// Number of files read concurrently.
        #[arg(short, long, default_value_t = 1)]
        readers: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: Format,

        /// Input miniSEED files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Show the time windows covered by all of the given channels.
    Blocks {
        /// Channel key in the form `NET_STA LOC-CHA`, e.g., `IU_ANMO 00-BHZ`.
        #[arg(short, long = "key", required = true, value_parser = blocks::parse_key)]
        keys: Vec<blocks::ChannelKey>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: Format,

        /// Input miniSEED files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("SEEDSPLIT_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Split {
            network,
            station,
            location,
            channel,
            readers,
            format,
            inputs,
        } => {
            let filters = split::FilterArgs {
                network: network.clone(),
                station: station.clone(),
                location: location.clone(),
                channel: channel.clone(),
            };
            split::split(inputs, filters, *readers, format)
        }
        Commands::Blocks {
            keys,
            format,
            inputs,
        } => blocks::blocks(inputs, keys, format),
    }
}
