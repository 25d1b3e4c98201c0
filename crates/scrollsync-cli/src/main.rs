//! scrollsync - headless driver for the mirrored-scroll sync core
//!
//! Wires scroll controllers through impaired channels, replays scripted drag
//! gestures, and reports the offsets each surface settled at. Exists to
//! exercise scrollsync-core end-to-end; the real presentation layer would
//! feed live pointer samples instead.

use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use scrollsync_core::ChannelConfig;

mod scenario;

/// scrollsync - mirrored scroll surfaces over a simulated lossy link
#[derive(Parser)]
#[command(name = "scrollsync")]
#[command(about = "Replay drag gestures across mirrored scroll surfaces", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Link latency in seconds
    #[arg(short, long, default_value_t = 0.25)]
    latency: f64,

    /// Link reliability as a percentage in [0, 100]
    #[arg(short, long, default_value_t = 90)]
    reliability: u8,

    /// Emit the report as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay one drag gesture on surface A and report both surfaces
    Mirror {
        /// Number of pointer-move ticks before the gesture ends
        #[arg(long, default_value_t = 8)]
        ticks: u32,

        /// Vertical delta added per tick
        #[arg(long, default_value_t = -40.0, allow_hyphen_values = true)]
        step: f64,
    },

    /// Run a gesture, retune the link to ideal, run another
    Retune,

    /// Publish a batch of messages and measure the delivered fraction
    Stats {
        /// Number of messages to publish
        #[arg(long, default_value_t = 1000)]
        count: usize,
    },
}

fn link_config(cli: &Cli) -> Result<ChannelConfig> {
    if !cli.latency.is_finite() || cli.latency < 0.0 {
        bail!("latency must be a non-negative number of seconds");
    }
    Ok(ChannelConfig::new(
        Duration::from_secs_f64(cli.latency),
        cli.reliability,
    )?)
}

fn print_report<T: serde::Serialize + std::fmt::Debug>(report: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report:#?}");
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = link_config(&cli)?;
    tracing::info!(
        latency_secs = cli.latency,
        reliability = cli.reliability,
        "link configured"
    );

    match cli.command {
        Commands::Mirror { ticks, step } => {
            let report = scenario::mirror(config, ticks, step).await;
            print_report(&report, cli.json)?;
        }
        Commands::Retune => {
            let report = scenario::retune(config).await;
            print_report(&report, cli.json)?;
        }
        Commands::Stats { count } => {
            let report = scenario::stats(config, count).await;
            print_report(&report, cli.json)?;
        }
    }

    Ok(())
}
