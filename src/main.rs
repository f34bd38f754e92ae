use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use ber_collector::collector;
use ber_collector::config::{self, Transport};
use ber_collector::inventory;
use ber_collector::poller::Poller;
use ber_collector::recorder::{self, Recorder};
use ber_collector::scheduler::Scheduler;

#[derive(Parser, Debug)]
#[command(name = "ber-collector", version, about = "Logs descrambler BER and C/N metrics to CSV")]
struct Cli {
    /// Inventory file: one address per line (rest) or `<address> <model>` (snmp)
    #[arg(short, long)]
    input: PathBuf,

    /// Output CSV file, truncated on start
    #[arg(short, long)]
    output: PathBuf,

    /// Seconds to wait between rounds of polling
    #[arg(short, long)]
    wait: Option<u64>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transport used to reach the devices
    #[arg(short, long, value_enum)]
    transport: Option<Transport>,

    /// Stop after this many rounds
    #[arg(long)]
    rounds: Option<u64>,

    /// Validate config and inventory, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::Config::load(path)?,
        None => config::Config::default(),
    };
    if let Some(wait) = cli.wait {
        config.poller.interval_secs = wait;
    }
    if let Some(transport) = cli.transport {
        config.poller.transport = transport;
    }

    init_logging(&config)?;

    let devices = inventory::load(&cli.input, &config)?;

    if cli.check {
        println!("Configuration is valid, {} devices.", devices.len());
        return Ok(());
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        devices = devices.len(),
        interval_secs = config.poller.interval_secs,
        "Starting"
    );

    if let Err(e) = run(cli, config, devices).await {
        error!(error = %e, "Collector terminated with error");
        return Err(e);
    }

    Ok(())
}

fn init_logging(config: &config::Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(&config.agent.log_level)
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    Ok(())
}

async fn run(
    cli: Cli,
    config: config::Config,
    devices: Vec<ber_collector::types::DeviceDescriptor>,
) -> Result<()> {
    let source = collector::create_source(&config)?;

    let header = recorder::header(&devices);
    let recorder = Recorder::create(&cli.output, &header, &config.output)?;

    let poller = Poller::new(
        devices,
        source,
        config.poller.fetch_timeout(),
        config.poller.on_failure,
    );
    let mut scheduler = Scheduler::new(poller, recorder, config.poller.interval());

    tokio::select! {
        res = scheduler.run(cli.rounds) => res?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, exiting");
        }
    }

    Ok(())
}
