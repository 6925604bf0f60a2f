//! Command line entry point.
//!
//! Picks one of the prebuilt simulations by name and optionally writes a
//! structured log of the run:
//!
//! ```cargo run -- --sim tcp-transfer --log```

use clap::Parser;
use std::fs;
use std::sync::Arc;
use tracing_subscriber::FmtSubscriber;

use crate::simulations;

const AVAILABLE: &[&str] = &[
    "ping-switch",
    "tcp-transfer",
    "stp-triangle",
    "dhcp-subnet",
    "ftp-fetch",
];

#[derive(Parser)]
struct Args {
    /// Write tracing events to a file under ./logs.
    #[arg(short, long)]
    log: bool,
    /// Which prebuilt simulation to run.
    #[arg(short, long, default_value = "ping-switch")]
    sim: String,
    /// Seed for all randomness in the simulation.
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

/// Parses the arguments and runs the selected simulation.
pub fn initialize_from_arguments() {
    let cli = Args::parse();
    if cli.log {
        if let Err(error) = initialize_logging() {
            eprintln!("could not set up logging: {error}");
        }
    }
    match cli.sim.as_str() {
        "ping-switch" => simulations::ping_switch(cli.seed),
        "tcp-transfer" => simulations::tcp_transfer(cli.seed),
        "stp-triangle" => simulations::stp_triangle(cli.seed),
        "dhcp-subnet" => simulations::dhcp_subnet(cli.seed),
        "ftp-fetch" => simulations::ftp_fetch(cli.seed),
        other => eprintln!(
            "Unknown simulation '{other}'. Available: {}",
            AVAILABLE.join(", ")
        ),
    }
}

/// Routes every tracing event of the run into one timestamped JSON file.
/// Called at most once, before the simulation starts.
fn initialize_logging() -> std::io::Result<()> {
    fs::create_dir_all("./logs")?;
    let stamp = chrono::offset::Local::now().format("%y-%m-%d_%H-%M-%S");
    let file = fs::File::options()
        .append(true)
        .create(true)
        .open(format!("./logs/netsim-{stamp}.log"))?;
    let subscriber = FmtSubscriber::builder()
        .with_writer(Arc::new(file))
        .json()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("logging was already initialized");
    }
    Ok(())
}
