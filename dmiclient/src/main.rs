use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dmiclient::cli::Console;
use dmiclient::client::{PmClient, DEFAULT_SOCKET_PATH};
use dmiclient::scene::SceneStateMachine;

/// Interactive console for the dmicade process manager.
#[derive(Parser, Debug)]
#[command(name = "dmic-console")]
struct Args {
    /// Path to the process manager's Unix domain socket
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Seconds between connect attempts
    #[arg(long, default_value_t = 1.0)]
    retry_interval: f64,

    /// Overall connect timeout in seconds; retries forever when omitted
    #[arg(long)]
    connect_timeout: Option<f64>,

    /// Print client events as JSON lines instead of colored text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let (client, channels) = PmClient::new(args.socket);
    let scene = SceneStateMachine::new(channels.inbound);

    let mut console = Console::new(
        client,
        scene,
        channels.events,
        Duration::from_secs_f64(args.retry_interval),
        args.connect_timeout.map(Duration::from_secs_f64),
        args.json,
    );

    console.run().await
}
