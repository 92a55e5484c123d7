//! Mock process manager for developing and demoing the cabinet UI client.
//!
//! Serves the newline-delimited text protocol on a Unix domain socket:
//! answers `start_app:<id>` according to the configured app lists and
//! forwards anything typed on stdin verbatim to the connected client, which
//! makes it easy to inject events like `idle_enter` or `app_crashed` by
//! hand. One client is served at a time.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Mock dmicade process manager.
#[derive(Parser, Debug)]
#[command(name = "pmstub")]
struct Args {
    /// Socket path to listen on
    #[arg(long, default_value = "/tmp/dmicade_socket.s")]
    socket: PathBuf,

    /// Known app ids (comma separated); every id is known when empty
    #[arg(long, value_delimiter = ',')]
    apps: Vec<String>,

    /// App ids whose launch is reported as failed (comma separated)
    #[arg(long, value_delimiter = ',')]
    failing: Vec<String>,

    /// Milliseconds to wait before answering a start request
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
}

struct Stub {
    apps: HashSet<String>,
    failing: HashSet<String>,
    delay: Duration,
}

impl Stub {
    fn reply_for(&self, app_id: &str) -> &'static str {
        if self.failing.contains(app_id) {
            "app_started:false"
        } else if self.apps.is_empty() || self.apps.contains(app_id) {
            "app_started:true"
        } else {
            "app_not_found"
        }
    }
}

type SharedWriter = Arc<Mutex<Option<OwnedWriteHalf>>>;

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
    let stub = Arc::new(Stub {
        apps: args.apps.into_iter().collect(),
        failing: args.failing.into_iter().collect(),
        delay: Duration::from_millis(args.delay_ms),
    });

    // A previous run may have left the socket file behind.
    if args.socket.exists() {
        std::fs::remove_file(&args.socket)?;
    }
    let listener = UnixListener::bind(&args.socket)?;
    info!(path = %args.socket.display(), "listening");

    let writer: SharedWriter = Arc::new(Mutex::new(None));
    tokio::spawn(forward_stdin(writer.clone()));

    loop {
        let (stream, _) = listener.accept().await?;
        info!("client connected");
        serve_client(stream, &stub, &writer).await;
        info!("client disconnected");
    }
}

/// Handles one client until it hangs up.
async fn serve_client(stream: UnixStream, stub: &Stub, writer: &SharedWriter) {
    let (read_half, write_half) = stream.into_split();
    *writer.lock().await = Some(write_half);

    if let Err(e) = send_line(writer, "boot").await {
        warn!(error = %e, "failed to send boot");
    }

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                handle_command(text, stub, writer).await;
            }
            Err(e) => {
                warn!(error = %e, "read failed");
                break;
            }
        }
    }

    writer.lock().await.take();
}

async fn handle_command(text: &str, stub: &Stub, writer: &SharedWriter) {
    match text.strip_prefix("start_app:") {
        Some(app_id) => {
            let reply = stub.reply_for(app_id);
            info!(app_id, reply, "start request");
            if !stub.delay.is_zero() {
                tokio::time::sleep(stub.delay).await;
            }
            if let Err(e) = send_line(writer, reply).await {
                warn!(error = %e, "failed to send reply");
            }
        }
        None => warn!(command = %text, "unrecognized command, ignoring"),
    }
}

/// Forwards stdin lines to the connected client, for injecting events by hand.
async fn forward_stdin(writer: SharedWriter) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        match send_line(&writer, text).await {
            Ok(true) => info!(event = %text, "injected"),
            Ok(false) => warn!("no client connected, dropping input"),
            Err(e) => warn!(error = %e, "failed to inject event"),
        }
    }
}

/// Writes one protocol line; returns `Ok(false)` when no client is connected.
async fn send_line(writer: &SharedWriter, text: &str) -> std::io::Result<bool> {
    let mut guard = writer.lock().await;
    match guard.as_mut() {
        Some(w) => {
            w.write_all(text.as_bytes()).await?;
            w.write_all(b"\n").await?;
            w.flush().await?;
            Ok(true)
        }
        None => Ok(false),
    }
}
