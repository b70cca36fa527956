use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use cairnd::{build_router, App, ServiceConfig};

/// The cairn transparency-log ingress and sequencing service.
#[derive(Debug, Parser)]
#[command(about, version)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value = "8089", env = "CAIRN_PORT")]
    port: u16,

    /// Number of sequencing-queue shards.
    #[arg(long, default_value = "4", env = "CAIRN_SHARDS")]
    shards: usize,

    /// Directory holding the per-shard queue stores, or `:memory:` for
    /// transient in-memory shards.
    #[arg(long, default_value = "cairn-data", env = "CAIRN_DATA_DIR")]
    data_dir: String,

    /// Object-store root: a filesystem directory, an `http(s)://` base URL
    /// for read-only access, or `:memory:` for a transient store.
    #[arg(long, default_value = "cairn-blobs", env = "CAIRN_BLOB_ROOT")]
    blob_root: String,

    /// Massif height of the logs this deployment serves.
    #[arg(long, default_value = "14", env = "CAIRN_MASSIF_HEIGHT")]
    massif_height: u8,

    /// Cap on registration request bodies, in bytes.
    #[arg(long, default_value = "4194304", env = "CAIRN_MAX_BODY_BYTES")]
    max_body_bytes: usize,

    /// Externally visible origin used when building Location URLs.
    #[arg(long, default_value = "", env = "CAIRN_ORIGIN")]
    origin: String,

    /// How long inbound leaves stay cached before the sweeper deletes them.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "24h", env = "CAIRN_LEAF_TTL")]
    leaf_ttl: std::time::Duration,

    /// How often the leaf sweeper runs.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5m", env = "CAIRN_LEAF_SWEEP_INTERVAL")]
    leaf_sweep_interval: std::time::Duration,

    /// The log verbosity. Can be one of trace|debug|info|warn|error|off.
    #[arg(long = "log.level", default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as jsonl rather than text.
    #[arg(long = "log.json", global = true)]
    log_json: bool,
}

fn init_tracing(cli: &Cli) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_blob_store(root: &str) -> anyhow::Result<Arc<dyn blob::BlobStore>> {
    if root == ":memory:" {
        return Ok(Arc::new(blob::MemStore::new()));
    }
    if root.starts_with("http://") || root.starts_with("https://") {
        let base = url::Url::parse(root).context("parsing the blob root URL")?;
        return Ok(Arc::new(blob::HttpReader::new(base)));
    }
    std::fs::create_dir_all(root)
        .with_context(|| format!("creating the blob root {root}"))?;
    Ok(Arc::new(blob::FileStore::new(root)))
}

fn open_queue(cli: &Cli) -> anyhow::Result<queue::Router> {
    if cli.data_dir != ":memory:" {
        std::fs::create_dir_all(&cli.data_dir)
            .with_context(|| format!("creating the data directory {}", cli.data_dir))?;
    }
    let data_dir = cli.data_dir.clone();
    let router = queue::Router::open(cli.shards, queue::QueueConfig::default(), |index| {
        if data_dir == ":memory:" {
            ":memory:".to_string()
        } else {
            format!("{data_dir}/queue-{index:03}.sqlite")
        }
    })
    .context("opening the sequencing queue shards")?;
    Ok(router)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let store = open_blob_store(&cli.blob_root)?;
    let queue = open_queue(&cli)?;
    let app = Arc::new(App::new(
        queue,
        store,
        cli.leaf_ttl,
        ServiceConfig {
            origin: cli.origin.clone(),
            massif_height: cli.massif_height,
            max_body_bytes: cli.max_body_bytes,
        },
    ));

    // Leaf sweeper: evict cached statements past the TTL. A failed sweep
    // is logged and retried on the next tick.
    let sweeper = app.clone();
    let sweep_interval = cli.leaf_sweep_interval;
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(sweep_interval);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            match sweeper.leaves.sweep(queue::now_ms()).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "swept expired leaves"),
                Err(err) => tracing::error!(error = %err, "leaf sweep failed"),
            }
        }
    });

    let address = std::net::SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("binding {address}"))?;
    tracing::info!(%address, shards = cli.shards, "cairnd listening");

    axum::serve(listener, build_router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        tokio::signal::ctrl_c()
            .await
            .expect("installing the interrupt handler");
    };
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing the SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}
