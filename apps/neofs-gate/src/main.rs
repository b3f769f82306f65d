//! NeoFS S3 gateway.
//!
//! Serves the S3 protocol in front of the NeoFS storage network. Clients sign
//! requests with credentials packed from NeoFS bearer tokens; the gateway
//! verifies them and hands the token to the object layer.
//!
//! # Usage
//!
//! ```text
//! GATE_AUTH_KEY=/etc/neofs/gate.pem GATE_PEERS=s01.neofs.devenv:8080 neofs-gate
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATE_LISTEN_ADDRESS` | `0.0.0.0:8080` | Bind address |
//! | `GATE_NEOFS_KEY` | `generated` | Identity key: `generated`, WIF, hex or file |
//! | `GATE_AUTH_KEY` | *(unset)* | RSA private key (PEM) sealing bearer tokens |
//! | `GATE_PEERS` | *(empty)* | Storage nodes, `address[=weight]`, comma-separated |
//! | `GATE_CONNECT_TIMEOUT` | `30` | Seconds to wait for a storage node |
//! | `GATE_REQUEST_TIMEOUT` | `15` | Seconds allowed per request |
//! | `GATE_MAX_BODY_SIZE` | `67108864` | Largest request body in bytes |
//! | `GATE_REBALANCE_TIMER` | `15` | Seconds between pool rebalances |
//! | `GATE_AUTH_PERMISSIVE` | `false` | Forward requests that fail authentication |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use neofs_gate_auth::AuthCenter;
use neofs_gate_core::config::GENERATED_KEY;
use neofs_gate_core::{
    GateConfig, IdentityKey, PeerPool, Pool, generate_auth_key, load_auth_key,
    run_rebalance_worker,
};
use neofs_gate_http::{GateHandler, GateHttpConfig, GateHttpService, NotImplementedHandler};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

fn build_http_config(config: &GateConfig) -> GateHttpConfig {
    GateHttpConfig {
        auth_permissive: config.auth_permissive,
        request_timeout: config.request_timeout,
        max_body_size: config.max_body_size,
    }
}

fn build_auth_center(config: &GateConfig) -> Result<AuthCenter> {
    let identity = IdentityKey::load(&config.neofs_key).context("could not load NeoFS key")?;
    if config.neofs_key == GENERATED_KEY {
        warn!("using a generated NeoFS key, the gateway identity changes on every start");
    }

    let auth_key = if let Some(path) = &config.auth_key_path {
        load_auth_key(path).with_context(|| format!("could not load auth key from {path}"))?
    } else {
        warn!("GATE_AUTH_KEY is not set, issued credentials will not survive a restart");
        generate_auth_key().context("could not generate auth key")?
    };

    Ok(AuthCenter::new(identity, auth_key))
}

/// Rebalance once and wait for a usable storage node.
async fn connect_pool(pool: &dyn Pool, connect_timeout: Duration) -> Result<()> {
    let connected = tokio::time::timeout(connect_timeout, async {
        pool.rebalance().await;
        pool.connection().await
    })
    .await
    .context("timed out waiting for a storage node")?
    .context("failed to get a storage node connection")?;

    info!(address = %connected.address, "connected to storage network");
    Ok(())
}

/// Run the accept loop, serving connections until a shutdown signal is received.
///
/// `shutdown_tx` is notified once the accept loop stops.
async fn serve<H: GateHandler>(
    listener: TcpListener,
    service: GateHttpService<H>,
    shutdown_tx: watch::Sender<bool>,
) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

/// Probe `/-/healthy` of a running gateway.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /-/healthy HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.starts_with("HTTP/1.1 200") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let config = GateConfig::from_env()?;
        let addr = config.listen_address.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    let config = GateConfig::from_env().context("invalid configuration")?;

    init_tracing(&config.log_level)?;

    info!(
        listen_address = %config.listen_address,
        peers = config.peers.len(),
        connect_timeout = ?config.connect_timeout,
        request_timeout = ?config.request_timeout,
        rebalance_timer = ?config.rebalance_timer,
        version = VERSION,
        "starting NeoFS S3 gateway",
    );

    let center = Arc::new(build_auth_center(&config)?);
    info!(owner_id = %center.owner_id(), "loaded gateway identity");

    let pool = Arc::new(PeerPool::new(config.peers.clone(), config.connect_timeout));
    connect_pool(pool.as_ref(), config.connect_timeout).await?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(run_rebalance_worker(
        Arc::clone(&pool) as Arc<dyn Pool>,
        config.rebalance_timer,
        config.connect_timeout,
        async move {
            let _ = shutdown_rx.changed().await;
        },
    ));

    if config.auth_permissive {
        warn!("GATE_AUTH_PERMISSIVE is enabled, unauthenticated requests reach the object layer");
    }

    let handler = Arc::new(NotImplementedHandler::new(*center.owner_id()));
    let service = GateHttpService::new(handler, center, pool, build_http_config(&config));

    let addr: SocketAddr = config
        .listen_address
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.listen_address))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    serve(listener, service, shutdown_tx).await?;
    worker.await.context("rebalance worker panicked")?;
    Ok(())
}
