//! Connections to the storage network.
//!
//! The [`Pool`] trait is what the rest of the gateway sees: it can be asked to
//! re-check its nodes ([`Pool::rebalance`]), to hand out a live node
//! ([`Pool::connection`]) and to shut down ([`Pool::close`]). [`PeerPool`] is
//! the implementation used by the gateway binary; it treats a node as healthy
//! when a TCP connection to it can be opened within the connect timeout.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::PeerConfig;
use crate::error::{GateError, GateResult};

/// A handle to a storage node selected by the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    /// Network address of the node.
    pub address: String,
    /// Configured weight of the node.
    pub weight: f64,
}

/// Pool of connections to storage nodes.
#[async_trait::async_trait]
pub trait Pool: Send + Sync + std::fmt::Debug {
    /// Probe all nodes and refresh the set of healthy ones.
    async fn rebalance(&self);

    /// Return a healthy node.
    async fn connection(&self) -> GateResult<Connection>;

    /// Stop handing out connections.
    fn close(&self);
}

#[derive(Debug)]
struct PeerState {
    config: PeerConfig,
    healthy: bool,
}

/// Weighted pool over a static list of peers.
#[derive(Debug)]
pub struct PeerPool {
    peers: RwLock<Vec<PeerState>>,
    connect_timeout: Duration,
    closed: AtomicBool,
}

impl PeerPool {
    /// Create a pool over `peers`. All peers start unhealthy until the first rebalance.
    #[must_use]
    pub fn new(peers: Vec<PeerConfig>, connect_timeout: Duration) -> Self {
        let peers = peers
            .into_iter()
            .map(|config| PeerState {
                config,
                healthy: false,
            })
            .collect();
        Self {
            peers: RwLock::new(peers),
            connect_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Number of peers that passed the last probe.
    #[must_use]
    pub fn healthy_count(&self) -> usize {
        self.peers.read().iter().filter(|p| p.healthy).count()
    }

    async fn probe(address: &str, connect_timeout: Duration) -> bool {
        match tokio::time::timeout(connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(address, error = %e, "storage node unreachable");
                false
            }
            Err(_) => {
                debug!(address, "storage node probe timed out");
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl Pool for PeerPool {
    async fn rebalance(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let addresses: Vec<String> = self
            .peers
            .read()
            .iter()
            .map(|p| p.config.address.clone())
            .collect();

        let probes = addresses
            .iter()
            .map(|address| Self::probe(address, self.connect_timeout));
        let results = join_all(probes).await;

        let mut peers = self.peers.write();
        for (peer, healthy) in peers.iter_mut().zip(results) {
            if peer.healthy != healthy {
                info!(address = %peer.config.address, healthy, "storage node state changed");
            }
            peer.healthy = healthy;
        }
    }

    async fn connection(&self) -> GateResult<Connection> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GateError::PoolClosed);
        }

        let peers = self.peers.read();
        peers
            .iter()
            .filter(|p| p.healthy)
            // Ties keep the first configured peer.
            .fold(None::<&PeerState>, |best, peer| match best {
                Some(b) if b.config.weight >= peer.config.weight => Some(b),
                _ => Some(peer),
            })
            .map(|p| Connection {
                address: p.config.address.clone(),
                weight: p.config.weight,
            })
            .ok_or(GateError::NoHealthyPeers)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for peer in self.peers.write().iter_mut() {
            peer.healthy = false;
        }
    }
}

/// Rebalance `pool` every `interval` until `shutdown` resolves, then close it.
///
/// Each rebalance is bounded by `connect_timeout`.
pub async fn run_rebalance_worker(
    pool: Arc<dyn Pool>,
    interval: Duration,
    connect_timeout: Duration,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    let mut tick = tokio::time::interval(interval);
    // The first tick completes immediately; startup already rebalanced.
    tick.tick().await;

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = tick.tick() => {
                if tokio::time::timeout(connect_timeout, pool.rebalance()).await.is_err() {
                    warn!("pool rebalance timed out");
                }
            }
        }
    }

    pool.close();
    info!("stopping worker");
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    async fn live_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        (listener, address)
    }

    async fn dead_address() -> String {
        let (listener, address) = live_listener().await;
        drop(listener);
        address
    }

    fn peer(address: &str, weight: f64) -> PeerConfig {
        PeerConfig {
            address: address.to_owned(),
            weight,
        }
    }

    #[tokio::test]
    async fn test_should_have_no_connection_before_rebalance() {
        let (_listener, address) = live_listener().await;
        let pool = PeerPool::new(vec![peer(&address, 1.0)], Duration::from_secs(1));

        assert!(matches!(
            pool.connection().await,
            Err(GateError::NoHealthyPeers)
        ));
    }

    #[tokio::test]
    async fn test_should_pick_heaviest_healthy_peer() {
        let (_a, live_light) = live_listener().await;
        let (_b, live_heavy) = live_listener().await;
        let dead = dead_address().await;

        let pool = PeerPool::new(
            vec![
                peer(&live_light, 1.0),
                peer(&dead, 10.0),
                peer(&live_heavy, 2.0),
            ],
            Duration::from_secs(1),
        );
        pool.rebalance().await;

        assert_eq!(pool.healthy_count(), 2);
        let conn = pool.connection().await.unwrap();
        assert_eq!(conn.address, live_heavy);
    }

    #[tokio::test]
    async fn test_should_refuse_connections_after_close() {
        let (_listener, address) = live_listener().await;
        let pool = PeerPool::new(vec![peer(&address, 1.0)], Duration::from_secs(1));
        pool.rebalance().await;
        assert!(pool.connection().await.is_ok());

        pool.close();
        assert!(matches!(pool.connection().await, Err(GateError::PoolClosed)));

        pool.rebalance().await;
        assert_eq!(pool.healthy_count(), 0);
    }

    #[tokio::test]
    async fn test_should_close_pool_when_worker_stops() {
        let (_listener, address) = live_listener().await;
        let pool = Arc::new(PeerPool::new(vec![peer(&address, 1.0)], Duration::from_secs(1)));
        pool.rebalance().await;

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let worker = tokio::spawn(run_rebalance_worker(
            Arc::clone(&pool) as Arc<dyn Pool>,
            Duration::from_millis(10),
            Duration::from_secs(1),
            async move {
                let _ = rx.await;
            },
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        worker.await.unwrap();

        assert!(matches!(pool.connection().await, Err(GateError::PoolClosed)));
    }
}
