//! Duplex relay engine.
//!
//! The engine:
//! 1. Opens the destination listener (failure is returned, never retried)
//! 2. Starts the source health-check loop
//! 3. Accepts clients, spawning one pairing task per client
//! 4. Stops accepting when the shutdown token fires, then drains pairings

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use sockrelay_core::defaults::{DEFAULT_ACCEPT_BACKOFF_MAX_MS, DEFAULT_ACCEPT_BACKOFF_MIN_MS};
use sockrelay_metrics::{
    ERROR_ACCEPT, record_connection_accepted, record_connection_rejected, record_error,
};

use crate::endpoint::{DestinationEndpoint, RelayListener, SourceEndpoint};
use crate::error::RelayError;
use crate::health::run_health_check;
use crate::pairing::handle_pairing;
use crate::tracker::ConnectionTracker;

/// Immutable parameters of one relay, shared by every task it spawns.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bytes per copy chunk.
    pub buffer_size: usize,
    pub health_check_interval: Duration,
    /// Read and write deadline for relayed connections.
    pub io_timeout: Duration,
    /// How long `relay` waits for pairings after the accept loop stops.
    pub drain_timeout: Duration,
    /// Optional admission gate; `None` accepts without limit.
    pub max_connections: Option<usize>,
    /// Label for the dialed side in logs and errors.
    pub source_name: &'static str,
    /// Label for the listening side in logs and errors.
    pub destination_name: &'static str,
    pub source: SourceEndpoint,
    pub destination: DestinationEndpoint,
}

/// A configured relay, ready to run.
#[derive(Debug, Clone)]
pub struct DuplexRelay {
    config: Arc<RelayConfig>,
}

impl DuplexRelay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Open the destination listener without accepting yet.
    pub async fn bind(&self, shutdown: &CancellationToken) -> Result<BoundRelay, RelayError> {
        let cfg = &self.config;
        let listener =
            cfg.destination
                .listen(shutdown)
                .await
                .map_err(|source| RelayError::Listen {
                    name: cfg.destination_name,
                    addr: cfg.destination.to_string(),
                    source,
                })?;

        info!(
            listen = %listener.local_addr().unwrap_or_else(|_| cfg.destination.to_string()),
            destination = cfg.destination_name,
            source_name = cfg.source_name,
            source = %cfg.source,
            "relay listening"
        );

        Ok(BoundRelay {
            config: self.config.clone(),
            listener,
        })
    }

    /// Run the relay until `shutdown` fires.
    ///
    /// Only a failure to open the destination listener is returned; dial,
    /// accept and I/O failures are logged and handled per client. Removing a
    /// Unix destination socket afterwards is the caller's job.
    pub async fn relay(&self, shutdown: CancellationToken) -> Result<(), RelayError> {
        self.bind(&shutdown).await?.run(shutdown).await
    }
}

/// A relay whose destination listener is open.
#[derive(Debug)]
pub struct BoundRelay {
    config: Arc<RelayConfig>,
    listener: RelayListener,
}

impl BoundRelay {
    /// Bound TCP address, useful when listening on port 0.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.listener.tcp_addr()
    }

    /// Printable local address of the listener.
    pub fn local_addr(&self) -> String {
        self.listener
            .local_addr()
            .unwrap_or_else(|_| self.config.destination.to_string())
    }

    /// Accept clients until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), RelayError> {
        let BoundRelay { config, listener } = self;

        let health = tokio::spawn(
            run_health_check(config.clone(), shutdown.clone())
                .instrument(info_span!("health", source = %config.source)),
        );

        let conn_limit: Option<Arc<Semaphore>> = config.max_connections.map(|n| {
            info!("max_connections set to {}", n);
            Arc::new(Semaphore::new(n))
        });
        let tracker = ConnectionTracker::new();
        let mut backoff = AcceptBackoff::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("shutdown signal received, stopping accept loop");
                    break;
                }

                result = listener.accept() => {
                    let (client, peer) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            if shutdown.is_cancelled() {
                                break;
                            }
                            record_error(ERROR_ACCEPT);
                            let err = RelayError::Accept {
                                addr: config.destination.to_string(),
                                source: e,
                            };
                            let delay = backoff.next_delay();
                            warn!(
                                destination = config.destination_name,
                                error = %err,
                                retry_in_ms = delay.as_millis() as u64,
                                "failed to accept connection"
                            );
                            tokio::select! {
                                _ = shutdown.cancelled() => break,
                                _ = tokio::time::sleep(delay) => {}
                            }
                            continue;
                        }
                    };
                    backoff.reset();

                    let permit: Option<OwnedSemaphorePermit> = match &conn_limit {
                        Some(sem) => match sem.clone().try_acquire_owned() {
                            Ok(p) => Some(p),
                            Err(_) => {
                                debug!(peer = %peer, reason = "max_connections", "connection rejected");
                                record_connection_rejected("max_connections");
                                drop(client); // close immediately
                                continue;
                            }
                        },
                        None => None,
                    };

                    debug!(peer = %peer, "new connection");
                    record_connection_accepted();

                    let config = config.clone();
                    let shutdown = shutdown.clone();
                    let guard = tracker.track();

                    tokio::spawn(
                        async move {
                            let _guard = guard; // ensure decrement on drop
                            let _permit = permit; // hold permit until pairing ends
                            handle_pairing(client, config, shutdown).await;
                        }
                        .instrument(info_span!("pairing", peer = %peer)),
                    );
                }
            }
        }

        // Closes the listener.
        drop(listener);

        if let Err(e) = health.await {
            warn!(error = %e, "health check task failed");
        }

        let active = tracker.count();
        if active > 0 {
            info!("waiting for {} active pairings to drain", active);
            if tracker.wait_for_zero(config.drain_timeout).await {
                info!("all pairings drained");
            } else {
                warn!(
                    "drain timeout, {} pairings still active",
                    tracker.count()
                );
            }
        }

        info!(destination = %config.destination, "relay stopped");
        Ok(())
    }
}

/// Exponential delay between consecutive accept failures.
///
/// A persistent accept error (e.g. file-descriptor exhaustion) would
/// otherwise spin the loop.
#[derive(Debug)]
struct AcceptBackoff {
    current: Duration,
    max: Duration,
    min: Duration,
}

impl AcceptBackoff {
    fn new() -> Self {
        let min = Duration::from_millis(DEFAULT_ACCEPT_BACKOFF_MIN_MS);
        Self {
            current: min,
            min,
            max: Duration::from_millis(DEFAULT_ACCEPT_BACKOFF_MAX_MS),
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.min;
    }
}
