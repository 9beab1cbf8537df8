//! Listener and connection lifecycle.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use kiln_cache::LruCache;
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::config::Config;
use crate::connection;
use crate::metrics::{CONNECTIONS_ACCEPTED, CONNECTIONS_ACTIVE};

/// The cache server: one TCP listener, one task per connection, one
/// shared cache engine.
pub struct Server {
    config: Config,
    cache: Arc<LruCache>,
    state: RwLock<ListenerState>,
    ready_tx: watch::Sender<bool>,
}

#[derive(Debug, Default)]
struct ListenerState {
    addr: Option<SocketAddr>,
    closed: bool,
}

impl Server {
    pub fn new(config: Config) -> Self {
        let cache = LruCache::builder()
            .max_bytes(config.max_bytes)
            .target_bytes(config.target_bytes)
            .entry_overhead(config.entry_overhead)
            .max_evict_per_op(config.max_evict_per_op)
            .incr_sliding_ttl_seconds(config.incr_sliding_ttl_seconds)
            .build();
        let (ready_tx, _) = watch::channel(false);

        Self {
            config,
            cache: Arc::new(cache),
            state: RwLock::new(ListenerState::default()),
            ready_tx,
        }
    }

    /// Channel that flips to `true` once the listener is bound.
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    /// Bound address, available once the server is ready.
    pub fn addr(&self) -> Option<SocketAddr> {
        self.state.read().addr
    }

    /// Accept connections until the shutdown channel fires or the
    /// listener fails.
    pub async fn serve(&self, mut shutdown: watch::Receiver<bool>) -> io::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        self.state.write().addr = Some(addr);
        self.ready_tx.send_replace(true);
        if self.config.verbose {
            info!("listening on {addr}");
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    self.state.write().closed = true;
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _peer)) => {
                        CONNECTIONS_ACCEPTED.increment();
                        CONNECTIONS_ACTIVE.increment();
                        let cache = self.cache.clone();
                        let verbose = self.config.verbose;
                        tokio::spawn(async move {
                            let result = connection::serve_connection(stream, cache).await;
                            if let Err(e) = result {
                                if verbose && !is_disconnect(&e) {
                                    info!("read error: {e}");
                                }
                            }
                            CONNECTIONS_ACTIVE.decrement();
                        });
                    }
                    Err(e) if is_temporary(&e) => {
                        if self.config.verbose {
                            info!("temporary accept error: {e}");
                        }
                    }
                    Err(e) => {
                        if self.state.read().closed {
                            return Ok(());
                        }
                        if self.config.verbose {
                            info!("accept error: {e}");
                        }
                        return Err(e);
                    }
                }
            }
        }
    }
}

/// Accept errors that only affect the connection being accepted, not
/// the listener itself.
fn is_temporary(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Peer-initiated disconnects are part of normal operation and not
/// worth logging.
fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
