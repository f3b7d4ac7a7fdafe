//! # TCP Request Pipeline
//!
//! One task per client connection, each owning its socket's read half and
//! a per-connection write permit (a slow client stalls only itself).
//! CPU-heavy chunk/mesh builds run on the blocking pool through the mesh
//! cache's single-flight path, so the accept loop and the other
//! connections never wait on them.

mod connection;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use basalt_core::ServerConfig;
use basalt_procedural::{ChunkManager, WorldContext, WorldSeed};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::bus::{run_entity_bus, PlayerRegistry};
use crate::cache::MeshCache;
use crate::error::ServerError;
use crate::metrics::Metrics;
use crate::tick::run_tick_loop;

/// Cancels every server loop when triggered.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    /// Signals every loop to exit at its next suspension point.
    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

/// The set of active TCP streams, keyed by connection id.
///
/// Each stream's write half sits behind its own async mutex: that permit
/// serializes responses per connection (FIFO) and is all a broadcast needs
/// to interleave safely with responses.
#[derive(Default)]
pub struct StreamRegistry {
    streams: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<OwnedWriteHalf>>>>,
    next_id: AtomicU64,
}

impl StreamRegistry {
    /// Adds a stream, returning its id and shared write permit.
    pub fn register(&self, writer: OwnedWriteHalf) -> (u64, Arc<tokio::sync::Mutex<OwnedWriteHalf>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let writer = Arc::new(tokio::sync::Mutex::new(writer));
        self.streams.lock().insert(id, Arc::clone(&writer));
        (id, writer)
    }

    /// Removes a stream.
    pub fn unregister(&self, id: u64) {
        self.streams.lock().remove(&id);
    }

    /// Number of active streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.lock().len()
    }

    /// True when no client is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.lock().is_empty()
    }

    /// Writes `frame` to every active stream, dropping streams that fail.
    ///
    /// Returns how many streams were written.
    pub async fn broadcast(&self, frame: &[u8], io_timeout: Duration) -> usize {
        let targets: Vec<(u64, Arc<tokio::sync::Mutex<OwnedWriteHalf>>)> = self
            .streams
            .lock()
            .iter()
            .map(|(id, writer)| (*id, Arc::clone(writer)))
            .collect();

        let mut written = 0;
        let mut dead = Vec::new();
        for (id, writer) in targets {
            let mut writer = writer.lock().await;
            match tokio::time::timeout(io_timeout, writer.write_all(frame)).await {
                Ok(Ok(())) => written += 1,
                _ => dead.push(id),
            }
        }

        if !dead.is_empty() {
            let mut streams = self.streams.lock();
            for id in dead {
                streams.remove(&id);
            }
        }
        written
    }
}

/// Shared state every connection and the entity bus see.
pub(crate) struct PipelineContext {
    pub config: ServerConfig,
    pub world: Arc<WorldContext>,
    pub manager: Arc<ChunkManager>,
    pub cache: Arc<MeshCache>,
    pub metrics: Arc<Metrics>,
    pub streams: Arc<StreamRegistry>,
    pub players: Arc<PlayerRegistry>,
}

/// The voxel-terrain server: TCP chunk pipeline, UDP entity bus, tick
/// loop, and the caches they share.
pub struct TerrainServer {
    ctx: Arc<PipelineContext>,
    listener: TcpListener,
    udp: UdpSocket,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TerrainServer {
    /// Binds the TCP and UDP sockets and builds the world state.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(("0.0.0.0", config.tcp_port)).await?;
        let udp = UdpSocket::bind(("0.0.0.0", config.effective_udp_port())).await?;

        let world = Arc::new(WorldContext::new(WorldSeed::new(config.world_seed)));
        let manager = Arc::new(ChunkManager::new(Arc::clone(&world), config.max_cached_columns));
        let cache = Arc::new(MeshCache::new(config.max_cached_meshes));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = Arc::new(PipelineContext {
            world,
            manager,
            cache,
            metrics: Arc::new(Metrics::new()),
            streams: Arc::new(StreamRegistry::default()),
            players: Arc::new(PlayerRegistry::default()),
            config,
        });

        Ok(Self {
            ctx,
            listener,
            udp,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    /// The bound TCP address.
    pub fn tcp_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// The bound UDP address.
    pub fn udp_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.udp.local_addr()?)
    }

    /// Handle that cancels every loop.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown_tx))
    }

    /// Shared pipeline metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.ctx.metrics)
    }

    /// The mesh cache.
    #[must_use]
    pub fn cache(&self) -> Arc<MeshCache> {
        Arc::clone(&self.ctx.cache)
    }

    /// The world context.
    #[must_use]
    pub fn world(&self) -> Arc<WorldContext> {
        Arc::clone(&self.ctx.world)
    }

    /// Runs the accept loop, entity bus, and tick loop until shutdown.
    pub async fn run(self) -> Result<(), ServerError> {
        let Self {
            ctx,
            listener,
            udp,
            shutdown_tx: _shutdown_tx,
            mut shutdown_rx,
        } = self;

        let tcp_addr = listener.local_addr()?;
        let udp_addr = udp.local_addr()?;
        tracing::info!(tcp = %tcp_addr, udp = %udp_addr, seed = ctx.config.world_seed, "server up");

        let bus = tokio::spawn(run_entity_bus(Arc::clone(&ctx), udp, shutdown_rx.clone()));
        let ticker = tokio::spawn(run_tick_loop(
            Arc::clone(&ctx.cache),
            Arc::clone(&ctx.metrics),
            ctx.config.tick_rate,
            shutdown_rx.clone(),
        ));

        let mut connections: JoinSet<()> = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => {
                            connections.spawn(connection::serve_connection(
                                Arc::clone(&ctx),
                                socket,
                                peer,
                                shutdown_rx.clone(),
                            ));
                        }
                        Err(error) => {
                            tracing::info!(%error, "accept failed");
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown_rx.changed() => break,
            }
        }

        // Drain: connections exit at their next suspension point; abort
        // whatever is still blocked on a peer.
        connections.shutdown().await;
        let _ = bus.await;
        let _ = ticker.await;
        tracing::info!("server stopped");
        Ok(())
    }
}
