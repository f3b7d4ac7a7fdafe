//! # Connection Handling
//!
//! One request at a time per connection, responses strictly FIFO. A short
//! read or EOF drops the connection silently; a malformed frame closes it
//! with a log line; nothing in here can take another connection down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use basalt_mesh::{extract, ChunkField};
use basalt_procedural::{ChunkCoord, BLOCK_BREAK_RADIUS, BLOCK_BREAK_STRENGTH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;

use super::PipelineContext;
use crate::error::ServerError;
use crate::metrics::Metrics;
use crate::protocol::{encode_block_break, encode_chunk_response, TcpPacketType, WireError};

type SharedWriter = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

/// Serves one client until EOF, error, or shutdown.
pub(crate) async fn serve_connection(
    ctx: Arc<PipelineContext>,
    socket: TcpStream,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    let _ = socket.set_nodelay(true);
    let (mut reader, writer) = socket.into_split();
    let (id, writer) = ctx.streams.register(writer);
    tracing::info!(%peer, id, "client connected");

    let result = connection_loop(&ctx, &mut reader, &writer, &mut shutdown).await;
    ctx.streams.unregister(id);

    match result {
        Ok(()) => tracing::info!(%peer, id, "client disconnected"),
        Err(error) => tracing::info!(%peer, id, %error, "connection closed"),
    }
}

async fn connection_loop(
    ctx: &Arc<PipelineContext>,
    reader: &mut OwnedReadHalf,
    writer: &SharedWriter,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let mut type_buf = [0u8; 1];
    loop {
        // Idle between requests: wait for the next frame or shutdown.
        tokio::select! {
            read = reader.read_exact(&mut type_buf) => {
                match read {
                    Ok(_) => {}
                    // Clean or mid-frame EOF: drop silently.
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                    Err(e) => return Err(e.into()),
                }
            }
            _ = shutdown.changed() => return Ok(()),
        }

        match TcpPacketType::from_u8(type_buf[0]) {
            Some(TcpPacketType::ChunkRequest) => {
                handle_chunk_request(ctx, reader, writer).await?;
            }
            Some(TcpPacketType::BlockBreak) => {
                handle_block_break(ctx, reader).await?;
            }
            None => return Err(WireError::UnknownPacket(type_buf[0]).into()),
        }
    }
}

/// Reads the 12-byte coordinate triple every request body carries.
async fn read_coord_body(
    reader: &mut OwnedReadHalf,
    io_timeout: Duration,
) -> Result<(i32, i32, i32), ServerError> {
    let mut body = [0u8; 12];
    tokio::time::timeout(io_timeout, reader.read_exact(&mut body)).await??;
    Ok((
        i32::from_le_bytes(body[0..4].try_into().expect("4-byte slice")),
        i32::from_le_bytes(body[4..8].try_into().expect("4-byte slice")),
        i32::from_le_bytes(body[8..12].try_into().expect("4-byte slice")),
    ))
}

async fn handle_chunk_request(
    ctx: &Arc<PipelineContext>,
    reader: &mut OwnedReadHalf,
    writer: &SharedWriter,
) -> Result<(), ServerError> {
    let io_timeout = Duration::from_secs(ctx.config.io_timeout_secs);
    let (cx, cy, cz) = read_coord_body(reader, io_timeout).await?;
    let coord = ChunkCoord::new(cx, cy, cz);

    let manager = Arc::clone(&ctx.manager);
    let metrics = Arc::clone(&ctx.metrics);
    let (render, collision) = ctx
        .cache
        .get_or_build(coord, move || {
            let chunk_start = Instant::now();
            let sampler = manager.sampler(coord);
            let voxels = sampler.assemble(coord);
            metrics.chunk_time.record_duration(chunk_start.elapsed());
            Metrics::bump(&metrics.chunks_generated);

            let mesh_start = Instant::now();
            let field = ChunkField::new(&sampler, &voxels);
            let meshes = extract(&field, coord);
            metrics.mesh_time.record_duration(mesh_start.elapsed());
            Metrics::bump(&metrics.meshes_built);
            meshes
        })
        .await?;

    let frame = encode_chunk_response(&render, &collision)?;

    let send_start = Instant::now();
    {
        let mut writer = writer.lock().await;
        tokio::time::timeout(io_timeout, writer.write_all(&frame)).await??;
    }
    ctx.metrics.send_time.record_duration(send_start.elapsed());
    Metrics::bump(&ctx.metrics.requests_served);

    tracing::debug!(
        cx, cy, cz,
        vertices = render.vertex_count(),
        bytes = frame.len(),
        "chunk served"
    );
    Ok(())
}

async fn handle_block_break(
    ctx: &Arc<PipelineContext>,
    reader: &mut OwnedReadHalf,
) -> Result<(), ServerError> {
    let io_timeout = Duration::from_secs(ctx.config.io_timeout_secs);
    let (x, y, z) = read_coord_body(reader, io_timeout).await?;

    ctx.world.apply_edit((x, y, z), BLOCK_BREAK_RADIUS, BLOCK_BREAK_STRENGTH);
    let invalidated = ctx.cache.invalidate_sphere((x, y, z), BLOCK_BREAK_RADIUS);
    Metrics::bump(&ctx.metrics.edits_applied);

    // Every active stream hears about the edit, the initiator included;
    // that broadcast is the request's acknowledgement.
    let frame = encode_block_break(x, y, z);
    let sent = ctx.streams.broadcast(&frame, io_timeout).await;
    ctx.metrics
        .broadcasts_sent
        .fetch_add(sent as u64, std::sync::atomic::Ordering::Relaxed);

    tracing::debug!(x, y, z, invalidated = invalidated.len(), streams = sent, "block break");
    Ok(())
}
