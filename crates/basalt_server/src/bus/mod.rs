//! # Datagram Entity Bus
//!
//! Soft-real-time player state over UDP, bound next to the TCP port.
//! Best-effort by design: lost datagrams are not retransmitted, ordering
//! beyond the client's own sequence number is not promised, and a parse
//! failure just drops the packet.

mod state;
mod validator;

pub use state::{PlayerId, PlayerRegistry, PlayerState, SPEED_WINDOW};
pub use validator::{MovementUpdate, MovementValidator};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use basalt_core::Vec3;
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::metrics::Metrics;
use crate::net::PipelineContext;
use crate::protocol::{
    decode_datagram, encode_entity_update, encode_position_ack, Datagram, EntityUpdateBody,
    PlayerPositionBody, PositionAckBody,
};

/// Largest datagram the bus will read.
const MAX_DATAGRAM: usize = 2048;

/// Players silent longer than this are stale and get dropped lazily.
const STALE_AGE: Duration = Duration::from_secs(5);

/// Runs the entity bus until `shutdown` flips.
pub(crate) async fn run_entity_bus(
    ctx: Arc<PipelineContext>,
    socket: UdpSocket,
    mut shutdown: watch::Receiver<bool>,
) {
    let validator = MovementValidator::default();
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, addr) = match received {
                    Ok(pair) => pair,
                    Err(error) => {
                        tracing::debug!(%error, "datagram receive failed");
                        continue;
                    }
                };
                Metrics::bump(&ctx.metrics.datagrams_received);
                handle_datagram(&ctx, &validator, &socket, &buf[..len], addr).await;
            }
            _ = shutdown.changed() => {
                tracing::info!("entity bus stopping");
                return;
            }
        }
    }
}

async fn handle_datagram(
    ctx: &Arc<PipelineContext>,
    validator: &MovementValidator,
    socket: &UdpSocket,
    data: &[u8],
    addr: SocketAddr,
) {
    match decode_datagram(data) {
        Ok(Datagram::PlayerPosition(body)) => {
            handle_player_position(ctx, validator, socket, &body, addr).await;
        }
        Ok(Datagram::KeepAlive) => {
            let _ = socket.send_to(data, addr).await;
        }
        // Reserved input channel and outbound-only / reserved types.
        Ok(Datagram::PlayerInput | Datagram::EntityUpdate(_) | Datagram::PositionAck(_)
            | Datagram::BlockBreak(_)) => {}
        Err(error) => {
            tracing::debug!(%addr, %error, "dropping malformed datagram");
        }
    }
}

async fn handle_player_position(
    ctx: &Arc<PipelineContext>,
    validator: &MovementValidator,
    socket: &UdpSocket,
    body: &PlayerPositionBody,
    addr: SocketAddr,
) {
    let now = Instant::now();
    let update = MovementUpdate {
        position: Vec3::new({ body.x }, { body.y }, { body.z }),
        velocity: Vec3::new({ body.vx }, { body.vy }, { body.vz }),
        yaw: { body.yaw },
        pitch: { body.pitch },
        grounded: body.is_grounded(),
        seq: { body.seq },
    };

    // Validate and read back the server-accepted state in one registry
    // access; on reject the state still holds the last validated values.
    let (accepted, player_id, ack, entity) = ctx.players.with_state(addr, now, |state| {
        let accepted = validator.validate(state, &update, now);
        let ack = PositionAckBody {
            acked_seq: update.seq,
            x: state.position.x,
            y: state.position.y,
            z: state.position.z,
            vx: state.velocity.x,
            vy: state.velocity.y,
            vz: state.velocity.z,
            yaw: state.yaw,
            pitch: state.pitch,
        };
        let entity = EntityUpdateBody {
            player_id: state.id.0,
            x: state.position.x,
            y: state.position.y,
            z: state.position.z,
            vx: state.velocity.x,
            vy: state.velocity.y,
            vz: state.velocity.z,
            yaw: state.yaw,
            pitch: state.pitch,
            grounded: u8::from(state.grounded),
        };
        (accepted, state.id, ack, entity)
    });

    if accepted {
        Metrics::bump(&ctx.metrics.positions_accepted);
    } else {
        Metrics::bump(&ctx.metrics.positions_rejected);
        tracing::debug!(%addr, seq = update.seq, "position rejected, sending corrective ack");
    }

    // Ack the sender (corrective when rejected), then fan the accepted
    // state out to everyone else.
    let _ = socket.send_to(&encode_position_ack(&ack), addr).await;

    if accepted {
        let frame = encode_entity_update(&entity);
        for target in ctx.players.broadcast_targets(player_id, now, STALE_AGE) {
            let _ = socket.send_to(&frame, target).await;
        }
    }

    // The broadcast path doubles as the lazy stale-player GC.
    let dropped = ctx.players.gc_stale(now, STALE_AGE);
    if dropped > 0 {
        tracing::debug!(dropped, "stale players collected");
    }
}
