use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use parley_types::events::GatewayCommand;

use crate::rooms::RoomManager;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single WebSocket connection for its whole lifetime. The
/// connection is registered before any command is read and unconditionally
/// cleaned up when either half of the socket ends, so a client dropping
/// mid-join never leaves ghost room membership behind.
pub async fn handle_socket(socket: WebSocket, rooms: RoomManager) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    let mut outbound = rooms.registry().register(conn_id).await;
    info!("connection {} opened", conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events -> client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = outbound.recv() => {
                    let Some(event) = result else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("failed to encode gateway event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("heartbeat timeout (missed {} pongs), dropping connection {}", missed_heartbeats, conn_id);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client.
    let rooms_recv = rooms.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&rooms_recv, conn_id, cmd).await,
                    Err(e) => {
                        warn!(
                            "connection {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            truncate_preview(&text, 200)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Transport gone — same leave broadcast as an explicit leave.
    let effects = rooms.disconnect(conn_id).await;
    rooms.apply(conn_id, effects).await;
    info!("connection {} closed", conn_id);
}

/// At most `max` bytes of `text`, never splitting a character.
fn truncate_preview(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

async fn handle_command(rooms: &RoomManager, conn_id: Uuid, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Join { channel_id, user } => {
            match rooms.join(conn_id, channel_id, user).await {
                Ok(effects) => rooms.apply(conn_id, effects).await,
                Err(e) => {
                    // Store unavailable; the join request fails, the
                    // connection stays up in its prior state.
                    warn!("join check failed for connection {}: {:#}", conn_id, e);
                }
            }
        }
        GatewayCommand::Leave { channel_id } => {
            let effects = rooms.leave(conn_id, channel_id).await;
            rooms.apply(conn_id, effects).await;
        }
    }
}
