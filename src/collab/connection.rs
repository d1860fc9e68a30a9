// collab/connection.rs - Drives one WebSocket between a client and its session

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::client::{ClientFrame, ClientHandle};
use super::hub::SessionHub;
use super::messages::{ParticipantRole, User};

/// Join the diagram session and pump frames until either side goes away.
pub async fn serve(socket: WebSocket, hub: SessionHub, threat_model_id: Uuid, diagram_id: Uuid, user: User, role: ParticipantRole) {
    let settings = hub.settings().clone();
    let (client, outbound) = ClientHandle::channel(user, role, settings.client_buffer);
    let connection_id = client.connection_id;
    let user_id = client.user_id().to_string();

    let (mut ws_write, mut ws_read) = socket.split();

    let session = match hub.join(threat_model_id, diagram_id, client).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(user_id = %user_id, "Collaboration join for diagram {} refused: {}", diagram_id, e);
            let _ = ws_write
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: Cow::Owned(e.to_string()),
                })))
                .await;
            return;
        }
    };

    let mut writer = tokio::spawn(write_loop(ws_write, outbound, settings.ping_interval));

    loop {
        tokio::select! {
            next = tokio::time::timeout(settings.read_timeout, ws_read.next()) => {
                let message = match next {
                    Err(_) => {
                        tracing::info!(user_id = %user_id, "Closing collaboration connection after read timeout");
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        tracing::debug!(user_id = %user_id, "Collaboration socket error: {}", e);
                        break;
                    }
                    Ok(Some(Ok(message))) => message,
                };

                match message {
                    Message::Text(text) => {
                        if text.len() > settings.max_message_size {
                            tracing::warn!(user_id = %user_id, "Dropping oversized message of {} bytes", text.len());
                            break;
                        }
                        if session.submit(connection_id, text).await.is_err() {
                            break;
                        }
                    }
                    Message::Binary(_) => {
                        tracing::debug!(user_id = %user_id, "Ignoring binary collaboration frame");
                    }
                    Message::Close(_) => break,
                    // Pongs only refresh the read timeout
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            _ = &mut writer => break,
        }
    }

    session.leave(connection_id).await;
    writer.abort();
    tracing::debug!(user_id = %user_id, "Collaboration connection {} closed", connection_id);
}

async fn write_loop(
    mut ws_write: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ClientFrame>,
    ping_interval: std::time::Duration,
) {
    let mut ping = tokio::time::interval(ping_interval);
    ping.tick().await;

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(ClientFrame::Text(text)) => {
                        if ws_write.send(Message::Text(text.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Some(ClientFrame::Close { reason }) => {
                        let _ = ws_write
                            .send(Message::Close(Some(CloseFrame {
                                code: close_code::NORMAL,
                                reason: Cow::Owned(reason),
                            })))
                            .await;
                        break;
                    }
                    None => break,
                }
            }
            _ = ping.tick() => {
                if ws_write.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}
