use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use pinwall_db::Database;
use pinwall_types::events::{PanelCommand, PanelEvent};

use crate::hub::PanelHub;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a pre-authenticated WebSocket connection.
/// The JWT was already validated at the HTTP upgrade layer, so we go straight
/// to Ready and the event loop.
pub async fn handle_connection(
    socket: WebSocket,
    hub: PanelHub,
    db: Arc<Database>,
    user_id: Uuid,
    username: String,
) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = Uuid::new_v4();

    info!("{} ({}) connected to gateway", username, user_id);

    // Send Ready event
    let ready = PanelEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    // One outbound channel per connection; WatchPanel re-registers the sender
    // under whichever panel the client is looking at.
    let (tx, mut rx) = mpsc::unbounded_channel::<PanelEvent>();

    // Panel this connection currently watches (shared with the recv task for cleanup)
    let watching: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Spawn task to forward panel events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = serde_json::to_string(&event).unwrap();
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
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
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

    // Read commands from client
    let hub_recv = hub.clone();
    let db_recv = db.clone();
    let username_recv = username.clone();
    let watching_recv = watching.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<PanelCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(
                            &hub_recv,
                            &db_recv,
                            conn_id,
                            user_id,
                            &username_recv,
                            &tx,
                            &watching_recv,
                            cmd,
                        )
                        .await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            preview(&text)
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

    let watched = watching.lock().expect("watch lock poisoned").take();
    if let Some(code) = watched {
        hub.leave(&code, conn_id).await;
    }
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn handle_command(
    hub: &PanelHub,
    db: &Arc<Database>,
    conn_id: Uuid,
    user_id: Uuid,
    username: &str,
    tx: &mpsc::UnboundedSender<PanelEvent>,
    watching: &Arc<Mutex<Option<String>>>,
    cmd: PanelCommand,
) {
    match cmd {
        PanelCommand::WatchPanel { code } => {
            let code = code.trim().to_ascii_uppercase();

            // Only participants may watch a panel's event stream
            let db = db.clone();
            let check_code = code.clone();
            let uid = user_id.to_string();
            let member = tokio::task::spawn_blocking(move || {
                db.with_conn(|conn| pinwall_db::membership::is_participant(conn, &check_code, &uid))
            })
            .await;

            match member {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    warn!(
                        "{} ({}) tried to watch panel {} without membership",
                        username, user_id, code
                    );
                    return;
                }
                Ok(Err(e)) => {
                    warn!("Membership check failed for panel {}: {}", code, e);
                    return;
                }
                Err(e) => {
                    error!("spawn_blocking join error: {}", e);
                    return;
                }
            }

            let previous = watching
                .lock()
                .expect("watch lock poisoned")
                .replace(code.clone());
            if let Some(old) = previous {
                hub.leave(&old, conn_id).await;
            }
            hub.join(&code, conn_id, tx.clone()).await;
            info!("{} ({}) watching panel {}", username, user_id, code);
        }

        PanelCommand::UnwatchPanel => {
            let previous = watching.lock().expect("watch lock poisoned").take();
            if let Some(old) = previous {
                hub.leave(&old, conn_id).await;
                info!("{} ({}) stopped watching panel {}", username, user_id, old);
            }
        }
    }
}

/// First 200 bytes of a frame for the log, cut back to a char boundary so a
/// multibyte glyph straddling the limit cannot panic the slice.
fn preview(text: &str) -> &str {
    let mut end = text.len().min(200);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_cuts_on_char_boundary() {
        let mut frame = "x".repeat(199);
        frame.push('é');
        // The glyph's two bytes straddle the limit; the cut must back up.
        assert_eq!(frame.len(), 201);
        assert_eq!(preview(&frame), "x".repeat(199));

        assert_eq!(preview("tiny"), "tiny");
        assert_eq!(preview(&"y".repeat(300)).len(), 200);
    }
}
