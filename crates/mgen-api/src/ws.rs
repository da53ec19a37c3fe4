//! WebSocket job progress stream with backpressure support.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use mgen_models::{JobEvent, JobId};

use crate::error::ApiResult;
use crate::handlers::parse_job_id;
use crate::metrics;
use crate::state::AppState;

const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Error frame sent before closing.
#[derive(Serialize)]
struct WsError {
    #[serde(rename = "type")]
    kind: &'static str,
    detail: String,
}

impl WsError {
    fn new(detail: impl Into<String>) -> Self {
        Self {
            kind: "error",
            detail: detail.into(),
        }
    }
}

fn text_message<T: Serialize>(value: &T) -> Option<Message> {
    serde_json::to_string(value).ok().map(Message::Text)
}

/// Send a WebSocket message with backpressure handling.
async fn send_ws_message(tx: &mpsc::Sender<Message>, msg: Message) -> bool {
    match tx.try_send(msg) {
        Ok(_) => true,
        Err(mpsc::error::TrySendError::Full(msg)) => {
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(msg).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

async fn send_event(tx: &mpsc::Sender<Message>, event: &JobEvent) -> bool {
    match text_message(event) {
        Some(msg) => {
            let sent = send_ws_message(tx, msg).await;
            if sent {
                metrics::record_ws_message_sent();
            }
            sent
        }
        None => false,
    }
}

async fn send_error(tx: &mpsc::Sender<Message>, detail: impl Into<String>) {
    if let Some(msg) = text_message(&WsError::new(detail)) {
        let _ = send_ws_message(tx, msg).await;
    }
}

/// Job progress endpoint.
///
/// GET /ws/jobs/:job_id
pub async fn ws_job(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let job_id = parse_job_id(job_id)?;
    metrics::record_ws_connection(true);

    Ok(ws.on_upgrade(move |socket| async move {
        handle_job_socket(socket, state, job_id).await;
        metrics::record_ws_connection(false);
    }))
}

/// Stream the current snapshot, then live events until a terminal one.
async fn handle_job_socket(socket: WebSocket, state: AppState, job_id: JobId) {
    let (ws_sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    stream_job(&state, &job_id, &tx, &mut receiver).await;

    drop(tx);
    let _ = send_task.await;
    debug!(job_id = %job_id, "WebSocket closed");
}

async fn stream_job(
    state: &AppState,
    job_id: &JobId,
    tx: &mpsc::Sender<Message>,
    receiver: &mut futures::stream::SplitStream<WebSocket>,
) {
    // Subscribe before reading the snapshot so nothing falls in between
    let mut events = match state.store.subscribe(job_id).await {
        Ok(events) => events,
        Err(e) => {
            warn!(job_id = %job_id, "Failed to subscribe to job events: {}", e);
            send_error(tx, e.to_string()).await;
            return;
        }
    };

    let initial = match state.store.get(job_id).await {
        Ok(Some(snapshot)) => JobEvent::from_snapshot(&snapshot),
        Ok(None) => {
            send_error(tx, format!("job {} not found", job_id)).await;
            return;
        }
        Err(e) => {
            send_error(tx, e.to_string()).await;
            return;
        }
    };

    info!(job_id = %job_id, "WebSocket subscribed to job");

    if !send_event(tx, &initial).await || initial.is_terminal() {
        return;
    }

    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    if !send_event(tx, &event).await || event.is_terminal() {
                        break;
                    }
                }
                None => {
                    send_error(tx, "event stream ended").await;
                    break;
                }
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = heartbeat.tick() => {
                if !send_ws_message(tx, Message::Ping(Vec::new())).await {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_frame_shape() {
        let json = serde_json::to_value(WsError::new("job missing")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["detail"], "job missing");
    }

    #[tokio::test]
    async fn test_send_applies_backpressure_until_closed() {
        let (tx, mut rx) = mpsc::channel::<Message>(1);
        assert!(send_ws_message(&tx, Message::Text("a".into())).await);

        let sender = tx.clone();
        let pending = tokio::spawn(async move {
            send_ws_message(&sender, Message::Text("b".into())).await
        });
        assert!(matches!(rx.recv().await, Some(Message::Text(t)) if t == "a"));
        assert!(pending.await.unwrap());

        drop(rx);
        assert!(!send_ws_message(&tx, Message::Text("c".into())).await);
    }
}
