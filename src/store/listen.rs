//! WebSocket live query
//!
//! The backend pushes one JSON text frame per change:
//! `{"type":"snapshot","messages":[...]}` carrying the full window, or
//! `{"type":"error","code":"...","message":"..."}` right before it closes.

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use url::Url;

use super::{SnapshotResult, StoreError, Subscription};
use crate::models::Message;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ListenFrame {
    Snapshot {
        #[serde(default)]
        messages: Vec<Message>,
    },
    Error {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: String,
    },
}

/// Just the `type` tag, read before committing to a frame shape.
#[derive(Debug, Deserialize)]
struct FrameTag {
    #[serde(rename = "type")]
    kind: String,
}

/// Decode one text frame. `None` means the frame carries nothing to deliver.
///
/// Unknown frame types are skipped. A `snapshot` or `error` frame that does
/// not decode is a `Decode` failure, which ends the live query.
fn decode_frame(text: &str, group_id: &str) -> Option<SnapshotResult> {
    let tag: FrameTag = match serde_json::from_str(text) {
        Ok(tag) => tag,
        Err(e) => {
            tracing::debug!("Ignoring untagged live frame: {} ({})", text, e);
            return None;
        }
    };
    if tag.kind != "snapshot" && tag.kind != "error" {
        tracing::debug!("Ignoring live frame of type {}", tag.kind);
        return None;
    }

    let frame: ListenFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            return Some(Err(StoreError::Decode(format!(
                "bad {} frame for {}: {}",
                tag.kind, group_id, e
            ))))
        }
    };
    Some(match frame {
        ListenFrame::Snapshot { messages } => Ok(messages),
        ListenFrame::Error { code, message } => Err(match code.as_deref() {
            Some("not-found") => StoreError::NotFound(group_id.to_string()),
            Some("permission-denied") | Some("unauthenticated") => {
                StoreError::PermissionDenied(message)
            }
            _ => StoreError::Unavailable(message),
        }),
    })
}

/// Connect and start forwarding snapshots.
///
/// Auth rides in the URL query, so no headers are needed on the upgrade.
pub(super) async fn open(url: Url, group_id: String) -> Result<Subscription, StoreError> {
    tracing::info!("Opening live query for {}", group_id);
    tracing::debug!("Connecting WebSocket to {}", url.path());

    let (stream, response) = connect_async(url.as_str())
        .await
        .map_err(|e| StoreError::Unavailable(format!("WebSocket connection failed: {}", e)))?;
    tracing::debug!("WebSocket connected (status={})", response.status());

    let (tx, rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let task = tokio::spawn(forward(stream, group_id, tx, cancel_rx));
    Ok(Subscription::new(rx, cancel_tx, task))
}

/// Pump frames into `tx` until cancelled, closed, or failed.
async fn forward(
    mut stream: WsStream,
    group_id: String,
    tx: mpsc::UnboundedSender<SnapshotResult>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    loop {
        let next = tokio::select! {
            _ = &mut cancel_rx => None,
            frame = stream.next() => Some(frame),
        };
        let Some(frame) = next else {
            if let Err(e) = stream.close(None).await {
                tracing::debug!("WebSocket close failed: {}", e);
            }
            tracing::info!("Live query for {} closed", group_id);
            return;
        };

        match frame {
            Some(Ok(WsMessage::Text(text))) => {
                tracing::debug!("WS recv: {}", text);
                if let Some(result) = decode_frame(&text, &group_id) {
                    let failed = result.is_err();
                    if tx.send(result).is_err() || failed {
                        return;
                    }
                }
            }
            Some(Ok(WsMessage::Ping(data))) => {
                if let Err(e) = stream.send(WsMessage::Pong(data)).await {
                    let _ = tx.send(Err(StoreError::Unavailable(format!(
                        "failed to send pong: {}",
                        e
                    ))));
                    return;
                }
            }
            Some(Ok(WsMessage::Close(frame))) => {
                tracing::info!("WebSocket closed by server: {:?}", frame);
                let _ = tx.send(Err(StoreError::Unavailable(
                    "live query closed by server".to_string(),
                )));
                return;
            }
            Some(Ok(other)) => {
                tracing::debug!("WS frame (ignored): {:?}", other);
            }
            Some(Err(e)) => {
                let _ = tx.send(Err(StoreError::Unavailable(format!(
                    "WebSocket receive error: {}",
                    e
                ))));
                return;
            }
            None => {
                let _ = tx.send(Err(StoreError::Unavailable(
                    "connection lost".to_string(),
                )));
                return;
            }
        }
    }
}
