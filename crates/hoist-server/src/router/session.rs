//! Device session lifecycle: one authenticated socket from upgrade through
//! teardown.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use hoist_core::InboundEnvelope;
use metrics::counter;
use tracing::{debug, info, instrument, warn};

use super::handler::route_frame;
use crate::gateway::Gateway;
use crate::metrics::DEVICE_CONNECTIONS_TOTAL;

/// How long teardown waits for the writer to flush its close frame.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Run the session for an authenticated device.
///
/// 1. Registers the connection (superseding any older one for the device)
/// 2. Forwards queued outbound frames to the socket from a writer task
/// 3. Reads frames strictly in order, touching liveness on every one
/// 4. Tears down on peer close, read error, malformed frame, or when the
///    gateway closes the connection
#[instrument(skip_all, fields(device_id = %device_id))]
pub async fn run_device_session(ws: WebSocket, device_id: String, gateway: Arc<Gateway>) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (connection, mut outbound) = gateway.open_connection(&device_id);
    counter!(DEVICE_CONNECTIONS_TOTAL).increment(1);
    info!(conn_id = %connection.conn_id(), "device connected");

    let _ = gateway.registry().register(connection.clone()).await;

    let writer_conn = connection.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = writer_conn.closed() => break,
                next = outbound.recv() => {
                    let Some(text) = next else { break };
                    if ws_tx.send(Message::Text(String::clone(&text).into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    let reason = loop {
        let next = tokio::select! {
            biased;
            () = connection.closed() => break "closed by gateway",
            next = ws_rx.next() => next,
        };
        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "socket read failed");
                break "read error";
            }
            None => break "peer closed",
        };

        connection.touch();
        let parsed = match msg {
            Message::Text(text) => InboundEnvelope::parse(text.as_str()),
            Message::Binary(bytes) => InboundEnvelope::parse_bytes(&bytes),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => break "peer closed",
        };
        match parsed {
            Ok(envelope) => route_frame(&gateway, &connection, envelope.into_frame()),
            Err(e) => {
                warn!(error = %e, "malformed frame, closing connection");
                break "malformed frame";
            }
        }
    };

    let removed = gateway
        .registry()
        .unregister_connection(&device_id, connection.conn_id())
        .await;
    let _ = connection.close();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }
    info!(reason, removed, "device disconnected");
}
