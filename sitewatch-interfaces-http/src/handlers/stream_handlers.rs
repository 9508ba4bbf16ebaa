// WebSocket entry point for alert observers. The socket is split on
// upgrade: the hub's event loop takes the write half, a read loop takes
// the other. Observers never send anything meaningful; the read loop
// exists to notice disconnects.

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

use sitewatch_application::AppState;
use sitewatch_domain::{ConnectionSink, ConnectionStream};

use crate::error::HttpError;
use crate::middleware::authorize;

struct WsSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl ConnectionSink for WsSink {
    async fn send(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        let text = String::from_utf8(payload.to_vec())
            .map_err(|err| anyhow!("non-utf8 payload: {}", err))?;
        self.sender.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.sender.send(Message::Close(None)).await;
    }
}

struct WsStream {
    receiver: SplitStream<WebSocket>,
}

#[async_trait]
impl ConnectionStream for WsStream {
    async fn receive(&mut self) -> anyhow::Result<Vec<u8>> {
        loop {
            match self.receiver.next().await {
                Some(Ok(Message::Close(_))) | None => bail!("connection closed"),
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Binary(data))) => return Ok(data),
                // Ping/pong are handled by axum; skip them.
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(err.into()),
            }
        }
    }
}

pub async fn monitoring_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    Ok(ws
        .on_upgrade(move |socket| attach_observer(socket, state))
        .into_response())
}

async fn attach_observer(socket: WebSocket, state: AppState) {
    let (sender, receiver) = socket.split();
    state
        .monitoring
        .accept_connection(Box::new(WsSink { sender }), Box::new(WsStream { receiver }))
        .await;
    debug!(
        connections = state.monitoring.connection_count(),
        "observer attached"
    );
}
