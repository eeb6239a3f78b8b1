//! Per-connection task
//!
//! Upgrades the TCP stream to a WebSocket on the configured path, then runs
//! a single loop over three event sources: inbound messages, the outbound
//! queue and the terminate signal. However the loop ends, the connection is
//! released through [`ConnectionRegistry::on_disconnect`].

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::{Error, Result};
use crate::registry::ConnectionRegistry;
use crate::server::config::RelayConfig;
use crate::session::{ConnectionHandle, ConnectionId, Outbound};

/// An accepted TCP connection, not yet upgraded
pub struct Connection {
    id: ConnectionId,
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: RelayConfig,
    registry: Arc<ConnectionRegistry>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: RelayConfig,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            id,
            socket,
            peer_addr,
            config,
            registry,
        }
    }

    /// Upgrade and serve the connection until it closes
    pub async fn run(self) -> Result<()> {
        let path = self.config.ws_path.clone();
        let peer = self.peer_addr;
        let callback = move |req: &Request, response: Response| {
            if req.uri().path() == path {
                Ok(response)
            } else {
                tracing::debug!(peer = %peer, path = %req.uri().path(), "Rejecting upgrade on unknown path");
                let mut error = ErrorResponse::new(Some("not found".to_string()));
                *error.status_mut() = StatusCode::NOT_FOUND;
                Err(error)
            }
        };

        let upgrade = tokio_tungstenite::accept_hdr_async(self.socket, callback);
        let ws = tokio::time::timeout(self.config.handshake_timeout, upgrade)
            .await
            .map_err(|_| Error::HandshakeTimeout)??;

        let (handle, outbound) =
            ConnectionHandle::new(self.id, self.peer_addr, self.config.high_water_mark);
        self.registry.attach(&handle).await;
        tracing::debug!(conn = self.id, peer = %self.peer_addr, "WebSocket connection open");

        let result = pump(ws, &handle, outbound, &self.registry).await;
        self.registry.on_disconnect(&handle).await;
        result
    }
}

async fn pump(
    mut ws: WebSocketStream<TcpStream>,
    handle: &ConnectionHandle,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    registry: &ConnectionRegistry,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = handle.terminated() => {
                tracing::debug!(conn = handle.id(), "Connection terminated");
                return Ok(());
            }

            msg = outbound.recv() => {
                let Some(msg) = msg else {
                    return Ok(());
                };
                let len = msg.queued_len();
                let message = match msg {
                    Outbound::Binary(data) => Message::Binary(data.to_vec()),
                    Outbound::Text(text) => Message::Text(text),
                    Outbound::Ping => Message::Ping(Vec::new()),
                    Outbound::Close => {
                        // A peer that stopped reading must not stall the close
                        tokio::select! {
                            _ = ws.close(None) => {}
                            _ = handle.terminated() => {}
                        }
                        return Ok(());
                    }
                };

                // A write blocked on a full socket buffer still yields to
                // termination, so a vanished peer is dropped immediately
                tokio::select! {
                    result = ws.send(message) => result?,
                    _ = handle.terminated() => {
                        tracing::debug!(conn = handle.id(), "Connection terminated during write");
                        return Ok(());
                    }
                }
                handle.mark_flushed(len);
            }

            incoming = ws.next() => {
                match incoming {
                    Some(Ok(Message::Binary(data))) => {
                        registry.handle_binary(handle, Bytes::from(data)).await;
                    }
                    Some(Ok(Message::Text(text))) => {
                        registry.handle_control(handle, &text).await;
                    }
                    Some(Ok(Message::Pong(_))) => handle.acknowledge_probe(),
                    // Pings are answered by tungstenite
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(e.into()),
                }
            }
        }
    }
}
