//! WebSocket gateway for live alert sessions
//!
//! Clients connect to `/ws/alerts?username=<name>` and receive every
//! triggered alert of that user as a JSON text frame.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{StatusCode, Uri};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::accept_hdr_async;
use tracing::{debug, error, info, instrument, warn};

use super::sessions::SessionRegistry;
use crate::common::errors::{RadarError, Result};

/// Path clients connect on
pub const ALERTS_PATH: &str = "/ws/alerts";

/// Extract the username from a `/ws/alerts?username=` request uri
pub fn username_from_uri(uri: &Uri) -> Option<String> {
    if uri.path() != ALERTS_PATH {
        return None;
    }
    url::form_urlencoded::parse(uri.query()?.as_bytes())
        .find(|(key, _)| key == "username")
        .map(|(_, value)| value.trim().to_string())
        .filter(|name| !name.is_empty())
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

/// Accepts WebSocket sessions and feeds them from the session registry
pub struct AlertGateway {
    sessions: Arc<SessionRegistry>,
}

impl AlertGateway {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }

    pub async fn bind(address: &str) -> Result<TcpListener> {
        TcpListener::bind(address)
            .await
            .map_err(|e| RadarError::Configuration(format!("cannot bind {}: {}", address, e)))
    }

    /// Accept connections until `shutdown` flips to true
    pub async fn serve(self: Arc<Self>, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        match listener.local_addr() {
            Ok(addr) => info!("Alert gateway listening on ws://{}{}", addr, ALERTS_PATH),
            Err(e) => warn!("Alert gateway listening on unknown address: {}", e),
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let gateway = self.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = gateway.handle_connection(stream, peer, shutdown).await {
                                debug!("Session from {} ended with error: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Alert gateway stopped");
    }

    #[instrument(skip(self, stream, shutdown))]
    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut username = None;
        let ws_stream = accept_hdr_async(stream, |request: &Request, response: Response| {
            match username_from_uri(request.uri()) {
                Some(name) => {
                    username = Some(name);
                    Ok(response)
                }
                None => Err(reject(
                    StatusCode::BAD_REQUEST,
                    "expected /ws/alerts?username=<name>",
                )),
            }
        })
        .await?;

        let username = username
            .ok_or_else(|| RadarError::Internal("handshake accepted without username".to_string()))?;
        let (session_id, mut events) = self.sessions.connect(&username).await;
        let (mut write, mut read) = ws_stream.split();

        let outcome: Result<()> = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(payload) => payload,
                            Err(e) => {
                                error!("Failed to encode alert {}: {}", event.alert_id, e);
                                continue;
                            }
                        };
                        if let Err(e) = write.send(Message::Text(payload)).await {
                            break Err(e.into());
                        }
                    }
                    None => break Ok(()),
                },
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Client closed session: {:?}", frame);
                        break Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e.into()),
                    None => break Ok(()),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        if let Err(e) = write.send(Message::Close(None)).await {
                            debug!("Close frame to {} not sent: {}", username, e);
                        }
                        break Ok(());
                    }
                }
            }
        };

        self.sessions.disconnect(&username, session_id).await;
        outcome
    }
}
