//! WebSocket transport over tokio-tungstenite.

use std::time::Duration;

use async_trait::async_trait;
use doclink_core::TransportError;
use doclink_settings::ChannelSettings;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use super::{Outbound, Transport, TransportEvent, TransportLink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens one WebSocket per link and pumps frames on a background task.
#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl WebSocketTransport {
    /// Transport with a custom handshake timeout.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Transport configured from settings.
    pub fn from_settings(settings: &ChannelSettings) -> Self {
        Self::new(Duration::from_millis(settings.connect_timeout_ms))
    }

    /// Handshake timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<TransportLink, TransportError> {
        let handshake = tokio::time::timeout(self.connect_timeout, connect_async(url)).await;
        let (ws, _response) = match handshake {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                return Err(TransportError::Open {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = self.connect_timeout.as_millis() as u64;
                return Err(TransportError::Timeout { timeout_ms });
            }
        };
        debug!(url, "websocket handshake complete");

        let (link, outbound_rx, inbound_tx) = TransportLink::pair();
        drop(tokio::spawn(pump(ws, outbound_rx, inbound_tx)));
        Ok(link)
    }
}

/// Forward frames both ways until either side goes away.
///
/// Ends when the peer closes, the socket errors, the channel sends
/// [`Outbound::Close`], or the channel drops its end of either queue.
async fn pump(
    ws: WsStream,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    inbound_tx: mpsc::Sender<TransportEvent>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            out = outbound_rx.recv() => {
                match out {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = ws_tx.send(Message::text(text)).await {
                            warn!(error = %e, "websocket write failed");
                            let _ = inbound_tx.send(TransportEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        let _ = ws_tx.close().await;
                        break;
                    }
                }
            }
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let event = TransportEvent::Message(text.as_str().to_owned());
                        if inbound_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "websocket closed by peer");
                        let _ = inbound_tx.send(TransportEvent::Closed).await;
                        break;
                    }
                    // Pings are answered by tungstenite; binary is not part of the protocol.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = inbound_tx.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                    None => {
                        let _ = inbound_tx.send(TransportEvent::Closed).await;
                        break;
                    }
                }
            }
        }
    }
}
