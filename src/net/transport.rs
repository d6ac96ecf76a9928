// Relay websocket client

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::constants::{HEARTBEAT_INTERVAL_SECS, RECONNECT_DELAY_SECS};
use crate::registry::Registry;

/// Send handle for the relay connection. Cloneable; sends never block the
/// caller.
#[derive(Clone)]
pub struct Transport {
    outbound_tx: mpsc::Sender<String>,
}

impl Transport {
    /// Wrap an existing channel. Lets tests observe the outbound side
    /// without a socket.
    pub fn new(outbound_tx: mpsc::Sender<String>) -> Self {
        Transport { outbound_tx }
    }

    /// Spawn the connection task and return the send handle. The task
    /// runs for the life of the process, reconnecting forever.
    pub fn start(url: String, registry: Arc<Registry>) -> Transport {
        let (outbound_tx, outbound_rx) = mpsc::channel(100);
        tokio::spawn(run_ws_client(url, outbound_rx, registry));
        Transport { outbound_tx }
    }

    /// Queue one line for the relay. Dropped with a warning when the
    /// outbound queue is full; the next tick's telegram supersedes it.
    pub fn send(&self, line: String) {
        if self.outbound_tx.try_send(line).is_err() {
            warn!("Outbound queue full, dropping telegram");
        }
    }
}

/// Append the auth token to the relay URL as a query parameter.
pub fn endpoint_with_token(url: &str, token: Option<&str>) -> String {
    match token {
        Some(token) if !token.is_empty() => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{}{}auth={}", url, sep, token)
        }
        _ => url.to_string(),
    }
}

/// Connection task. Connects, pumps messages both ways, and on any
/// failure waits a fixed delay and reconnects. One instance of this task
/// exists per process; failure paths fall out of the inner loop rather
/// than spawning anything.
async fn run_ws_client(
    url: String,
    mut outbound_rx: mpsc::Receiver<String>,
    registry: Arc<Registry>,
) {
    loop {
        match connect_async(&url).await {
            Ok((ws, _response)) => {
                info!("Connected to relay");
                let (mut ws_tx, mut ws_rx) = ws.split();

                let mut heartbeat =
                    tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
                heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        incoming = ws_rx.next() => {
                            match incoming {
                                Some(Ok(Message::Text(text))) => {
                                    for line in text.lines() {
                                        let line = line.trim();
                                        if !line.is_empty() {
                                            registry.route_line(line).await;
                                        }
                                    }
                                }
                                Some(Ok(Message::Close(_))) => {
                                    warn!("Relay closed the connection");
                                    break;
                                }
                                Some(Ok(_)) => {
                                    // Binary, ping and pong frames carry
                                    // no telegrams.
                                }
                                Some(Err(e)) => {
                                    error!("Websocket read error: {}", e);
                                    break;
                                }
                                None => {
                                    warn!("Websocket stream ended");
                                    break;
                                }
                            }
                        }
                        outgoing = outbound_rx.recv() => {
                            match outgoing {
                                Some(line) => {
                                    if let Err(e) = ws_tx.send(Message::Text(line)).await {
                                        error!("Websocket write error: {}", e);
                                        break;
                                    }
                                }
                                None => return,
                            }
                        }
                        _ = heartbeat.tick() => {
                            if let Err(e) = ws_tx.send(Message::Ping(Vec::new())).await {
                                error!("Websocket ping error: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Failed to connect to relay: {}", e);
            }
        }

        tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
    }
}
