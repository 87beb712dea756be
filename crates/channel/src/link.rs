// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The link worker: owns the WebSocket, reconnects with backoff, and reports to the channel.

use futures_util::{SinkExt, StreamExt};
use tabula_common::ChannelConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, connect_async};
use tracing::{debug, info, warn};

/// What happened to the underlying connection.
#[derive(Debug)]
pub enum LinkEvent {
    /// A connection is open; frames sent on the enclosed sender are written to it in order.
    /// Dropping every clone of the sender asks the worker to close this connection.
    Up(UnboundedSender<String>),
    /// The connection is gone. `unsent` holds frames that were handed to the worker but never
    /// written, oldest first.
    Down { unsent: Vec<String> },
    /// One inbound text frame.
    Frame(String),
}

/// Connect, pump, and reconnect until the channel stops listening.
pub(crate) async fn run_link(
    url: String,
    config: ChannelConfig,
    events: UnboundedSender<LinkEvent>,
) {
    let mut backoff = config.reconnect_initial_backoff;
    loop {
        if events.is_closed() {
            debug!(%url, "Channel gone; link worker exiting");
            return;
        }
        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                info!(%url, "Connected to server");
                backoff = config.reconnect_initial_backoff;
                let (outbound_tx, outbound_rx) = unbounded_channel();
                if events.send(LinkEvent::Up(outbound_tx)).is_err() {
                    return;
                }
                let unsent = pump(stream, outbound_rx, &events).await;
                info!(%url, unsent = unsent.len(), "Disconnected from server");
                if events.send(LinkEvent::Down { unsent }).is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(%url, error = %e, ?backoff, "Unable to connect to server");
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(config.reconnect_max_backoff);
    }
}

/// Shuttle frames both ways until the connection fails or the channel releases it. Returns the
/// frames that were accepted for sending but not written.
async fn pump<S>(
    stream: WebSocketStream<S>,
    mut outbound: UnboundedReceiver<String>,
    events: &UnboundedSender<LinkEvent>,
) -> Vec<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut source) = stream.split();
    let mut unsent = vec![];
    loop {
        select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    debug!("Link released by channel; closing");
                    let _ = sink.close().await;
                    break;
                };
                if let Err(e) = sink.send(Message::Text(frame.clone().into())).await {
                    warn!(error = %e, "Write to server failed");
                    unsent.push(frame);
                    break;
                }
            }
            inbound = source.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if events.send(LinkEvent::Frame(text.as_str().to_owned())).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Server closed the connection");
                        break;
                    }
                    // Pings are answered by tungstenite itself; binary frames are not part of
                    // the protocol.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Read from server failed");
                        break;
                    }
                }
            }
        }
    }
    // Anything still buffered was never written. Closing first makes later sends bounce back to
    // the channel instead of vanishing.
    outbound.close();
    while let Ok(frame) = outbound.try_recv() {
        unsent.push(frame);
    }
    unsent
}
