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

//! The link worker against a real WebSocket server on loopback.

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tabula_channel::{LinkEvent, MessageChannel};
use tabula_common::{
    ChannelConfig, ClientEnvelope, ClientMessage, Envelope, EventBus, ServerMessage, SyncEvent,
};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

fn fast_reconnect() -> ChannelConfig {
    ChannelConfig {
        reconnect_initial_backoff: Duration::from_millis(10),
        reconnect_max_backoff: Duration::from_millis(50),
        ..Default::default()
    }
}

async fn next_event(channel: &mut MessageChannel) -> LinkEvent {
    tokio::time::timeout(Duration::from_secs(5), channel.next_link_event())
        .await
        .expect("link event")
        .expect("channel alive")
}

#[tokio::test]
async fn test_link_round_trip_and_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let events = EventBus::new();
    let mut observed = events.subscribe();
    let mut channel = MessageChannel::new(fast_reconnect(), events);

    // Sent before any connection exists.
    channel
        .send(Envelope::new(ClientMessage::Ping { nonce: 7 }))
        .unwrap();
    channel.connect(&format!("ws://{addr}"));

    let (tcp, _) = listener.accept().await.unwrap();
    let mut server = accept_async(tcp).await.unwrap();
    let up = next_event(&mut channel).await;
    assert!(matches!(up, LinkEvent::Up(_)));
    channel.handle_link_event(up);
    assert!(channel.is_connected());
    assert_eq!(channel.queued_len(), 0);
    assert_eq!(observed.recv().await.unwrap(), SyncEvent::Connected);

    let frame = server.next().await.unwrap().unwrap();
    let envelope = ClientEnvelope::from_frame(frame.to_text().unwrap()).unwrap();
    assert_eq!(envelope.message, ClientMessage::Ping { nonce: 7 });

    server
        .send(Message::Text(
            r#"{"type":"pong","data":{"nonce":7}}"#.to_string().into(),
        ))
        .await
        .unwrap();
    let frame = next_event(&mut channel).await;
    let inbound = channel.handle_link_event(frame).unwrap();
    assert_eq!(inbound.message, ServerMessage::Pong { nonce: 7 });

    // The server goes away; the worker reports it and dials again.
    drop(server);
    let down = next_event(&mut channel).await;
    assert!(matches!(down, LinkEvent::Down { .. }));
    channel.handle_link_event(down);
    assert!(!channel.is_connected());

    channel
        .send(Envelope::new(ClientMessage::Ping { nonce: 8 }))
        .unwrap();
    assert_eq!(channel.queued_len(), 1);

    let (tcp, _) = listener.accept().await.unwrap();
    let mut server = accept_async(tcp).await.unwrap();
    let up = next_event(&mut channel).await;
    channel.handle_link_event(up);
    let frame = server.next().await.unwrap().unwrap();
    let envelope = ClientEnvelope::from_frame(frame.to_text().unwrap()).unwrap();
    assert_eq!(envelope.message, ClientMessage::Ping { nonce: 8 });

    channel.disconnect();
    assert!(!channel.is_connected());
}
