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

use crate::keepalive::{Keepalive, KeepaliveStatus};
use crate::link::{LinkEvent, run_link};
use std::collections::{HashMap, VecDeque};
use tabula_common::{
    ChannelConfig, ClientEnvelope, ClientMessage, Envelope, EventBus, MessageType, Priority,
    ServerEnvelope, ServerMessage, SyncError, SyncEvent,
};
use tokio::sync::broadcast;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Callback registered for one inbound message type.
pub type MessageHandler = Box<dyn FnMut(&ServerEnvelope) + Send>;

const INBOUND_BROADCAST_CAPACITY: usize = 256;

/// A correlated request that was written to a link which then went away before the reply came.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnansweredRequest {
    pub message_type: MessageType,
    pub correlation_key: String,
}

impl UnansweredRequest {
    fn of(envelope: &ClientEnvelope) -> Option<Self> {
        let message_type = envelope.message.message_type();
        message_type.reply_type()?;
        Some(Self {
            message_type,
            correlation_key: envelope.correlation_key.clone()?,
        })
    }

    fn answered_by(&self, envelope: &ServerEnvelope) -> bool {
        self.message_type.reply_type() == Some(envelope.message.message_type())
            && envelope.correlation_key.as_deref() == Some(self.correlation_key.as_str())
    }
}

struct Outbound {
    frame: String,
    request: Option<UnansweredRequest>,
}

impl Outbound {
    /// Recover what a frame handed back by a dead link was asking for.
    fn returned(frame: String) -> Self {
        let request = ClientEnvelope::from_frame(&frame)
            .ok()
            .and_then(|envelope| UnansweredRequest::of(&envelope));
        Self { frame, request }
    }
}

/// The client's connection to the server, as seen from the engine thread.
pub struct MessageChannel {
    config: ChannelConfig,
    events: EventBus,
    /// Present while a link is up.
    link: Option<UnboundedSender<String>>,
    /// Encoded frames waiting for a link, oldest first.
    queue: VecDeque<Outbound>,
    /// Requests written to the current link and not yet answered.
    awaiting: Vec<UnansweredRequest>,
    /// Requests whose link went away before an answer arrived.
    lost: Vec<UnansweredRequest>,
    handlers: HashMap<MessageType, MessageHandler>,
    inbound: broadcast::Sender<ServerEnvelope>,
    link_events_tx: UnboundedSender<LinkEvent>,
    link_events_rx: UnboundedReceiver<LinkEvent>,
    keepalive: Keepalive,
    worker: Option<JoinHandle<()>>,
}

impl MessageChannel {
    pub fn new(config: ChannelConfig, events: EventBus) -> Self {
        let (link_events_tx, link_events_rx) = unbounded_channel();
        let (inbound, _) = broadcast::channel(INBOUND_BROADCAST_CAPACITY);
        let keepalive = Keepalive::new(config.keepalive_interval, config.pong_grace);
        Self {
            config,
            events,
            link: None,
            queue: VecDeque::new(),
            awaiting: vec![],
            lost: vec![],
            handlers: HashMap::new(),
            inbound,
            link_events_tx,
            link_events_rx,
            keepalive,
            worker: None,
        }
    }

    /// Start (or restart) the link worker for `url`. Returns immediately; the link comes up
    /// asynchronously and is reported through `next_link_event`.
    pub fn connect(&mut self, url: &str) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        self.release_link();
        info!(%url, "Starting message channel link");
        self.worker = Some(tokio::spawn(run_link(
            url.to_string(),
            self.config.clone(),
            self.link_events_tx.clone(),
        )));
    }

    /// Stop the link worker. Queued sends are kept; requests already written will never be
    /// answered.
    pub fn disconnect(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        if self.link.is_some() {
            self.release_link();
            self.events.publish(SyncEvent::Disconnected);
        }
    }

    /// Requests that lost their link before being answered, since the last call.
    pub fn take_unanswered(&mut self) -> Vec<UnansweredRequest> {
        std::mem::take(&mut self.lost)
    }

    /// Requests written to the current link and still waiting for their reply.
    pub fn awaiting_replies(&self) -> usize {
        self.awaiting.len()
    }

    /// A sender through which a link can report events, for hosting a link outside this crate's
    /// worker (tests, alternative transports).
    pub fn link_events(&self) -> UnboundedSender<LinkEvent> {
        self.link_events_tx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Transmit now if the link is up, otherwise queue for the next link.
    pub fn send(&mut self, envelope: ClientEnvelope) -> Result<(), SyncError> {
        let frame = envelope.to_frame()?;
        trace!(message_type = %envelope.message.message_type(), "Sending");
        self.send_frame(Outbound {
            frame,
            request: UnansweredRequest::of(&envelope),
        });
        Ok(())
    }

    /// Shorthand for an uncorrelated, normal-priority send.
    pub fn send_message(&mut self, message: ClientMessage) -> Result<(), SyncError> {
        self.send(Envelope::new(message))
    }

    fn send_frame(&mut self, outbound: Outbound) {
        let Some(link) = &self.link else {
            self.queue.push_back(outbound);
            return;
        };
        let Outbound { frame, request } = outbound;
        match link.send(frame) {
            Ok(()) => self.awaiting.extend(request),
            Err(returned) => {
                // The worker let go of this link without telling us yet; its Down is on the way.
                debug!("Link closed underneath us; queueing");
                self.link = None;
                self.queue.push_back(Outbound {
                    frame: returned.0,
                    request,
                });
            }
        }
    }

    /// Register the handler for one message type, replacing any earlier one. Returns true if a
    /// handler was replaced.
    pub fn on_message(&mut self, message_type: MessageType, handler: MessageHandler) -> bool {
        self.handlers.insert(message_type, handler).is_some()
    }

    /// Every decoded inbound message, for any number of observers.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEnvelope> {
        self.inbound.subscribe()
    }

    /// Wait for the next thing to happen on the link. Never resolves to `None` while the channel
    /// is alive, since the channel holds a sender itself.
    pub async fn next_link_event(&mut self) -> Option<LinkEvent> {
        self.link_events_rx.recv().await
    }

    /// Apply a link event. Returns the decoded message for inbound frames.
    pub fn handle_link_event(&mut self, event: LinkEvent) -> Option<ServerEnvelope> {
        match event {
            LinkEvent::Up(link) => {
                self.link_up(link);
                None
            }
            LinkEvent::Down { unsent } => {
                self.link_down(unsent);
                None
            }
            LinkEvent::Frame(frame) => self.receive_frame(&frame),
        }
    }

    fn link_up(&mut self, link: UnboundedSender<String>) {
        let mut flushed = 0;
        while let Some(Outbound { frame, request }) = self.queue.pop_front() {
            if let Err(returned) = link.send(frame) {
                self.queue.push_front(Outbound {
                    frame: returned.0,
                    request,
                });
                warn!("Link closed while flushing queued sends");
                return;
            }
            self.awaiting.extend(request);
            flushed += 1;
        }
        info!(flushed, "Message channel link up");
        self.link = Some(link);
        self.keepalive.link_up(Instant::now());
        self.events.publish(SyncEvent::Connected);
    }

    fn link_down(&mut self, unsent: Vec<String>) {
        let was_up = self.link.take().is_some();
        // Unsent frames predate anything queued since, so they go back in front. Their requests
        // will be written again and are still answerable.
        for frame in unsent.into_iter().rev() {
            let outbound = Outbound::returned(frame);
            if let Some(request) = &outbound.request
                && let Some(at) = self.awaiting.iter().position(|r| r == request)
            {
                self.awaiting.remove(at);
            }
            self.queue.push_front(outbound);
        }
        self.keepalive.link_down();
        self.abandon_awaiting();
        info!(queued = self.queue.len(), "Message channel link down");
        if was_up {
            self.events.publish(SyncEvent::Disconnected);
        }
    }

    fn release_link(&mut self) {
        self.link = None;
        self.keepalive.link_down();
        self.abandon_awaiting();
    }

    fn abandon_awaiting(&mut self) {
        if self.awaiting.is_empty() {
            return;
        }
        warn!(
            unanswered = self.awaiting.len(),
            "Link lost with requests awaiting replies"
        );
        self.lost.append(&mut self.awaiting);
    }

    fn receive_frame(&mut self, frame: &str) -> Option<ServerEnvelope> {
        let envelope = match ServerEnvelope::from_frame(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Discarding undecodable frame from server");
                self.events.publish(SyncEvent::ProtocolError {
                    message_type: None,
                    reason: e.to_string(),
                });
                return None;
            }
        };
        let message_type = envelope.message.message_type();
        trace!(%message_type, correlation_key = ?envelope.correlation_key, "Received");
        if let Some(at) = self.awaiting.iter().position(|r| r.answered_by(&envelope)) {
            self.awaiting.remove(at);
        }

        if let ServerMessage::Pong { nonce } = envelope.message
            && !self.keepalive.pong(nonce)
        {
            debug!(nonce, "Unexpected pong");
        }
        if let Some(handler) = self.handlers.get_mut(&message_type) {
            handler(&envelope);
        }
        let _ = self.inbound.send(envelope.clone());
        Some(envelope)
    }

    /// When the keepalive next needs attention, if a link is up.
    pub fn keepalive_deadline(&self) -> Option<Instant> {
        self.keepalive.deadline()
    }

    /// Drive the keepalive: send a due ping, or drop a link whose pong is overdue so the worker
    /// reconnects.
    pub fn keepalive_tick(&mut self, now: Instant) -> KeepaliveStatus {
        let status = self.keepalive.tick(now);
        match status {
            KeepaliveStatus::SendPing(nonce) => {
                let ping = Envelope::new(ClientMessage::Ping { nonce }).with_priority(Priority::High);
                if let Ok(frame) = ping.to_frame()
                    && let Some(link) = &self.link
                {
                    let _ = link.send(frame);
                }
            }
            KeepaliveStatus::Fault => {
                warn!("Server stopped answering pings; dropping link");
                // Releasing the sender tells the worker to close and reconnect; its Down event
                // returns anything it had not written and settles what was awaiting replies.
                self.link = None;
                self.events.publish(SyncEvent::Disconnected);
            }
            KeepaliveStatus::Idle => {}
        }
        status
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}
