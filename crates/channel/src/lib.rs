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

//! The message channel: the client's single duplex connection to the tabletop server.
//!
//! The channel itself never touches a socket. A link worker task owns the WebSocket and reports
//! what happens to it as `LinkEvent`s; the channel consumes those events on the engine's thread,
//! queues sends while no link is up, flushes them in order when one appears, and decodes inbound
//! frames into `ServerEnvelope`s exactly once.

pub use channel::{MessageChannel, MessageHandler, UnansweredRequest};
pub use keepalive::KeepaliveStatus;
pub use link::LinkEvent;

mod channel;
mod keepalive;
mod link;
