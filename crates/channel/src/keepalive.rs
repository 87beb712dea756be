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

use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// What the keepalive wants done after a tick.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeepaliveStatus {
    /// Nothing due.
    Idle,
    /// Send a ping carrying this nonce.
    SendPing(u64),
    /// A ping went unanswered past the grace window.
    Fault,
}

/// Ping/pong bookkeeping for one connection lifetime.
pub(crate) struct Keepalive {
    interval: Duration,
    grace: Duration,
    nonce: u64,
    next_ping: Option<Instant>,
    awaiting: Option<(u64, Instant)>,
}

impl Keepalive {
    pub(crate) fn new(interval: Duration, grace: Duration) -> Self {
        Self {
            interval,
            grace,
            nonce: 0,
            next_ping: None,
            awaiting: None,
        }
    }

    pub(crate) fn link_up(&mut self, now: Instant) {
        self.next_ping = Some(now + self.interval);
        self.awaiting = None;
    }

    pub(crate) fn link_down(&mut self) {
        self.next_ping = None;
        self.awaiting = None;
    }

    /// The next instant at which `tick` has something to do.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        match (self.next_ping, self.awaiting) {
            (Some(ping), Some((_, pong))) => Some(ping.min(pong)),
            (Some(ping), None) => Some(ping),
            (None, Some((_, pong))) => Some(pong),
            (None, None) => None,
        }
    }

    pub(crate) fn tick(&mut self, now: Instant) -> KeepaliveStatus {
        if let Some((nonce, deadline)) = self.awaiting
            && now >= deadline
        {
            warn!(nonce, "Keepalive pong not received within grace window");
            self.link_down();
            return KeepaliveStatus::Fault;
        }
        match self.next_ping {
            Some(at) if now >= at => {
                self.nonce += 1;
                self.next_ping = Some(now + self.interval);
                // A fresh ping supersedes one still outstanding only if that one is not yet overdue.
                if self.awaiting.is_none() {
                    self.awaiting = Some((self.nonce, now + self.grace));
                }
                KeepaliveStatus::SendPing(self.nonce)
            }
            _ => KeepaliveStatus::Idle,
        }
    }

    /// Returns true if this pong answered the outstanding ping.
    pub(crate) fn pong(&mut self, nonce: u64) -> bool {
        match self.awaiting {
            Some((expected, _)) if expected == nonce => {
                self.awaiting = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keepalive() -> Keepalive {
        Keepalive::new(Duration::from_secs(30), Duration::from_secs(10))
    }

    #[test]
    fn test_no_pings_while_down() {
        let mut ka = keepalive();
        assert_eq!(ka.deadline(), None);
        assert_eq!(ka.tick(Instant::now()), KeepaliveStatus::Idle);
    }

    #[test]
    fn test_ping_then_pong_clears() {
        let start = Instant::now();
        let mut ka = keepalive();
        ka.link_up(start);
        assert_eq!(ka.tick(start), KeepaliveStatus::Idle);
        let at = start + Duration::from_secs(30);
        assert_eq!(ka.deadline(), Some(at));
        let KeepaliveStatus::SendPing(nonce) = ka.tick(at) else {
            panic!("expected a ping");
        };
        assert_eq!(ka.deadline(), Some(at + Duration::from_secs(10)));
        assert!(ka.pong(nonce));
        assert_eq!(ka.deadline(), Some(at + Duration::from_secs(30)));
        assert_eq!(
            ka.tick(at + Duration::from_secs(11)),
            KeepaliveStatus::Idle
        );
    }

    #[test]
    fn test_missing_pong_is_a_fault() {
        let start = Instant::now();
        let mut ka = keepalive();
        ka.link_up(start);
        let at = start + Duration::from_secs(30);
        assert!(matches!(ka.tick(at), KeepaliveStatus::SendPing(_)));
        assert_eq!(
            ka.tick(at + Duration::from_secs(10)),
            KeepaliveStatus::Fault
        );
        assert_eq!(ka.deadline(), None);
    }

    #[test]
    fn test_stale_pong_is_ignored() {
        let start = Instant::now();
        let mut ka = keepalive();
        ka.link_up(start);
        let at = start + Duration::from_secs(30);
        let KeepaliveStatus::SendPing(nonce) = ka.tick(at) else {
            panic!("expected a ping");
        };
        assert!(!ka.pong(nonce + 1));
        assert!(ka.pong(nonce));
    }
}
