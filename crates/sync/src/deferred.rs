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

use indexmap::IndexMap;
use std::hash::Hash;

/// Work parked until some key (usually a content hash) resolves.
///
/// Each key's work is released exactly once, either by `drain` (in the order it was deferred) or
/// by `discard`; after that the key is forgotten and new work for it starts a fresh list.
pub struct DeferredQueue<K, W> {
    waiting: IndexMap<K, Vec<W>>,
}

impl<K, W> Default for DeferredQueue<K, W> {
    fn default() -> Self {
        Self {
            waiting: IndexMap::new(),
        }
    }
}

impl<K: Hash + Eq, W> DeferredQueue<K, W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&mut self, key: K, work: W) {
        self.waiting.entry(key).or_default().push(work);
    }

    /// Release everything waiting on `key`, oldest first.
    pub fn drain(&mut self, key: &K) -> Vec<W> {
        self.waiting.shift_remove(key).unwrap_or_default()
    }

    /// Give up on `key`. The abandoned work is returned so the caller can report it.
    pub fn discard(&mut self, key: &K) -> Vec<W> {
        self.drain(key)
    }

    /// Take back individual items that no longer need to wait.
    pub fn withdraw(&mut self, key: &K, mut unwanted: impl FnMut(&W) -> bool) -> usize {
        let Some(work) = self.waiting.get_mut(key) else {
            return 0;
        };
        let before = work.len();
        work.retain(|w| !unwanted(w));
        let withdrawn = before - work.len();
        if work.is_empty() {
            self.waiting.shift_remove(key);
        }
        withdrawn
    }

    pub fn waiting_on(&self, key: &K) -> usize {
        self.waiting.get(key).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_drain_releases_in_registration_order_once() {
        let mut q = DeferredQueue::new();
        q.defer("h1", 3);
        q.defer("h2", 9);
        q.defer("h1", 1);
        q.defer("h1", 2);
        assert_eq!(q.drain(&"h1"), vec![3, 1, 2]);
        assert!(q.drain(&"h1").is_empty());
        assert_eq!(q.waiting_on(&"h2"), 1);
    }

    #[test]
    fn test_withdraw_forgets_empty_keys() {
        let mut q = DeferredQueue::new();
        q.defer("h", "a");
        q.defer("h", "b");
        assert_eq!(q.withdraw(&"h", |w| *w == "a"), 1);
        assert_eq!(q.waiting_on(&"h"), 1);
        assert_eq!(q.withdraw(&"h", |w| *w == "b"), 1);
        assert_eq!(q.waiting_on(&"h"), 0);
        assert_eq!(q.withdraw(&"missing", |_| true), 0);
    }

    #[test]
    fn test_discard_returns_abandoned_work_once() {
        let mut q = DeferredQueue::new();
        q.defer(2, "x");
        q.defer(1, "y");
        q.defer(2, "z");
        assert_eq!(q.discard(&2), vec!["x", "z"]);
        assert!(q.discard(&2).is_empty());
        assert_eq!(q.waiting_on(&1), 1);
    }
}
