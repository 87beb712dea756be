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

use std::time::SystemTime;

/// Aggregate counters for an `AssetCache`.
///
/// Kept incrementally so reads are O(1); `total_assets` and `total_bytes` can always be re-derived
/// from the entries themselves (see `AssetCache::recompute_stats`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_assets: usize,
    pub total_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub last_cleanup: Option<SystemTime>,
    pub verification_failures: u64,
}

impl CacheStats {
    pub(crate) fn hit(&mut self) {
        self.hits += 1;
    }

    pub(crate) fn miss(&mut self) {
        self.misses += 1;
    }

    pub(crate) fn verification_failed(&mut self) {
        self.verification_failures += 1;
    }

    pub(crate) fn add_entry(&mut self, size: u64) {
        self.total_assets += 1;
        self.total_bytes += size;
    }

    pub(crate) fn remove_entry(&mut self, size: u64) {
        self.total_assets -= 1;
        self.total_bytes -= size;
    }

    /// Fraction of lookups that hit, or `None` before the first lookup.
    pub fn hit_ratio(&self) -> Option<f64> {
        let lookups = self.hits + self.misses;
        (lookups > 0).then(|| self.hits as f64 / lookups as f64)
    }
}
