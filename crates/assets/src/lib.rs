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

//! The asset cache: a content-addressed store of binary assets (token art, map images), keyed by
//! the xxHash3 digest of their bytes.

pub use cache::{AssetCache, AssetMetadata, AssetRecord, PutOutcome};
pub use stats::CacheStats;

mod cache;
mod stats;
