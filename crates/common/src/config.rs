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

//! Config is built by the hosting binary (from defaults, a YAML file and command line flags) and
//! handed to each component at construction. Durations are written as humantime strings, e.g.
//! `"30s"` or `"24h"`.

use crate::errors::SyncError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub channel: ChannelConfig,
    pub cache: CacheConfig,
    pub optimistic: OptimisticConfig,
    pub sprites: SpriteConfig,
    /// Opaque session/table context forwarded with upload requests.
    pub session_context: Option<String>,
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), SyncError> {
        let non_zero = [
            ("channel.keepalive_interval", self.channel.keepalive_interval),
            ("channel.pong_grace", self.channel.pong_grace),
            (
                "channel.reconnect_initial_backoff",
                self.channel.reconnect_initial_backoff,
            ),
            ("cache.max_age", self.cache.max_age),
            ("optimistic.rollback_timeout", self.optimistic.rollback_timeout),
        ];
        for (name, value) in non_zero {
            if value.is_zero() {
                return Err(SyncError::Config(format!("{name} must be non-zero")));
            }
        }
        if self.channel.reconnect_max_backoff < self.channel.reconnect_initial_backoff {
            return Err(SyncError::Config(
                "channel.reconnect_max_backoff must not be below reconnect_initial_backoff"
                    .to_string(),
            ));
        }
        if self.cache.max_bytes == 0 {
            return Err(SyncError::Config("cache.max_bytes must be non-zero".to_string()));
        }
        if self.sprites.placeholder_texture.is_empty() {
            return Err(SyncError::Config(
                "sprites.placeholder_texture must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// How often to ping the server while connected.
    #[serde(with = "humantime_duration")]
    pub keepalive_interval: Duration,
    /// How long a ping may go unanswered before the link is considered dead.
    #[serde(with = "humantime_duration")]
    pub pong_grace: Duration,
    #[serde(with = "humantime_duration")]
    pub reconnect_initial_backoff: Duration,
    #[serde(with = "humantime_duration")]
    pub reconnect_max_backoff: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(30),
            pong_grace: Duration::from_secs(10),
            reconnect_initial_backoff: Duration::from_millis(500),
            reconnect_max_backoff: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries older than this are reclaimed by `cleanup()`.
    #[serde(with = "humantime_duration")]
    pub max_age: Duration,
    /// Total cached bytes above which least-recently-used entries are evicted.
    pub max_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(24 * 60 * 60),
            max_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimisticConfig {
    /// How long a provisional sprite may wait for the server before it is rolled back.
    #[serde(with = "humantime_duration")]
    pub rollback_timeout: Duration,
}

impl Default for OptimisticConfig {
    fn default() -> Self {
        Self {
            rollback_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpriteConfig {
    /// Named render resource drawn while a sprite's real texture is still on its way.
    pub placeholder_texture: String,
}

impl Default for SpriteConfig {
    fn default() -> Self {
        Self {
            placeholder_texture: "placeholder".to_string(),
        }
    }
}

/// (De)serialize a `Duration` as a humantime string.
pub mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
