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

use clap::builder::ValueHint;
use clap_derive::Parser;
use eyre::eyre;
use figment::Figment;
use figment::providers::{Format, Serialized, Yaml};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabula_common::{Size, SyncConfig, WorldPosition};

#[derive(Parser, Debug)]
#[command(name = "tabula-client", about = "Connect to a tabletop server and keep the table in sync")]
pub struct Args {
    #[arg(
        long,
        value_name = "server-url",
        help = "WebSocket URL of the table server",
        default_value = "ws://localhost:8080/ws"
    )]
    pub server_url: String,

    #[arg(
        long,
        value_name = "config",
        help = "Path to configuration (YAML) file to use, if any. If not specified, defaults are used.\
                Configuration file values can be overridden by command line arguments.",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub sync_args: SyncArgs,

    #[command(flatten)]
    pub drop_args: DropArgs,

    #[arg(long, help = "Enable debug logging", default_value = "false")]
    pub debug: bool,
}

/// Overrides for individual `SyncConfig` fields.
#[derive(Parser, Debug, Default)]
pub struct SyncArgs {
    #[arg(
        long,
        value_name = "rollback-timeout",
        help = "How long a provisional sprite waits for the server before it is withdrawn, e.g. \"10s\"",
        value_parser = humantime::parse_duration
    )]
    pub rollback_timeout: Option<Duration>,

    #[arg(
        long,
        value_name = "keepalive-interval",
        help = "Interval between keepalive pings while connected",
        value_parser = humantime::parse_duration
    )]
    pub keepalive_interval: Option<Duration>,

    #[arg(
        long,
        value_name = "cache-max-age",
        help = "Age after which cached assets are reclaimed",
        value_parser = humantime::parse_duration
    )]
    pub cache_max_age: Option<Duration>,

    #[arg(
        long,
        value_name = "cache-max-bytes",
        help = "Total cached bytes above which least recently used assets are evicted"
    )]
    pub cache_max_bytes: Option<u64>,

    #[arg(
        long,
        value_name = "session-context",
        help = "Opaque table/session identifier forwarded with upload requests"
    )]
    pub session_context: Option<String>,
}

impl SyncArgs {
    pub fn merge_config(&self, config: &mut SyncConfig) {
        if let Some(timeout) = self.rollback_timeout {
            config.optimistic.rollback_timeout = timeout;
        }
        if let Some(interval) = self.keepalive_interval {
            config.channel.keepalive_interval = interval;
        }
        if let Some(max_age) = self.cache_max_age {
            config.cache.max_age = max_age;
        }
        if let Some(max_bytes) = self.cache_max_bytes {
            config.cache.max_bytes = max_bytes;
        }
        if let Some(context) = self.session_context.as_ref() {
            config.session_context = Some(context.clone());
        }
    }
}

/// An image to drop onto the table once connected.
#[derive(Parser, Debug, Default)]
pub struct DropArgs {
    #[arg(
        long,
        value_name = "drop-file",
        help = "Image file to place on the table after connecting",
        value_hint = ValueHint::FilePath
    )]
    pub drop_file: Option<PathBuf>,

    #[arg(long, help = "World x coordinate of the dropped image", default_value = "0")]
    pub x: f32,

    #[arg(long, help = "World y coordinate of the dropped image", default_value = "0")]
    pub y: f32,

    #[arg(long, help = "Width of the dropped image in world units", default_value = "100")]
    pub width: f32,

    #[arg(long, help = "Height of the dropped image in world units", default_value = "100")]
    pub height: f32,

    #[arg(long, help = "Layer to place the dropped image on", default_value = "tokens")]
    pub layer: String,

    #[arg(
        long,
        value_name = "mime-type",
        help = "Content type of the dropped image; guessed from the extension if omitted"
    )]
    pub mime_type: Option<String>,
}

impl DropArgs {
    pub fn position(&self) -> WorldPosition {
        WorldPosition {
            x: self.x,
            y: self.y,
        }
    }

    pub fn size(&self) -> Size {
        Size {
            width: self.width,
            height: self.height,
        }
    }

    pub fn content_type(&self, path: &Path) -> String {
        if let Some(mime) = &self.mime_type {
            return mime.clone();
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("png") => "image/png",
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("svg") => "image/svg+xml",
            _ => "application/octet-stream",
        }
        .to_string()
    }
}

impl Args {
    /// Load the configuration file if we have it, then apply command line overrides on top.
    pub fn load_config(&self) -> Result<SyncConfig, eyre::Report> {
        let mut config = match &self.config_file {
            Some(config_path) => Figment::new()
                .merge(Serialized::defaults(SyncConfig::default()))
                .merge(Yaml::file(config_path))
                .extract::<SyncConfig>()
                .map_err(|e| {
                    eyre!(
                        "Failed to parse configuration from {:?}: {}",
                        config_path,
                        e
                    )
                })?,
            None => SyncConfig::default(),
        };
        self.sync_args.merge_config(&mut config);
        config
            .validate()
            .map_err(|e| eyre!("Invalid configuration: {}", e))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("tabula-client").chain(argv.iter().copied())).unwrap()
    }

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let args = parse(&[]);
        assert_eq!(args.load_config().unwrap(), SyncConfig::default());
        assert_eq!(args.server_url, "ws://localhost:8080/ws");
    }

    #[test]
    fn test_file_values_layer_over_defaults() {
        let file = yaml_file("optimistic:\n  rollback_timeout: 3s\ncache:\n  max_bytes: 1024\n");
        let args = parse(&["--config-file", file.path().to_str().unwrap()]);
        let config = args.load_config().unwrap();
        assert_eq!(config.optimistic.rollback_timeout, Duration::from_secs(3));
        assert_eq!(config.cache.max_bytes, 1024);
        assert_eq!(config.channel, SyncConfig::default().channel);
    }

    #[test]
    fn test_flags_override_file() {
        let file = yaml_file("optimistic:\n  rollback_timeout: 3s\n");
        let args = parse(&[
            "--config-file",
            file.path().to_str().unwrap(),
            "--rollback-timeout",
            "1m",
            "--session-context",
            "table-9",
        ]);
        let config = args.load_config().unwrap();
        assert_eq!(config.optimistic.rollback_timeout, Duration::from_secs(60));
        assert_eq!(config.session_context.as_deref(), Some("table-9"));
    }

    #[test]
    fn test_invalid_override_is_reported() {
        let args = parse(&["--rollback-timeout", "0s"]);
        assert!(args.load_config().is_err());
    }

    #[test]
    fn test_unparseable_file_is_reported() {
        let file = yaml_file("optimistic:\n  rollback_timeout: soon\n");
        let args = parse(&["--config-file", file.path().to_str().unwrap()]);
        assert!(args.load_config().is_err());
    }

    #[test]
    fn test_content_type_guess() {
        let args = parse(&["--drop-file", "goblin.PNG"]);
        let path = args.drop_args.drop_file.clone().unwrap();
        assert_eq!(args.drop_args.content_type(&path), "image/png");

        let args = parse(&["--drop-file", "map.bin", "--mime-type", "image/avif"]);
        let path = args.drop_args.drop_file.clone().unwrap();
        assert_eq!(args.drop_args.content_type(&path), "image/avif");
    }
}
