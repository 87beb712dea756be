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

//! Shared tracing initialization for tabula binaries

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Transport crates that are far too chatty at debug level.
const QUIET_DIRECTIVES: &[&str] = &["tungstenite=warn", "tokio_tungstenite=warn", "hyper=warn"];

fn build_filter(env: Option<EnvFilter>, debug_fallback: bool) -> Result<EnvFilter, eyre::Report> {
    // An explicit RUST_LOG wins, but the transport layers stay quiet either way
    let mut filter = env.unwrap_or_else(|| {
        EnvFilter::new(if debug_fallback { "debug" } else { "info" })
    });
    for directive in QUIET_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

/// Initialize tracing for a tabula binary.
///
/// `RUST_LOG` is honored when set; otherwise `debug_fallback` picks DEBUG over INFO. Output is
/// the compact formatter with file and line, so log lines can be traced back to the component
/// that emitted them.
pub fn init_tracing(debug_fallback: bool) -> Result<(), eyre::Report> {
    let filter = build_filter(EnvFilter::try_from_default_env().ok(), debug_fallback)?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_ansi(true)
                .with_file(true)
                .with_target(false)
                .with_line_number(true)
                .with_thread_names(true),
        )
        .with(filter)
        .try_init()?;

    Ok(())
}
