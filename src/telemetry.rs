/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/telemetry.rs
 * Installs the global `tracing` subscriber. Progress goes to stdout,
 * warnings and errors to stderr; `RUST_LOG` overrides the default `info`
 * filter.
 * SPDX-License-Identifier: Apache-2.0 */

use tracing::Level;
use tracing_subscriber::{fmt, fmt::writer::MakeWriterExt, prelude::*, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = std::io::stderr
        .with_max_level(Level::WARN)
        .or_else(std::io::stdout);

    let fmt_layer = fmt::layer()
        .with_writer(writer)
        .with_target(false)
        .with_level(true);

    // A second init (as in tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
