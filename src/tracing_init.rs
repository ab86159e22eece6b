//! # Observability
//!
//! Structured logging for the whole pipeline, wired the same way the
//! teacher's `lifecycle::tracing::setup_tracing` does: a compact
//! `tracing-subscriber` format, configurable via `RUST_LOG`.
//!
//! ```bash
//! RUST_LOG=info cargo run      # stage lifecycle + EOI broadcasts
//! RUST_LOG=debug cargo run     # + per-input/per-roster-change detail
//! ```

pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
