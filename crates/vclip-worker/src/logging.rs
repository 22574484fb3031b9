//! Tracing setup for the `vclip-worker` binary.

use tracing::Span;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber: JSON-formatted events filtered by
/// `RUST_LOG`, defaulting to `info` for the `vclip` target family.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive("vclip=info".parse().unwrap()))
        .init();
}

/// A tracing span scoped to one orchestrator sample, carrying the fields a
/// reader needs to correlate tracker/model-pool logs with a specific frame.
pub fn sample_span(sample_index: u64, t: f64) -> Span {
    tracing::info_span!("sample", sample_index, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_span_carries_the_expected_fields() {
        let span = sample_span(42, 1.5);
        assert_eq!(span.metadata().unwrap().name(), "sample");
    }
}
