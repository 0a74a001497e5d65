//! Test-only helpers (spec §4.7 ambient stack, §8 "Testable properties" —
//! integration tests assume a reachable `DATABASE_URL`).

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a `tracing` subscriber reading `RUST_LOG`, idempotently. Call from
/// the top of any integration test that wants log output on failure.
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}
