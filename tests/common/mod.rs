//! Shared test-harness setup.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the `tracing` subscriber once per test binary, the way
/// this lineage's `main.rs` wires up `FmtSubscriber`, but filtered via
/// `RUST_LOG` instead of a CLI flag and tolerant of being called from
/// more than one test.
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}
