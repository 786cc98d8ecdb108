//! Development helper: initialize a tracing subscriber when `RUST_LOG` is set.

/// Install a `tracing-subscriber` fmt subscriber filtered by `RUST_LOG`.
///
/// Tests and demos can call `keel::dev_tracing::init_tracing()` to see the
/// socket's `[CLIENT]` / `[SERVER]` / `[HANDSHAKE]` logs. This is a no-op
/// when `RUST_LOG` is not set or when a global subscriber is already
/// installed, so calling it from every test is fine.
pub fn init_tracing() {
    if std::env::var_os("RUST_LOG").is_some() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}
