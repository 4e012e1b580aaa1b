//! Process-wide telemetry initialization.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs the global tracing subscriber.
///
/// Called explicitly from the process bootstrap. The installation runs at
/// most once per process; later calls (from tests, embedded servers or a
/// second bootstrap path) are no-ops, so the call is safe anywhere.
///
/// `default_filter` is used when `RUST_LOG` is not set, e.g. `"info"` or
/// `"taskmesh_server=debug"`.
pub fn init_telemetry(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    INIT.call_once(|| {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}
