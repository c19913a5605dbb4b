pub mod builders;
pub mod fake_backend;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

use wavequeue::dag::LaneAssigner;
use wavequeue::engine::{RecoverySummary, WaveRunController};
use wavequeue::store::QueueStore;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Controller over `store` with the built-in lane table, recovery done.
pub fn start_controller(store: QueueStore) -> (WaveRunController, RecoverySummary) {
    WaveRunController::start(store, LaneAssigner::default())
        .expect("Failed to start controller")
}

/// Controller over a fresh in-memory store.
pub fn memory_controller() -> WaveRunController {
    let store = QueueStore::open_in_memory().expect("Failed to open in-memory store");
    start_controller(store).0
}
