pub mod builders;
pub mod recording_runtime;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

pub use recording_runtime::{RecordingRuntime, RuntimeCall};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Logs go through `with_test_writer()`, so the harness only shows them for
/// failing tests (or with `-- --nocapture`). Enable levels with e.g.
/// `RUST_LOG=streamdag=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Upper bound for any single awaited step in a test.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Await `f`, panicking if it takes longer than [`TEST_TIMEOUT`].
///
/// A stalled session or a runtime waiting on an event that never fires
/// shows up as a timeout instead of a hung test run.
pub async fn with_timeout<F>(f: F) -> F::Output
where
    F: Future,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(output) => output,
        Err(_) => panic!("test step timed out after {TEST_TIMEOUT:?}"),
    }
}
