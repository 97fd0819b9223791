pub mod builders;
pub mod fake_command;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Install a test subscriber once per test binary, so batchrun's admission,
/// exit and drain events show up next to a failing test.
///
/// Output goes through the test writer and is only printed for failing tests
/// (or with `-- --nocapture`). Defaults to `info`; narrow it with e.g.
/// `RUST_LOG=batchrun::exec=debug` to see per-process stderr lines.
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

/// Run a future with a 5-second timeout, so a hung child process fails the
/// test instead of stalling the suite.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}
