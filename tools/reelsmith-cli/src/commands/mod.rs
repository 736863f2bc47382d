pub mod batch;
pub mod check;
pub mod init;
pub mod list_categories;
pub mod list_voices;
pub mod rewrite_only;
pub mod single;
pub mod test_connection;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use reelsmith_common::config::AppConfig;
use reelsmith_pipeline::{BatchSummary, Orchestrator, RunContext};

/// Build an orchestrator over the production backends.
pub fn orchestrator(config: AppConfig) -> anyhow::Result<Arc<Orchestrator>> {
    let ctx = Arc::new(RunContext::new(config)?);
    Ok(Arc::new(Orchestrator::from_context(ctx)?))
}

/// Cancel `token` on Ctrl-C or once `timeout` elapses.
pub fn watch_for_cancel(token: CancellationToken, timeout: Option<Duration>) {
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing in-flight stages...");
            on_signal.cancel();
        }
    });

    if let Some(timeout) = timeout {
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    tracing::warn!(timeout_secs = timeout.as_secs(), "Run timed out, cancelling");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        });
    }
}

/// Print the summary table; success only if some item finished.
pub fn report(summary: &BatchSummary) -> ExitCode {
    if summary.outcomes.is_empty() {
        println!("No items processed.");
    } else {
        println!("{summary}");
    }
    if summary.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
