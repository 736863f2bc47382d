//! Render a batch of items.

use std::process::ExitCode;
use std::time::Duration;

use reelsmith_common::config::AppConfig;
use reelsmith_content_source::{SortMode, TimeFilter};
use reelsmith_pipeline::BatchRequest;

pub async fn run(
    config: AppConfig,
    limit: Option<usize>,
    categories: Vec<String>,
    sort: Option<SortMode>,
    time_filter: Option<TimeFilter>,
    timeout_secs: Option<u64>,
) -> anyhow::Result<ExitCode> {
    let limit = limit.unwrap_or(config.pipeline.batch_limit);
    if limit == 0 {
        anyhow::bail!("--limit must be at least 1");
    }

    let orchestrator = super::orchestrator(config)?;
    super::watch_for_cancel(
        orchestrator.context().cancel.clone(),
        timeout_secs.map(Duration::from_secs),
    );

    let request = BatchRequest {
        limit,
        categories,
        sort,
        time_filter,
    };
    println!("Rendering up to {limit} item(s)...");
    let summary = orchestrator.run_batch(request).await?;
    Ok(super::report(&summary))
}
