//! Render one item.

use std::process::ExitCode;

use reelsmith_common::config::AppConfig;
use reelsmith_pipeline::SingleTarget;

pub async fn run(
    config: AppConfig,
    id: Option<String>,
    category: Option<String>,
) -> anyhow::Result<ExitCode> {
    let target = match (id, category) {
        (Some(id), _) => SingleTarget::Id(id),
        (None, Some(category)) => SingleTarget::Category(category),
        (None, None) => anyhow::bail!("pass --id or --category"),
    };

    let orchestrator = super::orchestrator(config)?;
    super::watch_for_cancel(orchestrator.context().cancel.clone(), None);

    let summary = orchestrator.run_single(target).await?;
    Ok(super::report(&summary))
}
