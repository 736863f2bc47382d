//! Fetch and rewrite one item, then stop.

use std::path::PathBuf;
use std::process::ExitCode;

use reelsmith_common::config::AppConfig;

pub async fn run(
    config: AppConfig,
    id: String,
    output: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    config.validate()?;
    let orchestrator = super::orchestrator(config)?;
    let script = orchestrator.rewrite_only(&id).await?;

    if let Some(output) = output {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&output, &script.text)?;
        println!("Script copied to {}", output.display());
    }

    println!("Item:    {}", script.item_id);
    println!("Backend: {}", script.backend);
    println!("Words:   {} (target {})", script.word_count, script.target_word_count);
    println!("Saved:   {}", script.path.display());
    println!("{}", "-".repeat(50));
    println!("{}", script.text);

    Ok(ExitCode::SUCCESS)
}
