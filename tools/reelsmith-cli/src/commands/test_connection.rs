//! Check that the content source is reachable.

use std::process::ExitCode;

use reelsmith_common::config::AppConfig;

pub async fn run(config: AppConfig) -> anyhow::Result<ExitCode> {
    let orchestrator = super::orchestrator(config)?;
    match orchestrator.test_connection().await {
        Ok(mode) => {
            println!("[OK] Content source reachable: {mode}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!("[FAIL] {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}
