//! Show configured categories.

use std::process::ExitCode;

use reelsmith_common::config::AppConfig;

pub fn run(config: &AppConfig) -> anyhow::Result<ExitCode> {
    println!("Categories (tried in order):");
    for (i, category) in config.source.categories.iter().enumerate() {
        println!("  {}. {}", i + 1, category);
    }
    println!();
    println!("Default sort: {}", config.source.sort);
    println!("Default time filter: {}", config.source.time_filter);
    Ok(ExitCode::SUCCESS)
}
