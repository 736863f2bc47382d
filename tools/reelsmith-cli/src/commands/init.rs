//! Write the default config file.

use std::path::PathBuf;

use reelsmith_common::config::{config_file_path, AppConfig};

pub fn run(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(config_file_path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }

    AppConfig::default().save_to(&path)?;

    println!("Wrote default config to {}", path.display());
    println!();
    println!("Credentials are read from the environment, never from this file:");
    println!("  REDDIT_CLIENT_ID, REDDIT_CLIENT_SECRET, REDDIT_USER_AGENT");
    println!("  ANTHROPIC_API_KEY or OPENAI_API_KEY");
    println!("  TTS_API_URL, TTS_API_KEY (api speech engine only)");
    println!();
    println!("Point video.background at your background footage before rendering.");
    Ok(())
}
