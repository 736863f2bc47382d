//! Check external tools and configuration.

use std::process::ExitCode;

use reelsmith_common::config::{AppConfig, TtsProvider};
use reelsmith_common::probe::command_exists;

pub fn run(config: &AppConfig) -> anyhow::Result<ExitCode> {
    println!("Reelsmith System Check");
    println!("{}", "=".repeat(50));

    let mut required_ok = true;
    let mut tool = |name: &str, required: bool| {
        let found = command_exists(name);
        match (found, required) {
            (true, _) => println!("[OK] {name}"),
            (false, true) => {
                println!("[MISSING] {name} (required)");
                required_ok = false;
            }
            (false, false) => println!("[WARN] {name} not found"),
        }
    };

    tool("ffmpeg", true);
    tool("ffprobe", true);
    let local_tts = config.tts.provider == TtsProvider::Local;
    tool(&config.tts.local_program, local_tts);

    if config.tts.provider == TtsProvider::Api && config.tts.api_url.is_none() {
        println!("[MISSING] TTS_API_URL (required by the api speech engine)");
        required_ok = false;
    }

    if config.video.background.is_file() {
        println!("[OK] Background footage: {}", config.video.background.display());
    } else {
        println!(
            "[MISSING] Background footage: {}",
            config.video.background.display()
        );
        required_ok = false;
    }

    match config.validate() {
        Ok(()) => println!("[OK] Configuration"),
        Err(err) => {
            println!("[FAIL] {err}");
            required_ok = false;
        }
    }

    println!();
    if required_ok {
        println!("Everything needed to render is available.");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Some requirements are missing. See above.");
        Ok(ExitCode::FAILURE)
    }
}
