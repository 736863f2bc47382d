//! List voices offered by the configured speech engine.

use std::process::ExitCode;

use reelsmith_common::config::AppConfig;

pub async fn run(config: &AppConfig) -> anyhow::Result<ExitCode> {
    let backend = reelsmith_speech::build_backend(&config.tts)?;
    let voices = backend.list_voices().await?;

    if voices.is_empty() {
        println!("The {} engine reported no voices.", backend.name());
        return Ok(ExitCode::SUCCESS);
    }

    println!("Voices ({} engine):", backend.name());
    for voice in &voices {
        let language = voice.language.as_deref().unwrap_or("-");
        match &voice.gender {
            Some(gender) => println!(
                "  {:<24} {:<10} {} ({gender})",
                voice.id, language, voice.name
            ),
            None => println!("  {:<24} {:<10} {}", voice.id, language, voice.name),
        }
    }
    println!();
    println!("Set tts.voice in the config file to pick one.");
    Ok(ExitCode::SUCCESS)
}
