//! Narration duration measurement.
//!
//! Durations always come from the written audio file. WAV headers are read
//! directly; every other container goes through ffprobe.

use std::path::Path;

use reelsmith_common::error::SynthesisError;
use reelsmith_common::probe::probe_duration;

/// Playback length of the audio at `path`, in seconds.
pub fn measure_duration(path: &Path) -> Result<f64, SynthesisError> {
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));

    let secs = if is_wav {
        wav_duration(path)?
    } else {
        probe_duration(path).map_err(|e| {
            SynthesisError::permanent(format!("cannot measure {}: {e}", path.display()))
        })?
    };

    if !secs.is_finite() || secs < 0.0 {
        return Err(SynthesisError::permanent(format!(
            "invalid duration {secs} for {}",
            path.display()
        )));
    }
    Ok(secs)
}

fn wav_duration(path: &Path) -> Result<f64, SynthesisError> {
    let reader = hound::WavReader::open(path).map_err(|e| {
        SynthesisError::permanent(format!("unreadable WAV {}: {e}", path.display()))
    })?;
    let rate = reader.spec().sample_rate;
    if rate == 0 {
        return Err(SynthesisError::permanent(format!(
            "WAV {} has a zero sample rate",
            path.display()
        )));
    }
    // `duration()` counts frames, not samples across channels.
    Ok(f64::from(reader.duration()) / f64::from(rate))
}
