//! HTTP speech engine.
//!
//! `POST {api_url}/synthesize` with `{text, voice, format}` and bearer auth.
//! The reply is either raw audio or JSON carrying base64 audio under one of
//! `audio`, `audioContent`, `audio_content` or `data`, optionally with word
//! timings as `words: [{word, start, end}]`.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;

use reelsmith_common::config::TtsConfig;
use reelsmith_common::error::{is_transient_status, SynthesisError};
use reelsmith_story_model::{TimingTable, WordTiming};

use crate::backend::{SpeechBackend, SpeechOutput, Voice};

const AUDIO_FIELDS: [&str; 4] = ["audio", "audioContent", "audio_content", "data"];

pub struct ApiEngine {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    voice: Option<String>,
    format: String,
}

impl ApiEngine {
    pub fn new(config: &TtsConfig) -> Result<Self, SynthesisError> {
        let base_url = config
            .api_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                SynthesisError::permanent("tts.provider is api but TTS_API_URL is not set")
            })?
            .trim_end_matches('/')
            .to_string();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| SynthesisError::permanent(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            voice: config.voice.clone(),
            format: config.api_format.clone(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

fn transport_error(err: reqwest::Error) -> SynthesisError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        SynthesisError::transient(format!("TTS request failed: {err}"))
    } else {
        SynthesisError::permanent(format!("TTS request failed: {err}"))
    }
}

fn status_error(status: u16, body: &[u8]) -> SynthesisError {
    let snippet: String = String::from_utf8_lossy(body).chars().take(300).collect();
    let message = format!("TTS API returned HTTP {status}: {snippet}");
    if is_transient_status(status) {
        SynthesisError::transient(message)
    } else {
        SynthesisError::permanent(message)
    }
}

#[async_trait]
impl SpeechBackend for ApiEngine {
    fn name(&self) -> &str {
        "api"
    }

    async fn synthesize(&self, text: &str) -> Result<SpeechOutput, SynthesisError> {
        let body = serde_json::json!({
            "text": text,
            "voice": self.voice,
            "format": self.format,
        });

        let request = self
            .http
            .post(format!("{}/synthesize", self.base_url))
            .header(reqwest::header::ACCEPT, format!("audio/{}", self.format))
            .json(&body);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let bytes = response.bytes().await.map_err(transport_error)?;
        if !(200..300).contains(&status) {
            return Err(status_error(status, &bytes));
        }

        tracing::debug!(content_type = %content_type, bytes = bytes.len(), "TTS API response");
        if content_type.contains("application/json") {
            parse_json_audio(&bytes, &self.format)
        } else {
            if bytes.is_empty() {
                return Err(SynthesisError::permanent("TTS API returned an empty body"));
            }
            Ok(SpeechOutput {
                audio: bytes.to_vec(),
                extension: extension_for(&content_type).unwrap_or(&self.format).to_string(),
                timing: None,
            })
        }
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, SynthesisError> {
        let response = self
            .authorize(self.http.get(format!("{}/voices", self.base_url)))
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(transport_error)?;
        if !(200..300).contains(&status) {
            return Err(status_error(status, &bytes));
        }
        parse_voice_response(&bytes)
    }
}

/// File extension for an audio MIME type.
fn extension_for(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    match mime {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        "audio/ogg" | "audio/opus" => Some("ogg"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/aac" => Some("aac"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct ApiWord {
    word: String,
    start: f64,
    end: f64,
}

fn parse_json_audio(body: &[u8], default_format: &str) -> Result<SpeechOutput, SynthesisError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| SynthesisError::permanent(format!("invalid TTS JSON response: {e}")))?;

    let encoded = AUDIO_FIELDS
        .iter()
        .find_map(|field| value.get(*field).and_then(|v| v.as_str()))
        .ok_or_else(|| SynthesisError::permanent("no audio data found in TTS API response"))?;
    let audio = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| SynthesisError::permanent(format!("invalid base64 audio: {e}")))?;
    if audio.is_empty() {
        return Err(SynthesisError::permanent("TTS API returned empty audio"));
    }

    let timing = match value.get("words") {
        Some(words) => {
            let words: Vec<ApiWord> = serde_json::from_value(words.clone())
                .map_err(|e| SynthesisError::permanent(format!("invalid word timings: {e}")))?;
            Some(TimingTable::new(
                words
                    .into_iter()
                    .map(|w| WordTiming {
                        word: w.word,
                        start_secs: w.start,
                        end_secs: w.end,
                    })
                    .collect(),
            ))
        }
        None => None,
    };

    let extension = value
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or(default_format)
        .to_string();

    Ok(SpeechOutput {
        audio,
        extension,
        timing,
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiVoice {
    Named(String),
    Detailed {
        #[serde(alias = "voice_id")]
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        gender: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct VoiceResponse {
    #[serde(default)]
    voices: Vec<ApiVoice>,
}

fn parse_voice_response(body: &[u8]) -> Result<Vec<Voice>, SynthesisError> {
    let response: VoiceResponse = serde_json::from_slice(body)
        .map_err(|e| SynthesisError::permanent(format!("invalid voice list: {e}")))?;
    Ok(response
        .voices
        .into_iter()
        .map(|voice| match voice {
            ApiVoice::Named(id) => Voice {
                name: id.clone(),
                id,
                language: None,
                gender: None,
            },
            ApiVoice::Detailed {
                id,
                name,
                language,
                gender,
            } => Voice {
                name: name.unwrap_or_else(|| id.clone()),
                id,
                language,
                gender,
            },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelsmith_common::error::Retryable;

    #[test]
    fn test_missing_url_is_permanent() {
        let err = ApiEngine::new(&TtsConfig::default()).err().unwrap();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_json_audio_with_word_timings() {
        let encoded = general_purpose::STANDARD.encode(b"RIFFfake");
        let body = format!(
            r#"{{"audioContent":"{encoded}","format":"wav","words":[{{"word":"Hi","start":0.0,"end":0.3}},{{"word":"there.","start":0.35,"end":0.8}}]}}"#
        );
        let output = parse_json_audio(body.as_bytes(), "mp3").unwrap();
        assert_eq!(output.audio, b"RIFFfake");
        assert_eq!(output.extension, "wav");
        let timing = output.timing.unwrap();
        assert_eq!(timing.len(), 2);
        assert_eq!(timing.words[1].end_secs, 0.8);
    }

    #[test]
    fn test_json_audio_field_fallbacks() {
        let encoded = general_purpose::STANDARD.encode(b"ID3");
        let body = format!(r#"{{"data":"{encoded}"}}"#);
        let output = parse_json_audio(body.as_bytes(), "mp3").unwrap();
        assert_eq!(output.extension, "mp3");
        assert!(output.timing.is_none());

        assert!(parse_json_audio(br#"{"status":"ok"}"#, "mp3").is_err());
        assert!(parse_json_audio(br#"{"audio":"***"}"#, "mp3").is_err());
    }

    #[test]
    fn test_extension_for_content_type() {
        assert_eq!(extension_for("audio/mpeg"), Some("mp3"));
        assert_eq!(extension_for("audio/wav; codecs=1"), Some("wav"));
        assert_eq!(extension_for("application/octet-stream"), None);
    }

    #[test]
    fn test_status_classification() {
        assert!(status_error(503, b"busy").is_transient());
        assert!(!status_error(401, b"no").is_transient());
    }

    #[test]
    fn test_voice_response_shapes() {
        let body = br#"{"voices":["alloy",{"voice_id":"v2","name":"Nova","gender":"F"}]}"#;
        let voices = parse_voice_response(body).unwrap();
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].id, "alloy");
        assert_eq!(voices[0].name, "alloy");
        assert_eq!(voices[1].id, "v2");
        assert_eq!(voices[1].name, "Nova");
    }
}
