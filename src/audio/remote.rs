//! Remote HTTP transcriber.
//!
//! Sends the audio file as a multipart POST to a whisper-compatible
//! service (`/api/whisper/transcribe`) and parses the JSON response.

use super::traits::{Transcriber, TranscriptSegment, TranscriptionOptions, TranscriptionResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

/// HTTP client for a remote transcription service.
///
/// Thread-safe and cheaply cloneable (shares the reqwest client
/// internally).
#[derive(Clone)]
pub struct RemoteTranscriber {
    client: reqwest::Client,
    base_url: String,
}

/// Wire shape of the service response.
#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    segments: Vec<WireSegment>,
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct WireSegment {
    id: u32,
    start: f64,
    end: f64,
    text: String,
}

impl RemoteTranscriber {
    /// `base_url` is the service root, e.g. `http://localhost:9000`.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/whisper/transcribe", self.base_url)
    }
}

#[async_trait]
impl Transcriber for RemoteTranscriber {
    async fn transcribe(
        &self,
        wav_path: &Path,
        options: &TranscriptionOptions,
    ) -> Result<TranscriptionResult> {
        let bytes = tokio::fs::read(wav_path)
            .await
            .with_context(|| format!("Failed to read audio file {}", wav_path.display()))?;
        let file_name = wav_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("model", options.model.clone())
            .text("temperature", options.temperature.to_string());
        if let Some(ref language) = options.language {
            form = form.text("language", language.clone());
        }
        if let Some(ref prompt) = options.prompt {
            form = form.text("prompt", prompt.clone());
        }

        let response = self
            .client
            .post(self.endpoint())
            .multipart(form)
            .timeout(options.timeout)
            .send()
            .await
            .with_context(|| format!("Failed to reach transcription service at {}", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Transcription service returned {} — {}",
                status.as_u16(),
                body
            );
        }

        let wire: WireResponse = response
            .json()
            .await
            .context("Failed to parse transcription response")?;

        Ok(TranscriptionResult {
            segments: wire
                .segments
                .into_iter()
                .map(|s| TranscriptSegment {
                    id: s.id,
                    start: s.start,
                    end: s.end,
                    text: s.text,
                })
                .collect(),
            text: wire.text,
            language: wire.language,
            duration: wire.duration,
        })
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .with_context(|| format!("Health probe failed for {}", self.base_url))?;
        if !response.status().is_success() {
            anyhow::bail!("Health probe returned {}", response.status().as_u16());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_normalizes_trailing_slash() {
        let t = RemoteTranscriber::new("http://localhost:9000/".into());
        assert_eq!(t.endpoint(), "http://localhost:9000/api/whisper/transcribe");
    }

    #[test]
    fn test_wire_response_parses() {
        let json = r#"{
            "segments": [{"id": 0, "start": 0.0, "end": 1.5, "text": "hello"}],
            "text": "hello",
            "language": "en",
            "duration": 1.5
        }"#;
        let wire: WireResponse = serde_json::from_str(json).unwrap();
        assert_eq!(wire.segments.len(), 1);
        assert_eq!(wire.text, "hello");
        assert_eq!(wire.language.as_deref(), Some("en"));
    }
}
