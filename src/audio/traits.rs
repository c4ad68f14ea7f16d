//! Transcriber trait and transcription data types.
//!
//! The trait follows the same pattern as the store seams elsewhere:
//! async trait + `Send + Sync` for `Arc<dyn Transcriber>` usage in the
//! orchestrator chain.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Options carried into every transcription attempt.
#[derive(Debug, Clone)]
pub struct TranscriptionOptions {
    /// Model identifier understood by the backend (e.g. `base`, `small`).
    pub model: String,
    /// Language hint; `None` lets the backend auto-detect.
    pub language: Option<String>,
    /// Optional priming prompt.
    pub prompt: Option<String>,
    pub temperature: f32,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            model: "base".to_string(),
            language: None,
            prompt: None,
            temperature: 0.0,
            timeout: Duration::from_secs(120),
        }
    }
}

/// One timed segment of a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: u32,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// The transcript of one audio file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub segments: Vec<TranscriptSegment>,
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: f64,
}

impl TranscriptionResult {
    /// The degraded fallback result: structurally valid, empty.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.segments.is_empty()
    }
}

/// Health status of one transcriber, exposed as a thread-safe copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriberHealth {
    pub healthy: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub consecutive_fails: u32,
    pub error_message: Option<String>,
}

impl Default for TranscriberHealth {
    fn default() -> Self {
        // Optimistic until the first probe lands, so a freshly started
        // service does not bypass a working backend.
        Self {
            healthy: true,
            last_check: None,
            consecutive_fails: 0,
            error_message: None,
        }
    }
}

/// Abstract interface over a transcription backend.
///
/// # Implementations
///
/// - [`RemoteTranscriber`](super::RemoteTranscriber): multipart POST to a
///   whisper-compatible HTTP service
/// - [`LocalTranscriber`](super::LocalTranscriber): wraps a local CLI
///   binary and parses its JSON stdout stream
/// - [`DegradedTranscriber`](super::DegradedTranscriber): always-last
///   no-op that returns an empty result
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one audio file.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure (network, process, parse); the
    /// orchestrator records it and falls through to the next entry.
    async fn transcribe(
        &self,
        wav_path: &Path,
        options: &TranscriptionOptions,
    ) -> Result<TranscriptionResult>;

    /// Probe the backend. `Ok(())` means healthy.
    async fn health_check(&self) -> Result<()>;

    /// Stable name used in the health map and in logs.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = TranscriptionOptions::default();
        assert_eq!(options.model, "base");
        assert!(options.language.is_none());
        assert_eq!(options.temperature, 0.0);
        assert_eq!(options.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_empty_result() {
        let result = TranscriptionResult::empty();
        assert!(result.is_empty());
        assert_eq!(result.duration, 0.0);
    }

    #[test]
    fn test_result_deserializes_with_missing_optionals() {
        let json = r#"{"segments": [], "text": "hi"}"#;
        let result: TranscriptionResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.text, "hi");
        assert!(result.language.is_none());
    }

    #[test]
    fn test_health_defaults_optimistic() {
        let health = TranscriberHealth::default();
        assert!(health.healthy);
        assert!(health.last_check.is_none());
        assert_eq!(health.consecutive_fails, 0);
    }
}
