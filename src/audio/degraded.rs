//! Degraded no-op transcriber.
//!
//! Always the last chain entry. Returns a structurally valid empty
//! result so a transcription request never fails outright, and reports
//! itself unhealthy so operators can see the service is degraded.

use super::traits::{Transcriber, TranscriptionOptions, TranscriptionResult};
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tracing::warn;

#[derive(Default)]
pub struct DegradedTranscriber;

impl DegradedTranscriber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transcriber for DegradedTranscriber {
    async fn transcribe(
        &self,
        wav_path: &Path,
        _options: &TranscriptionOptions,
    ) -> Result<TranscriptionResult> {
        warn!(
            audio = %wav_path.display(),
            "no transcription backend available, returning empty transcript"
        );
        Ok(TranscriptionResult::empty())
    }

    async fn health_check(&self) -> Result<()> {
        anyhow::bail!("degraded transcriber is a fallback, not a backend")
    }

    fn name(&self) -> &str {
        "degraded"
    }
}
