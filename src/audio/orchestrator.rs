//! Transcriber chain dispatch.

use super::degraded::DegradedTranscriber;
use super::health::HealthMonitor;
use super::local::LocalTranscriber;
use super::remote::RemoteTranscriber;
use super::traits::{Transcriber, TranscriberHealth, TranscriptionOptions, TranscriptionResult};
use crate::config::{AudioConfig, TranscriberConfig};
use crate::docs::{AppendOutcome, AppendRequest, ChunkSource, DocRef, DocStore, DocumentScope, Slot};
use crate::error::{CoreError, CoreResult};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Walks an ordered priority chain of transcribers, preferring the first
/// healthy entry and falling through on error. The degraded tail always
/// succeeds, so `transcribe` itself only fails on unreadable input or
/// cancellation.
pub struct AudioOrchestrator {
    chain: Vec<Arc<dyn Transcriber>>,
    monitor: Arc<HealthMonitor>,
    shutdown: CancellationToken,
    checkers: Vec<JoinHandle<()>>,
}

impl AudioOrchestrator {
    /// Build the chain from configuration and start one health checker
    /// per transcriber. A degraded tail is appended when the config does
    /// not end with one.
    pub fn from_config(config: &AudioConfig) -> Self {
        let mut chain: Vec<Arc<dyn Transcriber>> = config
            .chain
            .iter()
            .map(|entry| match entry {
                TranscriberConfig::Remote { base_url } => {
                    Arc::new(RemoteTranscriber::new(base_url.clone())) as Arc<dyn Transcriber>
                }
                TranscriberConfig::Local { binary } => {
                    Arc::new(LocalTranscriber::new(binary.clone())) as Arc<dyn Transcriber>
                }
                TranscriberConfig::Degraded => {
                    Arc::new(DegradedTranscriber::new()) as Arc<dyn Transcriber>
                }
            })
            .collect();
        if !matches!(config.chain.last(), Some(TranscriberConfig::Degraded)) {
            chain.push(Arc::new(DegradedTranscriber::new()));
        }

        let monitor = Arc::new(HealthMonitor::new(config.health.fail_threshold));
        let shutdown = CancellationToken::new();
        let checkers = chain
            .iter()
            .map(|transcriber| {
                monitor.spawn_checker(
                    Arc::clone(transcriber),
                    Duration::from_secs(config.health.interval_seconds),
                    Duration::from_secs(config.health.check_timeout_seconds),
                    shutdown.clone(),
                )
            })
            .collect();

        Self {
            chain,
            monitor,
            shutdown,
            checkers,
        }
    }

    /// Chain without background checkers, for direct composition in
    /// tests.
    pub fn with_chain(chain: Vec<Arc<dyn Transcriber>>, monitor: Arc<HealthMonitor>) -> Self {
        Self {
            chain,
            monitor,
            shutdown: CancellationToken::new(),
            checkers: Vec::new(),
        }
    }

    /// Copy of the per-transcriber health map.
    pub async fn health(&self) -> HashMap<String, TranscriberHealth> {
        self.monitor.snapshot().await
    }

    /// Stop the background health checkers.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Transcribe one audio file, walking the chain in priority order.
    ///
    /// Unhealthy entries are skipped (except the final fallback, which is
    /// always attempted); an attempt that errors is recorded against the
    /// transcriber's health and the walk continues. The caller's
    /// cancellation token is honoured between and inside attempts.
    pub async fn transcribe(
        &self,
        cancel: &CancellationToken,
        wav_path: &Path,
        options: &TranscriptionOptions,
    ) -> CoreResult<TranscriptionResult> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        // Only upstream I/O errors surface from this call: an unreadable
        // input fails before the chain walk starts.
        tokio::fs::metadata(wav_path).await?;

        let last = self.chain.len().saturating_sub(1);
        for (index, transcriber) in self.chain.iter().enumerate() {
            let name = transcriber.name();
            if index != last && !self.monitor.is_healthy(name).await {
                info!(transcriber = name, "skipping unhealthy transcriber");
                continue;
            }

            let attempt = tokio::select! {
                _ = cancel.cancelled() => return Err(CoreError::Cancelled),
                outcome = transcriber.transcribe(wav_path, options) => outcome,
            };

            match attempt {
                Ok(result) => {
                    info!(transcriber = name, "transcription complete");
                    return Ok(result);
                }
                Err(e) => {
                    warn!(transcriber = name, error = %e, "transcriber failed, trying next");
                    self.monitor.record(name, Err(e.to_string())).await;
                }
            }
        }

        // Unreachable with a degraded tail in place; kept for a chain
        // misconfigured to be empty.
        Err(CoreError::TranscriberUnavailable(
            "transcriber chain exhausted".to_string(),
        ))
    }

    /// Transcribe a meeting recording and persist the transcript through
    /// the document store (append to the meeting's `polish` slot). An
    /// empty (degraded) transcript is returned but not persisted.
    pub async fn transcribe_meeting(
        &self,
        store: &DocStore,
        meeting_id: &str,
        cancel: &CancellationToken,
        wav_path: &Path,
        options: &TranscriptionOptions,
        user: &str,
        source: ChunkSource,
    ) -> CoreResult<(TranscriptionResult, Option<AppendOutcome>)> {
        let result = self.transcribe(cancel, wav_path, options).await?;
        if result.text.is_empty() {
            return Ok((result, None));
        }

        let doc = DocRef::new(
            DocumentScope::Meeting {
                meeting_id: meeting_id.to_string(),
            },
            Slot::Polish,
        )?;
        let mut content = result.text.clone();
        if !content.ends_with('\n') {
            content.push('\n');
        }
        let outcome = store
            .append(&doc, AppendRequest::append(content, user, source))
            .await?;
        Ok((result, Some(outcome)))
    }

    /// Number of chain entries (including the enforced degraded tail).
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }
}

impl Drop for AudioOrchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
        for checker in &self.checkers {
            checker.abort();
        }
    }
}
