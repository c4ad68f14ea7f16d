//! Local process transcriber.
//!
//! Invokes a CLI binary as
//! `transcribe <model> <audio> --format json [--language X]
//! [--temperature T] [--prompt P]` and parses the stream of JSON objects
//! it writes to stdout: segment objects as they are decoded, plus an
//! optional summary object carrying `language` and `duration`.

use super::traits::{Transcriber, TranscriptSegment, TranscriptionOptions, TranscriptionResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Wraps a local transcription binary.
pub struct LocalTranscriber {
    binary: PathBuf,
}

impl LocalTranscriber {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }
}

#[async_trait]
impl Transcriber for LocalTranscriber {
    async fn transcribe(
        &self,
        wav_path: &Path,
        options: &TranscriptionOptions,
    ) -> Result<TranscriptionResult> {
        let mut command = Command::new(&self.binary);
        command
            .arg("transcribe")
            .arg(&options.model)
            .arg(wav_path)
            .arg("--format")
            .arg("json");
        if let Some(ref language) = options.language {
            command.arg("--language").arg(language);
        }
        if options.temperature != 0.0 {
            command.arg("--temperature").arg(options.temperature.to_string());
        }
        if let Some(ref prompt) = options.prompt {
            command.arg("--prompt").arg(prompt);
        }
        command.kill_on_drop(true);

        debug!(binary = %self.binary.display(), audio = %wav_path.display(), "invoking local transcriber");

        let output = tokio::time::timeout(options.timeout, command.output())
            .await
            .map_err(|_| anyhow::anyhow!("local transcriber timed out"))?
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "local transcriber exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8(output.stdout).context("non-UTF-8 transcriber output")?;
        parse_json_stream(&stdout)
    }

    async fn health_check(&self) -> Result<()> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;
        if !output.status.success() {
            anyhow::bail!("local transcriber --version exited with {}", output.status);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Fold a stream of JSON objects into one result. Objects carrying
/// `start`/`end`/`text` are segments; `language` and `duration` are taken
/// from whichever object carries them last.
fn parse_json_stream(stdout: &str) -> Result<TranscriptionResult> {
    let mut result = TranscriptionResult::default();

    for value in serde_json::Deserializer::from_str(stdout).into_iter::<Value>() {
        let value = value.context("malformed JSON object in transcriber output")?;
        let object = match value.as_object() {
            Some(o) => o,
            None => continue,
        };

        if object.contains_key("start") && object.contains_key("text") {
            let segment = TranscriptSegment {
                id: object.get("id").and_then(Value::as_u64).unwrap_or(0) as u32,
                start: object.get("start").and_then(Value::as_f64).unwrap_or(0.0),
                end: object.get("end").and_then(Value::as_f64).unwrap_or(0.0),
                text: object
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            };
            result.text.push_str(&segment.text);
            result.segments.push(segment);
            continue;
        }

        if let Some(language) = object.get("language").and_then(Value::as_str) {
            result.language = Some(language.to_string());
        }
        if let Some(duration) = object.get("duration").and_then(Value::as_f64) {
            result.duration = duration;
        }
        // a summary object may carry the full text too
        if let Some(text) = object.get("text").and_then(Value::as_str) {
            result.text = text.to_string();
        }
    }

    Ok(result)
}
