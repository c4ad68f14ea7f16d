//! Audio transcription orchestration.
//!
//! A health-probed chain of transcribers: a remote whisper-compatible
//! HTTP service, a local CLI wrapper, and a degraded no-op tail that
//! always succeeds. The orchestrator walks the chain in priority order,
//! propagating the caller's cancellation into every attempt, and persists
//! transcripts through the document store.

pub mod degraded;
pub mod health;
pub mod local;
pub mod orchestrator;
pub mod remote;
pub mod traits;

pub use degraded::DegradedTranscriber;
pub use health::HealthMonitor;
pub use local::LocalTranscriber;
pub use orchestrator::AudioOrchestrator;
pub use remote::RemoteTranscriber;
pub use traits::{
    Transcriber, TranscriberHealth, TranscriptSegment, TranscriptionOptions, TranscriptionResult,
};
