//! Application configuration.
//!
//! Configuration is loaded from a YAML file (path via `--config` or the
//! `GOVERNOR_CONFIG` env var) with env-var overrides for the common knobs.
//! Missing required values fail startup with a single diagnostic.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listen address, e.g. `0.0.0.0:8080`
    #[serde(default = "HttpConfig::default_listen")]
    pub listen: String,
    /// Optional TLS certificate path (PEM)
    #[serde(default)]
    pub tls_cert: Option<PathBuf>,
    /// Optional TLS key path (PEM)
    #[serde(default)]
    pub tls_key: Option<PathBuf>,
}

impl HttpConfig {
    fn default_listen() -> String {
        "0.0.0.0:8080".into()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: Self::default_listen(),
            tls_cert: None,
            tls_key: None,
        }
    }
}

/// JWT settings. Verification itself happens upstream; the secret is used
/// to decode the bearer subject recorded on chunks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwtConfig {
    #[serde(default)]
    pub secret: Option<String>,
}

/// CORS settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins; empty means allow any (development default).
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// One entry in the ordered transcriber chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriberConfig {
    /// Remote whisper-compatible HTTP service.
    Remote {
        /// Base URL, e.g. `http://localhost:9000`
        base_url: String,
    },
    /// Local CLI binary invoked per request.
    Local {
        /// Path to the transcription binary
        binary: PathBuf,
    },
    /// Always-last no-op fallback.
    Degraded,
}

/// Health checking knobs for the transcriber chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioHealthConfig {
    #[serde(default = "AudioHealthConfig::default_interval")]
    pub interval_seconds: u64,
    #[serde(default = "AudioHealthConfig::default_threshold")]
    pub fail_threshold: u32,
    #[serde(default = "AudioHealthConfig::default_check_timeout")]
    pub check_timeout_seconds: u64,
}

impl AudioHealthConfig {
    fn default_interval() -> u64 {
        300
    }
    fn default_threshold() -> u32 {
        3
    }
    fn default_check_timeout() -> u64 {
        10
    }
}

impl Default for AudioHealthConfig {
    fn default() -> Self {
        Self {
            interval_seconds: Self::default_interval(),
            fail_threshold: Self::default_threshold(),
            check_timeout_seconds: Self::default_check_timeout(),
        }
    }
}

/// Audio subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Ordered priority chain. The degraded transcriber is appended
    /// automatically when absent so the chain always has a tail.
    #[serde(default)]
    pub chain: Vec<TranscriberConfig>,
    #[serde(default)]
    pub health: AudioHealthConfig,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            chain: vec![TranscriberConfig::Degraded],
            health: AudioHealthConfig::default(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Filesystem root for all governed documents.
    pub data_root: PathBuf,
    /// Subdirectory of `data_root` holding project trees.
    #[serde(default = "Config::default_projects_dir")]
    pub projects_dir: String,
    /// Subdirectory of `data_root` holding meeting trees.
    #[serde(default = "Config::default_meetings_dir")]
    pub meetings_dir: String,
    /// Directory of static `*.prompt.md` templates shipped with the product.
    #[serde(default)]
    pub prompts_dir: Option<PathBuf>,
    /// TTL for the prompt caches, in minutes.
    #[serde(default = "Config::default_prompts_ttl")]
    pub prompts_cache_ttl_minutes: u64,
    /// Optional HTTP port for the MCP front-end (stdio is the default).
    #[serde(default)]
    pub mcp_http_port: Option<u16>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

impl Config {
    fn default_projects_dir() -> String {
        "projects".into()
    }

    fn default_meetings_dir() -> String {
        "meetings".into()
    }

    fn default_prompts_ttl() -> u64 {
        15
    }

    /// Load configuration from a YAML file, then apply env overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration purely from environment variables. Used when
    /// no config file is given (tests, containers).
    pub fn from_env() -> Result<Self> {
        let data_root = std::env::var("GOVERNOR_DATA_ROOT")
            .context("GOVERNOR_DATA_ROOT is required when no config file is given")?;
        let mut config = Config {
            data_root: PathBuf::from(data_root),
            projects_dir: Self::default_projects_dir(),
            meetings_dir: Self::default_meetings_dir(),
            prompts_dir: None,
            prompts_cache_ttl_minutes: Self::default_prompts_ttl(),
            mcp_http_port: None,
            http: HttpConfig::default(),
            jwt: JwtConfig::default(),
            cors: CorsConfig::default(),
            audio: AudioConfig::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("GOVERNOR_DATA_ROOT") {
            self.data_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("GOVERNOR_HTTP_LISTEN") {
            self.http.listen = v;
        }
        if let Ok(v) = std::env::var("GOVERNOR_JWT_SECRET") {
            self.jwt.secret = Some(v);
        }
        if let Ok(v) = std::env::var("GOVERNOR_PROMPTS_DIR") {
            self.prompts_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("GOVERNOR_PROMPTS_CACHE_TTL_MINUTES") {
            if let Ok(minutes) = v.parse() {
                self.prompts_cache_ttl_minutes = minutes;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.data_root.as_os_str().is_empty() {
            bail!("config: data_root must not be empty");
        }
        if self.http.tls_cert.is_some() != self.http.tls_key.is_some() {
            bail!("config: http.tls_cert and http.tls_key must be set together");
        }
        Ok(())
    }

    /// Root directory for project trees.
    pub fn projects_root(&self) -> PathBuf {
        self.data_root.join(&self.projects_dir)
    }

    /// Root directory for meeting trees.
    pub fn meetings_root(&self) -> PathBuf {
        self.data_root.join(&self.meetings_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = "data_root: /var/lib/governor\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.data_root, PathBuf::from("/var/lib/governor"));
        assert_eq!(config.projects_dir, "projects");
        assert_eq!(config.meetings_dir, "meetings");
        assert_eq!(config.prompts_cache_ttl_minutes, 15);
        assert_eq!(config.http.listen, "0.0.0.0:8080");
        assert_eq!(config.audio.health.interval_seconds, 300);
        assert_eq!(config.audio.health.fail_threshold, 3);
    }

    #[test]
    fn test_parse_audio_chain() {
        let yaml = r#"
data_root: /data
audio:
  chain:
    - kind: remote
      base_url: http://localhost:9000
    - kind: local
      binary: /usr/bin/whisper-cli
    - kind: degraded
  health:
    interval_seconds: 60
    fail_threshold: 2
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.audio.chain.len(), 3);
        assert!(matches!(
            config.audio.chain[0],
            TranscriberConfig::Remote { .. }
        ));
        assert!(matches!(config.audio.chain[2], TranscriberConfig::Degraded));
        assert_eq!(config.audio.health.interval_seconds, 60);
    }

    #[test]
    fn test_tls_must_be_paired() {
        let config = Config {
            data_root: PathBuf::from("/data"),
            projects_dir: "projects".into(),
            meetings_dir: "meetings".into(),
            prompts_dir: None,
            prompts_cache_ttl_minutes: 15,
            mcp_http_port: None,
            http: HttpConfig {
                listen: "0.0.0.0:8080".into(),
                tls_cert: Some(PathBuf::from("/tls/cert.pem")),
                tls_key: None,
            },
            jwt: JwtConfig::default(),
            cors: CorsConfig::default(),
            audio: AudioConfig::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scope_roots() {
        let yaml = "data_root: /data\nprojects_dir: p\nmeetings_dir: m\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.projects_root(), PathBuf::from("/data/p"));
        assert_eq!(config.meetings_root(), PathBuf::from("/data/m"));
    }
}
