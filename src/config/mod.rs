// Copyright 2026 The Thinkgate Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads thinkgate.yaml, validates structure, applies defaults, and
// computes a deterministic config hash for log correlation.

use std::collections::HashMap;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::models::{default_model_map, DEFAULT_FALLBACK_LARGE, DEFAULT_FALLBACK_SMALL};
use crate::stream::ReasoningDisplay;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// All errors that can occur during config loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config source: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// ConfigSource trait
// ---------------------------------------------------------------------------

/// Abstraction over where config YAML comes from.
///
/// `FileSource` reads from disk; `StringSource` provides content directly
/// (used in tests to avoid file I/O).
pub trait ConfigSource {
    fn load(&self) -> Result<String, ConfigError>;
}

/// Loads config from a file on disk.
pub struct FileSource {
    pub path: PathBuf,
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<String, ConfigError> {
        Ok(std::fs::read_to_string(&self.path)?)
    }
}

/// Provides config content directly as a string. Used for testing.
pub struct StringSource {
    pub content: String,
}

impl ConfigSource for StringSource {
    fn load(&self) -> Result<String, ConfigError> {
        Ok(self.content.clone())
    }
}

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

/// Fully validated gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub version: String,
    pub upstream: UpstreamConfig,
    pub reasoning: ReasoningConfig,
    pub models: ModelsConfig,
    /// SHA-256 of the raw YAML, for correlating logs with a deployment.
    pub config_hash: String,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the OpenAI-compatible reasoning backend.
    pub base_url: String,
    /// Optional bearer token. When set it replaces the client's
    /// Authorization header on forwarded requests.
    pub api_key: Option<String>,
    /// Connection-level timeout for the outbound call.
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    /// Deployment-level display policy. Kept out of the request surface
    /// for now; could be promoted to a per-request parameter later.
    pub display: ReasoningDisplay,
}

#[derive(Debug, Clone)]
pub struct ModelsConfig {
    pub map: HashMap<String, String>,
    pub fallback_large: String,
    pub fallback_small: String,
}

// ---------------------------------------------------------------------------
// Raw YAML deserialization types (internal)
// ---------------------------------------------------------------------------
// Separate from the public Config structs: serde_yaml needs Deserialize,
// and defaults/validation run between raw and public.

mod raw {
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Deserialize)]
    pub struct RawConfig {
        pub thinkgate: String,
        pub upstream: Option<RawUpstream>,
        pub reasoning: Option<RawReasoning>,
        pub models: Option<RawModels>,
    }

    #[derive(Debug, Deserialize)]
    pub struct RawUpstream {
        pub base_url: Option<String>,
        pub api_key: Option<String>,
        pub timeout_ms: Option<u64>,
    }

    #[derive(Debug, Deserialize)]
    pub struct RawReasoning {
        pub display: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct RawModels {
        #[serde(default)]
        pub map: HashMap<String, String>,
        pub fallback_large: Option<String>,
        pub fallback_small: Option<String>,
        /// If false, skip embedding the default alias table. Default: true.
        pub use_default_map: Option<bool>,
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "http://127.0.0.1:11434";

/// Load and validate a thinkgate config from the given source.
///
/// Steps:
/// 1. Read raw YAML bytes from source
/// 2. Compute SHA256 config hash
/// 3. Parse YAML into raw deserialization types
/// 4. Validate version and enumerated fields
/// 5. Apply defaults and build the typed Config
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let config_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.thinkgate != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported config version \"{}\", expected \"v1\"",
            raw.thinkgate
        )));
    }

    let upstream = {
        let r = raw.upstream;
        UpstreamConfig {
            base_url: r
                .as_ref()
                .and_then(|u| u.base_url.clone())
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_UPSTREAM_BASE_URL.to_string()),
            api_key: r.as_ref().and_then(|u| u.api_key.clone()),
            timeout_ms: r.as_ref().and_then(|u| u.timeout_ms),
        }
    };

    let display = match raw
        .reasoning
        .and_then(|r| r.display)
        .as_deref()
        .unwrap_or("show")
    {
        "show" => ReasoningDisplay::Show,
        "hide" => ReasoningDisplay::Hide,
        other => {
            return Err(ConfigError::Validation(format!(
                "reasoning.display must be \"show\" or \"hide\", got \"{other}\""
            )))
        }
    };

    let models = build_models_config(raw.models);

    Ok(Config {
        version: raw.thinkgate,
        upstream,
        reasoning: ReasoningConfig { display },
        models,
        config_hash,
    })
}

fn build_models_config(raw: Option<raw::RawModels>) -> ModelsConfig {
    let raw = match raw {
        Some(r) => r,
        None => {
            return ModelsConfig {
                map: default_model_map(),
                fallback_large: DEFAULT_FALLBACK_LARGE.to_string(),
                fallback_small: DEFAULT_FALLBACK_SMALL.to_string(),
            }
        }
    };

    // Defaults first, then user aliases (user entries override defaults).
    let mut map = if raw.use_default_map != Some(false) {
        default_model_map()
    } else {
        HashMap::new()
    };
    map.extend(raw.map);

    ModelsConfig {
        map,
        fallback_large: raw
            .fallback_large
            .unwrap_or_else(|| DEFAULT_FALLBACK_LARGE.to_string()),
        fallback_small: raw
            .fallback_small
            .unwrap_or_else(|| DEFAULT_FALLBACK_SMALL.to_string()),
    }
}

/// SHA-256 hex digest of the raw config text.
fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
