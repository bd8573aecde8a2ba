// Copyright 2026 The Thinkgate Project
// SPDX-License-Identifier: Apache-2.0

// Model name resolution
//
// Clients send OpenAI-style model names; the backend serves its own
// catalog. Resolution order:
//   1. Exact match in the configured alias table
//   2. Heuristic: names containing "gpt-4" or "405b" map to the large
//      fallback model
//   3. Everything else maps to the small default model

use std::collections::HashMap;

/// Default alias table. Overridable via the `models.map` config section.
pub fn default_model_map() -> HashMap<String, String> {
    HashMap::from([
        ("gpt-4o".to_string(), "llama-3.1-405b-instruct".to_string()),
        (
            "gpt-4o-mini".to_string(),
            "llama-3.1-8b-instruct".to_string(),
        ),
        (
            "gpt-3.5-turbo".to_string(),
            "llama-3.1-8b-instruct".to_string(),
        ),
        ("deepseek-r1".to_string(), "deepseek-r1".to_string()),
    ])
}

pub const DEFAULT_FALLBACK_LARGE: &str = "llama-3.1-405b-instruct";
pub const DEFAULT_FALLBACK_SMALL: &str = "llama-3.1-8b-instruct";

/// Maps inbound model identifiers to backend model identifiers.
#[derive(Debug, Clone)]
pub struct ModelResolver {
    map: HashMap<String, String>,
    fallback_large: String,
    fallback_small: String,
}

impl ModelResolver {
    pub fn new(
        map: HashMap<String, String>,
        fallback_large: impl Into<String>,
        fallback_small: impl Into<String>,
    ) -> Self {
        Self {
            map,
            fallback_large: fallback_large.into(),
            fallback_small: fallback_small.into(),
        }
    }

    /// Resolve an inbound model name to a backend model name.
    pub fn resolve(&self, requested: &str) -> &str {
        if let Some(backend) = self.map.get(requested) {
            return backend;
        }
        // Size heuristic for unlisted names.
        if requested.contains("gpt-4") || requested.contains("405b") {
            &self.fallback_large
        } else {
            &self.fallback_small
        }
    }

    /// Inbound names accepted via the exact table, for `GET /v1/models`.
    /// Sorted so the listing is stable across restarts.
    pub fn listed_models(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.map.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ModelResolver {
    fn default() -> Self {
        Self::new(
            default_model_map(),
            DEFAULT_FALLBACK_LARGE,
            DEFAULT_FALLBACK_SMALL,
        )
    }
}
