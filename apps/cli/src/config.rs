use std::{collections::HashMap, fs, path::Path};

use anyhow::{bail, Context};
use client_core::FinalizeLimits;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "marketplace.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub no_match_base_url: String,
    pub finalize_top_k: u32,
    pub finalize_top_n: u32,
}

impl Default for Settings {
    fn default() -> Self {
        let limits = FinalizeLimits::default();
        Self {
            api_base_url: "http://localhost:8000/api/v1".into(),
            no_match_base_url: "http://localhost:3000/api/no-match".into(),
            finalize_top_k: limits.top_k,
            finalize_top_n: limits.top_n,
        }
    }
}

impl Settings {
    pub fn finalize_limits(&self) -> FinalizeLimits {
        FinalizeLimits {
            top_k: self.finalize_top_k,
            top_n: self.finalize_top_n,
        }
    }
}

pub fn load_settings(config_path: &Path) -> Settings {
    load_settings_from(config_path, |key| std::env::var(key).ok())
}

pub fn load_settings_from(config_path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(config_path) {
        match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, &file_cfg),
            Err(err) => tracing::warn!(
                path = %config_path.display(),
                error = %err,
                "ignoring unreadable config file"
            ),
        }
    }

    if let Some(v) = env("MARKETPLACE_API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = env("MARKETPLACE_NO_MATCH_BASE_URL") {
        settings.no_match_base_url = v;
    }
    if let Some(v) = env("APP__NO_MATCH_BASE_URL") {
        settings.no_match_base_url = v;
    }

    if let Some(parsed) = env("APP__FINALIZE_TOP_K").and_then(|v| v.parse::<u32>().ok()) {
        settings.finalize_top_k = parsed;
    }
    if let Some(parsed) = env("APP__FINALIZE_TOP_N").and_then(|v| v.parse::<u32>().ok()) {
        settings.finalize_top_n = parsed;
    }

    settings
}

fn apply_file(settings: &mut Settings, file_cfg: &HashMap<String, toml::Value>) {
    if let Some(v) = file_cfg.get("api_base_url").and_then(toml::Value::as_str) {
        settings.api_base_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("no_match_base_url").and_then(toml::Value::as_str) {
        settings.no_match_base_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("finalize_top_k").and_then(as_count) {
        settings.finalize_top_k = v;
    }
    if let Some(v) = file_cfg.get("finalize_top_n").and_then(as_count) {
        settings.finalize_top_n = v;
    }
}

fn as_count(value: &toml::Value) -> Option<u32> {
    match value {
        toml::Value::Integer(v) => u32::try_from(*v).ok(),
        toml::Value::String(v) => v.parse().ok(),
        _ => None,
    }
}

/// Trims whitespace and trailing slashes, then checks the result is an http(s) URL.
pub fn normalize_base_url(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        bail!("base url is empty");
    }

    let parsed = Url::parse(trimmed).with_context(|| format!("invalid base url '{trimmed}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("unsupported scheme '{}' in base url '{trimmed}'", parsed.scheme());
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
