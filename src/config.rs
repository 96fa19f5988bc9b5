// ==============================================================================
// config.rs - Gateway Configuration
// ==============================================================================
// Description: Environment-driven settings for the gateway and its
//              processing service client
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

/// Room for the multipart text fields on top of the archive
const FORM_FIELD_ALLOWANCE: usize = 64 * 1024;

/// Gateway settings
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the gateway listens on
    pub port: u16,

    /// Base URL of the processing service (no trailing slash)
    pub processing_url: String,

    /// Shared secret sent as `X-API-Key` on every processing call
    pub processing_api_key: Option<String>,

    /// Timeout for `POST /params`
    pub params_timeout: Duration,

    /// Timeout for `POST /upload/zip`
    pub upload_timeout: Duration,

    /// `POST /augment/smote`: deadline for response headers, then idle limit between chunks
    pub augment_timeout: Duration,

    /// Largest accepted archive in bytes
    pub max_upload_bytes: usize,

    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            processing_url: "http://localhost:8080".to_string(),
            processing_api_key: None,
            params_timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(60),
            augment_timeout: Duration::from_secs(300),
            max_upload_bytes: 100 * 1024 * 1024,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Missing variables fall back to defaults; present but unparsable
    /// numeric values are an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = parse_var(&lookup, "PORT")?.unwrap_or(defaults.port);

        let processing_url = lookup("PROCESSING_SERVER_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.processing_url);

        let processing_api_key =
            lookup("PROCESSING_API_KEY").filter(|key| !key.trim().is_empty());

        let params_timeout = parse_var::<u64, _>(&lookup, "PARAMS_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.params_timeout);
        let upload_timeout = parse_var::<u64, _>(&lookup, "UPLOAD_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.upload_timeout);
        let augment_timeout = parse_var::<u64, _>(&lookup, "AUGMENT_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.augment_timeout);

        let max_upload_bytes = match parse_var::<usize, _>(&lookup, "MAX_UPLOAD_MB")? {
            Some(mb) => mb
                .checked_mul(1024 * 1024)
                .filter(|bytes| bytes.checked_add(FORM_FIELD_ALLOWANCE).is_some())
                .with_context(|| format!("MAX_UPLOAD_MB is too large: {}", mb))?,
            None => defaults.max_upload_bytes,
        };

        // Example: CORS_ALLOWED_ORIGINS=https://app.example.com,http://localhost:3000
        let cors_origins = lookup("CORS_ALLOWED_ORIGINS")
            .map(|origins| parse_origins(&origins))
            .unwrap_or(defaults.cors_origins);

        Ok(Self {
            port,
            processing_url,
            processing_api_key,
            params_timeout,
            upload_timeout,
            augment_timeout,
            max_upload_bytes,
            cors_origins,
        })
    }

    /// Body limit for the upload route: archive plus room for the text fields.
    pub fn body_limit(&self) -> usize {
        self.max_upload_bytes.saturating_add(FORM_FIELD_ALLOWANCE)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(None),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_increase_per_phase() {
        let config = Config::default();
        assert!(config.params_timeout < config.upload_timeout);
        assert!(config.upload_timeout < config.augment_timeout);
        assert_eq!(config.max_upload_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins(" https://a.example.com, ,http://localhost:3000 "),
            vec!["https://a.example.com", "http://localhost:3000"]
        );
    }

    #[test]
    fn test_body_limit_covers_archive() {
        let config = Config::default();
        assert!(config.body_limit() > config.max_upload_bytes);
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_lookup_overrides_defaults() {
        let config = Config::from_lookup(vars(&[
            ("PORT", "8000"),
            ("PROCESSING_SERVER_URL", "http://processing:9000/"),
            ("PROCESSING_API_KEY", "secret"),
            ("AUGMENT_TIMEOUT_SECS", " 600 "),
            ("MAX_UPLOAD_MB", "10"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8000);
        assert_eq!(config.processing_url, "http://processing:9000");
        assert_eq!(config.processing_api_key.as_deref(), Some("secret"));
        assert_eq!(config.augment_timeout, Duration::from_secs(600));
        assert_eq!(config.params_timeout, Duration::from_secs(30));
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_empty_lookup_gives_defaults() {
        let config = Config::from_lookup(vars(&[("PROCESSING_API_KEY", "  ")])).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.processing_api_key, None);
        assert_eq!(config.cors_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    fn test_unparsable_number_is_error() {
        let err = Config::from_lookup(vars(&[("UPLOAD_TIMEOUT_SECS", "sixty")])).unwrap_err();
        assert!(err.to_string().contains("UPLOAD_TIMEOUT_SECS"));

        assert!(Config::from_lookup(vars(&[("PORT", "70000")])).is_err());
    }

    #[test]
    fn test_oversized_upload_limit_is_error() {
        let max = usize::MAX.to_string();
        let err = Config::from_lookup(vars(&[("MAX_UPLOAD_MB", max.as_str())])).unwrap_err();
        assert!(err.to_string().contains("MAX_UPLOAD_MB"));
    }

    #[test]
    fn test_body_limit_saturates() {
        let config = Config {
            max_upload_bytes: usize::MAX,
            ..Config::default()
        };
        assert_eq!(config.body_limit(), usize::MAX);
    }
}
