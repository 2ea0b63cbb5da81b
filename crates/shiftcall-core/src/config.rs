//! Application configuration.
//!
//! Follows the nested-section pattern of `CallCenterConfig`: one top-level
//! struct grouping a small config struct per subsystem, all `Serialize` +
//! `Deserialize` so the whole tree can round-trip through TOML, with a
//! `Default` impl providing sane values for local development and tests.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{OrchestratorError, Result};

/// Root configuration tree for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub telephony: TelephonyConfig,
    pub store: StoreConfig,
    pub cascade: CascadeConfig,
    pub recording: RecordingConfig,
    pub catalog: CatalogConfig,
    pub gateway: GatewayConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply `SHIFTCALL_`-prefixed
    /// environment variable overrides for the handful of secrets that should
    /// never live in a checked-in file (credentials, API keys).
    ///
    /// Deliberately a plain function over a builder rather than a generic
    /// layered-config crate: the set of overridable fields is small and
    /// fixed, so a declarative mapping would only add indirection.
    pub fn from_file_and_env(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| OrchestratorError::config(format!("reading {}: {e}", path.display())))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .map_err(|e| OrchestratorError::config(format!("parsing {}: {e}", path.display())))?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SHIFTCALL_CATALOG_API_KEY") {
            self.catalog.api_key = v;
        }
        if let Ok(v) = std::env::var("SHIFTCALL_GATEWAY_API_KEY") {
            self.gateway.api_key = v;
        }
        if let Ok(v) = std::env::var("SHIFTCALL_OBJECT_STORE_BUCKET") {
            self.recording.bucket = v;
        }
        if let Ok(v) = std::env::var("SHIFTCALL_REDIS_URL") {
            self.store.redis_url = v;
        }
        if let Ok(v) = std::env::var("SHIFTCALL_PUBLIC_BASE_DOMAIN") {
            self.general.public_base_domain = v;
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            telephony: TelephonyConfig::default(),
            store: StoreConfig::default(),
            cascade: CascadeConfig::default(),
            recording: RecordingConfig::default(),
            catalog: CatalogConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Deployment-wide settings not specific to one subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Public domain the telephony carrier uses to reach our webhooks.
    pub public_base_domain: String,
    /// Fallback transfer number when no provider-specific one is configured.
    pub default_transfer_fallback_number: String,
    /// Idle session TTL; matches the default in
    pub session_idle_timeout: Duration,
    /// Feature flags
    pub voice_ai_enabled: bool,
    pub recording_enabled: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            public_base_domain: "calls.example.com".to_string(),
            default_transfer_fallback_number: "+10000000000".to_string(),
            session_idle_timeout: Duration::from_secs(3600),
            voice_ai_enabled: true,
            recording_enabled: true,
        }
    }
}

/// Telephony adapter / media I/O settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    pub listen_addr: String,
    pub carrier_api_base_url: String,
    pub carrier_account_sid: String,
    pub carrier_auth_token: String,
    /// Originating number for outbound voice-offer calls.
    pub voice_from_number: String,
    /// DTMF gather timeout: default 8s, reset on each digit.
    pub dtmf_gather_timeout: Duration,
    /// Default PIN length
    pub pin_length: usize,
    /// Max attempts per FSM phase before giving up
    pub max_attempts_per_phase: u32,
    /// Shift-list pagination page size
    pub shift_list_page_size: usize,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            carrier_api_base_url: "https://carrier.example.internal/2010-04-01".to_string(),
            carrier_account_sid: String::new(),
            carrier_auth_token: String::new(),
            voice_from_number: String::new(),
            dtmf_gather_timeout: Duration::from_secs(8),
            pin_length: 4,
            max_attempts_per_phase: 3,
            shift_list_page_size: 3,
        }
    }
}

/// Call-state store / event stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub redis_url: String,
    /// Default session TTL: 3600s.
    pub session_ttl: Duration,
    /// Event stream TTL: ~25h.
    pub event_stream_ttl: Duration,
    /// Catalog cache TTL: 60s.
    pub catalog_cache_ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1/".to_string(),
            session_ttl: Duration::from_secs(3600),
            event_stream_ttl: Duration::from_secs(25 * 3600),
            catalog_cache_ttl: Duration::from_secs(60),
        }
    }
}

/// Notification cascade settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
/// Max sequential voice-offer rounds across the pool
    pub max_voice_rounds: u32,
    /// Per-attempt voice-offer timeout: default 30s.
    pub voice_offer_timeout: Duration,
    /// Transient-send retry policy: 3 retries, base 500ms, factor 2, max 8s.
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_backoff_factor: f64,
    pub retry_max_delay: Duration,
    /// How often the queue-poll loop checks for due jobs.
    pub poll_interval: Duration,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            max_voice_rounds: 2,
            voice_offer_timeout: Duration::from_secs(30),
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_backoff_factor: 2.0,
            retry_max_delay: Duration::from_secs(8),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Recording pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    pub bucket: String,
    pub key_prefix: String,
    pub region: String,
    /// Grace period waiting for the carrier to finalize the asset
    pub finalize_grace_period: Duration,
    /// Presigned URL validity: default 7 days.
    pub presigned_url_validity: Duration,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            bucket: "shiftcall-recordings".to_string(),
            key_prefix: "recordings".to_string(),
            region: "us-east-1".to_string(),
            finalize_grace_period: Duration::from_secs(3),
            presigned_url_validity: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Record-system (catalog) client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub base_url: String,
    pub base_id: String,
    pub api_key: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://catalog.example.internal".to_string(),
            base_id: String::new(),
            api_key: String::new(),
        }
    }
}

/// Text-message gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub from_number: String,
    pub service_id: String,
    pub api_key: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gateway.example.internal".to_string(),
            from_number: String::new(),
            service_id: String::new(),
            api_key: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = AppConfig::default();
        let toml_text = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_text).unwrap();
        assert_eq!(parsed.general.public_base_domain, config.general.public_base_domain);
        assert_eq!(parsed.cascade.max_voice_rounds, config.cascade.max_voice_rounds);
    }

    #[test]
    fn env_overrides_apply_on_top_of_file_values() {
        std::env::set_var("SHIFTCALL_PUBLIC_BASE_DOMAIN", "override.example.com");
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.general.public_base_domain, "override.example.com");
        std::env::remove_var("SHIFTCALL_PUBLIC_BASE_DOMAIN");
    }
}
