//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested keys use
//! `__`, e.g. `GENERATION__API_KEY` or `CREDITS__REFUND_POLICY`.

use crate::payment::PaymentConfig;
use kelasi_ai::LlmBackendConfig;
use kelasi_content::QuizLimits;
use kelasi_generation::{RefundPolicy, Settings};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Origin used to build share links, e.g. `https://kelasi.app`.
    #[serde(default = "default_public_origin")]
    pub public_origin: String,

    /// Generation backend configuration.
    pub generation: GenerationConfig,

    /// Quiz request limits.
    #[serde(default)]
    pub quiz: QuizLimits,

    /// Credit metering configuration.
    #[serde(default)]
    pub credits: CreditsConfig,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Payment gateway configuration. Payments are refused without it.
    #[serde(default)]
    pub payment: Option<PaymentConfig>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_public_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Generation backend configuration.
#[derive(Clone, Deserialize)]
pub struct GenerationConfig {
    /// API key for the Generative Language API.
    pub api_key: String,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// How long a generation may take, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Language code generated content is written in.
    #[serde(default = "default_language")]
    pub language: String,
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("language", &self.language)
            .finish()
    }
}

fn default_model() -> String {
    "gemini-1.5-flash-latest".to_string()
}

fn default_base_url() -> String {
    LlmBackendConfig::GEMINI_BASE_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    120
}

pub(crate) fn default_language() -> String {
    "fr".to_string()
}

impl GenerationConfig {
    /// Backend configuration for these settings.
    #[must_use]
    pub fn backend_config(&self) -> LlmBackendConfig {
        LlmBackendConfig::gemini(self.api_key.clone(), self.model.clone())
            .with_base_url(self.base_url.clone())
            .with_timeout_seconds(self.timeout_seconds)
    }

    /// Generation timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Credit metering configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CreditsConfig {
    /// Credits charged per generation attempt.
    #[serde(default = "default_cost_per_generation")]
    pub cost_per_generation: i64,

    /// Credits granted when an account is opened.
    #[serde(default)]
    pub signup_balance: i64,

    /// What happens to credits when a charged generation fails.
    #[serde(default)]
    pub refund_policy: RefundPolicy,
}

fn default_cost_per_generation() -> i64 {
    1
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            cost_per_generation: default_cost_per_generation(),
            signup_balance: 0,
            refund_policy: RefundPolicy::default(),
        }
    }
}

impl CreditsConfig {
    /// Pipeline settings for these credits and the given timeout.
    #[must_use]
    pub fn settings(&self, timeout: Duration) -> Settings {
        Settings {
            cost_per_generation: self.cost_per_generation,
            timeout,
            refund_policy: self.refund_policy,
        }
    }
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Interval between expired-session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_builder(config::Config::builder().add_source(
            config::Environment::default()
                .separator("__")
                .try_parsing(true),
        ))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        builder.build()?.try_deserialize()
    }
}
