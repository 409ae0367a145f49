// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tessera member configuration.

use std::time::Duration;

use figment::{
    Figment, Metadata, Profile, Provider,
    providers::{Env, Format, Serialized, Toml},
    value::{Dict, Map},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationErrors};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to extract configuration: {0}")]
    Extraction(#[from] Box<figment::Error>),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Reply coordination settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ReplyConfig {
    /// Seconds a wait may run before a warning names the members still outstanding.
    /// None disables the warning. The wait itself is never bounded.
    #[validate(range(min = 1))]
    pub ack_wait_threshold_secs: Option<u64>,
}

impl ReplyConfig {
    pub fn ack_wait_threshold(&self) -> Option<Duration> {
        self.ack_wait_threshold_secs.map(Duration::from_secs)
    }
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            ack_wait_threshold_secs: Some(15),
        }
    }
}

/// Inbound message server settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Maximum number of requests handled concurrently. None = unbounded.
    #[validate(range(min = 1))]
    pub handler_concurrency: Option<usize>,
}

/// Top-level member configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TesseraConfig {
    #[validate(nested)]
    #[serde(default)]
    pub replies: ReplyConfig,

    #[validate(nested)]
    #[serde(default)]
    pub server: ServerConfig,
}

impl TesseraConfig {
    /// Create a Figment configuration with all sources merged.
    ///
    /// Configuration sources in priority order (lowest to highest):
    /// 1. Code defaults
    /// 2. System config file at /opt/tessera/etc/tessera.toml
    /// 3. TOML file from TESSERA_CONFIG_PATH environment variable
    /// 4. Environment variables (TESSERA_REPLIES_*, TESSERA_SERVER_*)
    pub fn figment() -> Figment {
        let config_path = std::env::var("TESSERA_CONFIG_PATH").unwrap_or_default();

        Figment::new()
            .merge(Serialized::defaults(TesseraConfig::default()))
            .merge(Toml::file("/opt/tessera/etc/tessera.toml"))
            .merge(Toml::file(&config_path))
            // TESSERA_REPLIES_ACK_WAIT_THRESHOLD_SECS
            .merge(
                Env::prefixed("TESSERA_REPLIES_")
                    .map(|k| format!("replies.{}", k.as_str().to_lowercase()).into()),
            )
            // TESSERA_SERVER_HANDLER_CONCURRENCY
            .merge(
                Env::prefixed("TESSERA_SERVER_")
                    .map(|k| format!("server.{}", k.as_str().to_lowercase()).into()),
            )
    }

    /// Load configuration from default figment (env and files).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::extract_from(Self::figment())
    }

    /// Extract and validate configuration from any provider.
    pub fn extract_from<T: Provider>(provider: T) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(provider)
            .extract()
            .map_err(|e| ConfigError::Extraction(Box::new(e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a figment from defaults, then merge a custom provider with highest priority.
    ///
    /// ```rust,ignore
    /// let figment = TesseraConfig::figment_with(("server.handler_concurrency", 4usize));
    /// let config = TesseraConfig::extract_from(figment)?;
    /// ```
    pub fn figment_with<T: Provider>(extra: T) -> Figment {
        Self::figment().merge(extra)
    }
}

impl Provider for TesseraConfig {
    fn metadata(&self) -> Metadata {
        Metadata::named("TesseraConfig")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        Serialized::defaults(self).data()
    }
}
