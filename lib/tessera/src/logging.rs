// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tessera logging setup.
//!
//! - Configuration loaded from:
//!   1. Environment variables (highest priority).
//!   2. Optional TOML file pointed to by the `TESSERA_LOGGING_CONFIG_PATH` environment variable.
//!   3. `/opt/tessera/etc/logging.toml`.
//!
//! Output is human readable by default. Set `TESSERA_LOGGING_JSONL=1` for one JSON object
//! per line.
//!
//! Filters come from the `TESSERA_LOG` environment variable or the `log_filters` table of
//! the TOML file. The default level is `info`.
//!
//! ```toml
//! log_level = "warn"
//!
//! [log_filters]
//! "tessera::lookup" = "debug"
//! ```

use std::collections::HashMap;
use std::sync::Once;

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer};

/// ENV used to set the log filter
const FILTER_ENV: &str = "TESSERA_LOG";

/// ENV that switches output to JSONL
const JSONL_ENV: &str = "TESSERA_LOGGING_JSONL";

/// ENV used to set the path to the logging configuration file
const CONFIG_PATH_ENV: &str = "TESSERA_LOGGING_CONFIG_PATH";

const DEFAULT_FILTER_LEVEL: &str = "info";

static INIT: Once = Once::new();

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct LoggingConfig {
    log_level: String,
    log_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: DEFAULT_FILTER_LEVEL.to_string(),
            log_filters: HashMap::new(),
        }
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init() {
    INIT.call_once(setup_logging);
}

fn setup_logging() {
    let filter_layer = filters(load_config());

    let result = if jsonl_logging_enabled() {
        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .with_filter(filter_layer);
        tracing_subscriber::registry().with(layer).try_init()
    } else {
        let layer = fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(filter_layer);
        tracing_subscriber::registry().with(layer).try_init()
    };

    if let Err(e) = result {
        eprintln!("Tessera logging not installed: {e}");
    }
}

fn jsonl_logging_enabled() -> bool {
    env_is_truthy(JSONL_ENV)
}

fn env_is_truthy(key: &str) -> bool {
    std::env::var(key)
        .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "on" | "yes"))
        .unwrap_or(false)
}

fn filters(config: LoggingConfig) -> EnvFilter {
    let default_directive = config
        .log_level
        .parse::<Directive>()
        .unwrap_or_else(|_| Directive::from(tracing::level_filters::LevelFilter::INFO));

    let mut filter_layer = EnvFilter::builder()
        .with_default_directive(default_directive)
        .with_env_var(FILTER_ENV)
        .from_env_lossy();

    for (module, level) in config.log_filters {
        match format!("{module}={level}").parse::<Directive>() {
            Ok(d) => {
                filter_layer = filter_layer.add_directive(d);
            }
            Err(e) => {
                eprintln!("Failed parsing filter '{level}' for module '{module}': {e}");
            }
        }
    }
    filter_layer
}

fn load_config() -> LoggingConfig {
    let config_path = std::env::var(CONFIG_PATH_ENV).unwrap_or_default();
    let figment = Figment::new()
        .merge(Serialized::defaults(LoggingConfig::default()))
        .merge(Toml::file("/opt/tessera/etc/logging.toml"))
        .merge(Toml::file(config_path));

    figment.extract().unwrap_or_else(|e| {
        eprintln!("Invalid logging configuration, using defaults: {e}");
        LoggingConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_config_file() {
        temp_env::with_vars_unset(vec![CONFIG_PATH_ENV], || {
            assert_eq!(load_config(), LoggingConfig::default());
        });
    }

    #[test]
    fn reads_filters_from_toml() {
        let path =
            std::env::temp_dir().join(format!("tessera-logging-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "log_level = \"warn\"\n\n[log_filters]\n\"tessera::lookup\" = \"debug\""
        )
        .unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(path.as_os_str()), || {
            let config = load_config();
            assert_eq!(config.log_level, "warn");
            assert_eq!(
                config.log_filters.get("tessera::lookup").map(String::as_str),
                Some("debug")
            );
        });
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn jsonl_flag_accepts_common_truthy_values() {
        temp_env::with_var(JSONL_ENV, Some("1"), || assert!(jsonl_logging_enabled()));
        temp_env::with_var(JSONL_ENV, Some("TRUE"), || assert!(jsonl_logging_enabled()));
        temp_env::with_var(JSONL_ENV, Some("0"), || assert!(!jsonl_logging_enabled()));
        temp_env::with_var_unset(JSONL_ENV, || assert!(!jsonl_logging_enabled()));
    }

    #[test]
    fn bad_filters_are_skipped() {
        let config = LoggingConfig {
            log_level: "not a level".to_string(),
            log_filters: HashMap::from([("tessera".to_string(), "debug".to_string())]),
        };
        let filter = filters(config);
        assert!(filter.to_string().contains("tessera=debug"));
    }

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
