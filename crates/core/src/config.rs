use serde::Deserialize;

use crate::error::PostboxResult;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `POSTBOX__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub segments: SegmentConfig,
    #[serde(default)]
    pub sms: SmsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default = "default_log_json")]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentConfig {
    /// Upper bound on filters per segment accepted at creation time.
    #[serde(default = "default_max_filters")]
    pub max_filters: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmsConfig {
    /// Segment count at which the composer warns about cost.
    #[serde(default = "default_max_segments_warning")]
    pub max_segments_warning: u32,
    #[serde(default = "default_warn_on_extended_charset")]
    pub warn_on_extended_charset: bool,
}

// Default functions
fn default_log_filter() -> String {
    "postbox=info".to_string()
}
fn default_log_json() -> bool {
    true
}
fn default_max_filters() -> usize {
    20
}
fn default_max_segments_warning() -> u32 {
    3
}
fn default_warn_on_extended_charset() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: default_log_json(),
        }
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_filters: default_max_filters(),
        }
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            max_segments_warning: default_max_segments_warning(),
            warn_on_extended_charset: default_warn_on_extended_charset(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and an optional config file.
    pub fn load(path: Option<&str>) -> PostboxResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("POSTBOX")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}
