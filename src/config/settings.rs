use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;

use crate::channel::{BackoffConfig, ChannelConfig};
use crate::endpoint::PageLocation;
use crate::error::Result;
use crate::mailbox::MailboxConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub page: PageConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub reconnect: BackoffConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Page the client is served from; endpoints are resolved against it
#[derive(Debug, Clone, Deserialize)]
pub struct PageConfig {
    #[serde(default = "default_page_url")]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

fn default_page_url() -> String {
    "http://localhost:8000/".to_string()
}

impl Settings {
    pub fn new() -> Result<Self> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("page.url", default_page_url())?
            .set_default("channel.path", crate::channel::DEFAULT_INFO_PATH)?
            .set_default("channel.connect_timeout_ms", 10_000)?
            .set_default("reconnect.initial_delay_ms", 100)?
            .set_default("reconnect.max_delay_ms", 30_000)?
            .set_default("reconnect.multiplier", 2.0)?
            .set_default("reconnect.jitter_factor", 0.1)?
            .set_default("log.format", "plain")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // MLC_PAGE__URL, MLC_CHANNEL__CONNECT_TIMEOUT_MS, MLC_MAILBOX__HISTORY_LIMIT, etc.
            .add_source(
                Environment::with_prefix("MLC")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Parse the configured page URL
    pub fn page_location(&self) -> Result<PageLocation> {
        Ok(PageLocation::parse(&self.page.url)?)
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            url: default_page_url(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page: PageConfig::default(),
            channel: ChannelConfig::default(),
            mailbox: MailboxConfig::default(),
            reconnect: BackoffConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointError;
    use crate::error::SyncError;

    #[test]
    fn test_default_values() {
        let settings = Settings::default();
        assert_eq!(settings.page.url, "http://localhost:8000/");
        assert_eq!(settings.channel.path, "/data/info");
        assert_eq!(settings.channel.connect_timeout_ms, 10_000);
        assert_eq!(settings.mailbox.history_limit, None);
        assert_eq!(settings.reconnect.initial_delay_ms, 100);
        assert_eq!(settings.log.format, LogFormat::Plain);
    }

    #[test]
    fn test_page_location_from_defaults() {
        let location = Settings::default().page_location().unwrap();
        assert!(!location.secure);
        assert_eq!(location.host, "localhost:8000");
    }

    #[test]
    fn test_deserialize_partial_source() {
        let settings: Settings = Config::builder()
            .set_override("page.url", "https://console.local/app/")
            .unwrap()
            .set_override("mailbox.history_limit", 50)
            .unwrap()
            .set_override("log.format", "json")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(settings.page_location().unwrap().secure);
        assert_eq!(settings.mailbox.history_limit, Some(50));
        assert_eq!(settings.channel, ChannelConfig::default());
        assert_eq!(settings.log.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_page_url_is_endpoint_error() {
        let settings = Settings {
            page: PageConfig {
                url: "not a url".to_string(),
            },
            ..Settings::default()
        };

        assert!(matches!(
            settings.page_location(),
            Err(SyncError::Endpoint(EndpointError::MissingScheme(_)))
        ));
    }
}
