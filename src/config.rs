use crate::{writer::SchemaPolicy, LeadError, Result};
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The `LeadConfig` struct holds the configuration settings for the lead scraper.
/// It includes retry and timeout settings, the output file, and the provider endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadConfig {
    /// The per-attempt timeout for provider requests, in seconds.
    pub timeout_secs: u64,
    /// The maximum number of send attempts per fetch.
    pub max_attempts: u32,
    /// The linear backoff unit between attempts, in seconds.
    pub base_delay_secs: u64,
    /// The region code sent with map searches.
    pub region: String,
    /// The number of leads kept per search when the caller gives none.
    pub default_limit: usize,
    /// The CSV file leads are appended to.
    pub output_path: PathBuf,
    /// How the writer reacts when new columns show up.
    pub schema_policy: SchemaPolicy,
    /// The user agent string to be used in HTTP requests.
    pub user_agent: String,
    /// Settings for the map listings provider.
    pub maps: ProviderConfig,
    /// Settings for the profile provider.
    pub profiles: ProviderConfig,
}

/// The `ProviderConfig` struct holds the endpoint and credential of one scraping provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// The URL requests are posted to.
    pub endpoint: String,
    /// The key sent with each request. Empty means unauthenticated.
    pub api_key: String,
}

impl Default for LeadConfig {
    /// Provides default values for the `LeadConfig` struct.
    ///
    /// # Returns
    ///
    /// A `LeadConfig` instance with default settings.
    fn default() -> Self {
        Self {
            timeout_secs: crate::DEFAULT_TIMEOUT.as_secs(),
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            base_delay_secs: crate::DEFAULT_BASE_DELAY.as_secs(),
            region: String::from("pk"),
            default_limit: crate::DEFAULT_LIMIT,
            output_path: PathBuf::from(crate::DEFAULT_OUTPUT_PATH),
            schema_policy: SchemaPolicy::default(),
            user_agent: String::from("Mozilla/5.0 (compatible; LeadScraper/0.1)"),
            maps: ProviderConfig {
                endpoint: String::from("https://google.serper.dev/places"),
                api_key: String::new(),
            },
            profiles: ProviderConfig {
                endpoint: String::from(
                    "https://api.apify.com/v2/acts/pocesar~linkedin-company-employees-scraper/run-sync-get-dataset-items",
                ),
                api_key: String::new(),
            },
        }
    }
}

impl LeadConfig {
    /// Loads the configuration from defaults, an optional file and `LEADS_*` environment variables.
    ///
    /// Nested keys use a double underscore, e.g. `LEADS_MAPS__API_KEY`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&LeadConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: LeadConfig = builder
            .add_source(
                Environment::with_prefix("LEADS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the fetcher or writer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts must be at least 1"));
        }
        if self.default_limit == 0 {
            return Err(invalid("default_limit must be at least 1"));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs must be at least 1"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(invalid("output_path must not be empty"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }
}

fn invalid(message: &str) -> LeadError {
    LeadError::Config(::config::ConfigError::Message(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_constants() {
        let config = LeadConfig::default();
        assert_eq!(config.timeout(), crate::DEFAULT_TIMEOUT);
        assert_eq!(config.base_delay(), crate::DEFAULT_BASE_DELAY);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.output_path, PathBuf::from("leads.csv"));
        assert_eq!(config.schema_policy, SchemaPolicy::AppendOnly);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
max_attempts = 5
schema_policy = "rewrite"

[maps]
api_key = "secret"
"#
        )
        .unwrap();

        let config = LeadConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.schema_policy, SchemaPolicy::Rewrite);
        assert_eq!(config.maps.api_key, "secret");
        assert_eq!(config.maps.endpoint, "https://google.serper.dev/places");
        assert_eq!(config.timeout_secs, 40);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = LeadConfig {
            max_attempts: 0,
            ..LeadConfig::default()
        };
        assert!(matches!(config.validate(), Err(LeadError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_output_path() {
        let config = LeadConfig {
            output_path: PathBuf::new(),
            ..LeadConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
