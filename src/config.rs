use crate::catalog::OtherIdPrefix;
use crate::cli::{Cli, OutputFormat};
use crate::error::{ConfigError, ConfigResult as Result};
use crate::validators::identity::IdentitySettings;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DATASET_SCHEMA: &str =
    "https://raw.githubusercontent.com/DANS-KNAW-jp/dans-schema/master/lib/src/main/resources/md/ddm/v2/ddm.xsd";
const DEFAULT_FILES_SCHEMA: &str =
    "https://raw.githubusercontent.com/DANS-KNAW-jp/dans-schema/master/lib/src/main/resources/bag/metadata/files/files.xsd";

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Schema key -> local path or http(s) URL
    pub schemas: BTreeMap<String, String>,
    pub catalog: CatalogConfig,
    pub identity: IdentityConfig,
    pub cache: CacheConfig,
    pub network: NetworkConfig,
    pub output: OutputConfig,
}

/// External catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Collection the depositor must hold a role on
    pub collection_alias: String,
}

/// Identity reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdentityConfig {
    pub accepted_role_aliases: Vec<String>,
    pub other_id_prefixes: Vec<OtherIdPrefix>,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory path
    pub directory: PathBuf,
    /// Time-to-live for downloaded schemas in hours
    pub ttl_hours: u64,
    /// Maximum number of entries in memory cache
    pub max_memory_entries: u64,
    /// Memory cache TTL in seconds
    pub memory_ttl_seconds: u64,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts for failed requests
    pub retry_attempts: u32,
    /// Retry delay in milliseconds
    pub retry_delay_ms: u64,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormatConfig,
    pub verbose: bool,
    /// Quiet mode (verdict line only)
    pub quiet: bool,
}

/// Output format configuration (serializable version of CLI OutputFormat)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormatConfig {
    Human,
    Json,
}

impl From<OutputFormat> for OutputFormatConfig {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputFormatConfig::Human,
            OutputFormat::Json => OutputFormatConfig::Json,
        }
    }
}

impl From<OutputFormatConfig> for OutputFormat {
    fn from(format: OutputFormatConfig) -> Self {
        match format {
            OutputFormatConfig::Human => OutputFormat::Human,
            OutputFormatConfig::Json => OutputFormat::Json,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let schemas = [
            ("dataset.xml", DEFAULT_DATASET_SCHEMA),
            ("files.xml", DEFAULT_FILES_SCHEMA),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            schemas,
            catalog: CatalogConfig::default(),
            identity: IdentityConfig::default(),
            cache: CacheConfig::default(),
            network: NetworkConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            collection_alias: "root".to_string(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        let defaults = IdentitySettings::default();
        Self {
            accepted_role_aliases: defaults.accepted_role_aliases,
            other_id_prefixes: defaults.other_id_prefixes,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("validate-bag"),
            ttl_hours: 24,
            max_memory_entries: 64,
            memory_ttl_seconds: 3600, // 1 hour
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormatConfig::Human,
            verbose: false,
            quiet: false,
        }
    }
}

impl Config {
    pub fn identity_settings(&self) -> IdentitySettings {
        IdentitySettings {
            accepted_role_aliases: self.identity.accepted_role_aliases.clone(),
            other_id_prefixes: self.identity.other_id_prefixes.clone(),
            collection_alias: self.catalog.collection_alias.clone(),
        }
    }

    pub fn cache_config(&self) -> crate::cache::CacheConfig {
        crate::cache::CacheConfig {
            directory: self.cache.directory.clone(),
            ttl_hours: self.cache.ttl_hours,
            max_memory_entries: self.cache.max_memory_entries,
            memory_ttl_seconds: self.cache.memory_ttl_seconds,
        }
    }

    pub fn http_client_config(&self) -> crate::http_client::HttpClientConfig {
        crate::http_client::HttpClientConfig {
            timeout_seconds: self.network.timeout_seconds,
            retry_attempts: self.network.retry_attempts,
            retry_delay_ms: self.network.retry_delay_ms,
            ..Default::default()
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(&SystemEnvProvider, cli).await
    }

    pub async fn load_config_with(env: &impl EnvProvider, cli: &Cli) -> Result<Config> {
        let config = match &cli.config {
            Some(config_path) => Self::load_from_file(config_path).await?,
            None => Self::find_config_file().await?.unwrap_or_default(),
        };

        let config = Self::apply_environment_overrides_with(env, config)?;
        let config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON); missing sections keep their defaults
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub async fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "validate-bag.toml",
            "validate-bag.json",
            ".validate-bag.toml",
            ".validate-bag.json",
        ];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("validate-bag");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        fn parsed<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .parse()
                .map_err(|_| ConfigError::Environment(format!("Invalid {} value: {}", key, value)))
        }

        // Catalog settings
        if let Some(url) = env.get("VALIDATE_BAG_CATALOG_URL") {
            config.catalog.base_url = url;
        }
        if let Some(api_key) = env.get("VALIDATE_BAG_API_KEY") {
            config.catalog.api_key = Some(api_key);
        }
        if let Some(alias) = env.get("VALIDATE_BAG_COLLECTION") {
            config.catalog.collection_alias = alias;
        }

        if let Some(roles) = env.get("VALIDATE_BAG_ACCEPTED_ROLES") {
            config.identity.accepted_role_aliases = roles
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Cache settings
        if let Some(cache_dir) = env.get("VALIDATE_BAG_CACHE_DIR") {
            config.cache.directory = PathBuf::from(cache_dir);
        }
        if let Some(cache_ttl) = env.get("VALIDATE_BAG_CACHE_TTL") {
            config.cache.ttl_hours = parsed("VALIDATE_BAG_CACHE_TTL", &cache_ttl)?;
        }

        // Network settings
        if let Some(timeout) = env.get("VALIDATE_BAG_TIMEOUT") {
            config.network.timeout_seconds = parsed("VALIDATE_BAG_TIMEOUT", &timeout)?;
        }
        if let Some(retry_attempts) = env.get("VALIDATE_BAG_RETRY_ATTEMPTS") {
            config.network.retry_attempts =
                parsed("VALIDATE_BAG_RETRY_ATTEMPTS", &retry_attempts)?;
        }

        // Output settings
        if let Some(verbose) = env.get("VALIDATE_BAG_VERBOSE") {
            config.output.verbose = parsed("VALIDATE_BAG_VERBOSE", &verbose)?;
        }
        if let Some(quiet) = env.get("VALIDATE_BAG_QUIET") {
            config.output.quiet = parsed("VALIDATE_BAG_QUIET", &quiet)?;
        }
        if let Some(format) = env.get("VALIDATE_BAG_FORMAT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormatConfig::Human,
                "json" => OutputFormatConfig::Json,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid VALIDATE_BAG_FORMAT value: {}",
                        format
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence where given)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if let Some(url) = &cli.catalog_url {
            config.catalog.base_url = url.clone();
        }
        if let Some(cache_dir) = &cli.cache_dir {
            config.cache.directory = cache_dir.clone();
        }
        if let Some(timeout) = cli.timeout {
            config.network.timeout_seconds = timeout;
        }
        if let Some(format) = cli.output_format {
            config.output.format = format.into();
        }
        if cli.verbose {
            config.output.verbose = true;
        }
        if cli.quiet {
            config.output.quiet = true;
        }

        config
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if config.schemas.is_empty() {
            return Err(ConfigError::Validation(
                "At least one schema must be configured".to_string(),
            ));
        }
        if let Some((key, _)) = config.schemas.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "Schema location for '{}' is empty",
                key
            )));
        }

        if config.cache.ttl_hours == 0 {
            return Err(ConfigError::Validation(
                "Cache TTL must be greater than 0".to_string(),
            ));
        }

        if config.network.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }
        if config.network.retry_attempts > 10 {
            return Err(ConfigError::Validation(
                "Retry attempts cannot exceed 10".to_string(),
            ));
        }

        let mut accounts = BTreeSet::new();
        for prefix in &config.identity.other_id_prefixes {
            if !accounts.insert(prefix.account.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate other-id prefix for account '{}'",
                    prefix.account
                )));
            }
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        Ok(())
    }

    /// Convert configuration to Duration for network timeout
    pub fn get_timeout_duration(config: &Config) -> Duration {
        Duration::from_secs(config.network.timeout_seconds)
    }

    /// Convert configuration to Duration for cache TTL
    pub fn get_cache_ttl_duration(config: &Config) -> Duration {
        Duration::from_secs(config.cache.ttl_hours * 3600)
    }
}
