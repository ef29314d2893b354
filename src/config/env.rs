use config::{Config as ConfigLoader, File, FileFormat};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use alloy_primitives::Address;
use tracing::{debug, info};

use super::PresaleConfig;
use crate::error::Error;

/// Environment variable naming the directory searched for config files
pub const ENV_CONFIG_DIR: &str = "SRA_CONFIG_DIR";

const CONFIG_FILES: [(&str, FileFormat); 2] = [
    ("presale.toml", FileFormat::Toml),
    ("presale.json", FileFormat::Json),
];

impl PresaleConfig {
    /// Load configuration: defaults, then the first config file found, then
    /// `SRA_*` environment variables. The result is validated.
    pub fn load() -> Result<Self, Error> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::load_file(&path)?,
            None => {
                debug!("No presale config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self, Error> {
        let mut config = Self::load_file(path)?;
        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn search_dirs() -> Vec<PathBuf> {
        let mut dirs_to_search = Vec::new();
        if let Ok(dir) = env::var(ENV_CONFIG_DIR) {
            dirs_to_search.push(PathBuf::from(dir));
        }
        dirs_to_search.push(PathBuf::from("config"));
        dirs_to_search.push(PathBuf::from("."));
        if let Some(user_dir) = dirs::config_dir() {
            dirs_to_search.push(user_dir.join("sra-presale"));
        }
        dirs_to_search
    }

    fn find_config_file() -> Option<PathBuf> {
        Self::search_dirs().into_iter().find_map(|dir| {
            CONFIG_FILES
                .iter()
                .map(|(name, _)| dir.join(name))
                .find(|candidate| candidate.is_file())
        })
    }

    /// Parse one config file; missing keys keep their defaults
    pub fn load_file(path: &Path) -> Result<Self, Error> {
        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => FileFormat::Json,
            Some("toml") | None => FileFormat::Toml,
            Some(other) => {
                return Err(Error::Config(format!(
                    "Unsupported config file extension '{}' for {}",
                    other,
                    path.display()
                )))
            }
        };

        let path_str = path
            .to_str()
            .ok_or_else(|| Error::Config(format!("Non UTF-8 config path: {}", path.display())))?;

        let config = ConfigLoader::builder()
            .add_source(File::new(path_str, format))
            .build()
            .and_then(|loaded| loaded.try_deserialize::<PresaleConfig>())
            .map_err(|e| {
                Error::Config(format!("Failed to load config file {}: {}", path.display(), e))
            })?;

        info!("Loaded presale configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `SRA_*` overrides using `lookup` to read variables
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SRA_RPC_URL") {
            self.chain.rpc_urls = vec![url];
        }

        if let Some(chain_id) = lookup("SRA_CHAIN_ID") {
            self.chain.chain_id = chain_id
                .parse()
                .map_err(|_| Error::Config(format!("Invalid SRA_CHAIN_ID: {}", chain_id)))?;
        }

        if let Some(address) = lookup("SRA_CONTRACT_ADDRESS") {
            self.contract_address = parse_address("SRA_CONTRACT_ADDRESS", &address)?;
        }

        if let Some(address) = lookup("SRA_TOKEN_ADDRESS") {
            self.token_address = parse_address("SRA_TOKEN_ADDRESS", &address)?;
        }

        if let Some(min) = lookup("SRA_MIN_CONTRIBUTION") {
            self.limits.default_min = min;
        }

        if let Some(max) = lookup("SRA_MAX_CONTRIBUTION") {
            self.limits.default_max = max;
        }

        if let Some(price) = lookup("SRA_NATIVE_USD_PRICE") {
            let price = price
                .parse::<f64>()
                .map_err(|_| Error::Config(format!("Invalid SRA_NATIVE_USD_PRICE: {}", price)))?;
            self.display.native_usd_price = Some(price);
        }

        if let Some(host) = lookup("SRA_DAPP_HOST") {
            self.wallet.dapp_host = Some(host);
        }

        if let Some(level) = lookup("SRA_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("SRA_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Error> {
        if self.chain.chain_id == 0 {
            return Err(Error::Config("Chain ID must be greater than 0".to_string()));
        }

        if self.chain.rpc_urls.is_empty() {
            return Err(Error::Config("At least one RPC URL is required".to_string()));
        }

        for url in &self.chain.rpc_urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "RPC URL must start with http:// or https://: {}",
                    url
                )));
            }
        }

        if self.contract_address == Address::ZERO {
            return Err(Error::Config("Contract address must not be zero".to_string()));
        }

        let min = self.limits.min_wei()?;
        let max = self.limits.max_wei()?;
        if min.is_zero() {
            return Err(Error::Config(
                "Default minimum contribution must be greater than 0".to_string(),
            ));
        }
        if min > max {
            return Err(Error::Config(format!(
                "Default minimum contribution {} exceeds maximum {}",
                self.limits.default_min, self.limits.default_max
            )));
        }

        let intervals = [
            ("sale", self.polling.sale_interval_secs),
            ("vesting", self.polling.vesting_interval_secs),
            ("balance", self.polling.balance_interval_secs),
        ];
        for (name, secs) in intervals {
            if secs == 0 {
                return Err(Error::Config(format!(
                    "Polling interval for {} must be greater than 0",
                    name
                )));
            }
        }

        if self.wallet.confirmation_timeout_secs == 0 {
            return Err(Error::Config(
                "Confirmation timeout must be greater than 0".to_string(),
            ));
        }

        if self.wallet.receipt_poll_interval_ms == 0 {
            return Err(Error::Config(
                "Receipt poll interval must be greater than 0".to_string(),
            ));
        }

        if let Some(price) = self.display.native_usd_price {
            if !price.is_finite() || price <= 0.0 {
                return Err(Error::Config("Native USD price must be positive".to_string()));
            }
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(Error::Config(format!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.logging.level, valid_levels
            )));
        }

        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(Error::Config(format!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format, valid_formats
            )));
        }

        Ok(())
    }

    /// Write the configuration as TOML
    pub fn save_to_file(&self, file_path: &Path) -> Result<(), Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
            }
        }

        fs::write(file_path, content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

fn parse_address(var: &str, value: &str) -> Result<Address, Error> {
    Address::from_str(value.trim())
        .map_err(|e| Error::Config(format!("Invalid {}: {} ({})", var, value, e)))
}
