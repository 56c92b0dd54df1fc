use std::env;
use std::net::IpAddr;
use std::path::PathBuf;

use super::ConfigError;
use super::probe_config::Config;
use crate::probe::error::ProbeError;
use crate::probe::resolver::AddressResolver;

pub struct AppConfig {
    pub config: Config,
    pub settings: EnvSettings,
}

/// Process settings taken from the environment, before the probe
/// configuration file is read.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvSettings {
    pub config_file: PathBuf,
    pub listen_address: String,
    pub metrics_path: String,
    pub dns_hosts: Option<Vec<IpAddr>>,
    pub mimir_endpoint: Option<String>,
    pub mimir_tenant: Option<String>,
}

impl EnvSettings {
    /// Reads the settings through `lookup`, which maps a variable name to its
    /// value. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let dns_hosts = var("DNS_HOSTS")
            .map(|hosts| {
                hosts
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.parse::<IpAddr>()
                            .map_err(|_| ConfigError::InvalidDnsHost(s.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        let metrics_path = var("METRICS_PATH").unwrap_or_else(|| "/metrics".to_string());
        let metrics_path = if metrics_path.starts_with('/') {
            metrics_path
        } else {
            format!("/{metrics_path}")
        };

        Ok(Self {
            config_file: var("CONFIG_FILE")
                .unwrap_or_else(|| "config.yaml".to_string())
                .into(),
            listen_address: var("LISTEN_ADDRESS").unwrap_or_else(|| "0.0.0.0:9170".to_string()),
            metrics_path,
            dns_hosts,
            mimir_endpoint: var("MIMIR_ENDPOINT").map(|e| e.trim_end_matches('/').to_string()),
            mimir_tenant: var("MIMIR_TENANT"),
        })
    }
}

/// Load the application configuration from a YAML file and environment variables
/// This function reads the configuration file specified by the `CONFIG_FILE` environment variable,
/// parses it into a `Config` struct, and collects the listen address, metrics path, DNS hosts
/// and optional Mimir endpoint.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let settings = EnvSettings::from_lookup(|key| env::var(key).ok())?;
    let config = Config::load(&settings.config_file)?;

    match &settings.dns_hosts {
        Some(hosts) => log::info!("Using DNS hosts: {:?}", hosts),
        None => log::info!("Using system resolver configuration"),
    }

    Ok(AppConfig { config, settings })
}

/// Setup the resolver used by the resolve and request probes: the configured
/// DNS hosts when given, the system configuration otherwise.
pub fn setup_resolver(dns_hosts: Option<&[IpAddr]>) -> Result<AddressResolver, ProbeError> {
    match dns_hosts {
        Some(hosts) if !hosts.is_empty() => Ok(AddressResolver::with_name_servers(hosts)),
        _ => AddressResolver::from_system_conf(),
    }
}
