use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::ConfigError;
use crate::probe::request::RequestTarget;

/// Collection interval used until the file provides an acceptable one.
pub const DEFAULT_COLLECT_DURATION: u64 = 3600;

/// Intervals at or below this many seconds are ignored.
pub const MIN_COLLECT_DURATION: u64 = 60;

/// The probe configuration, as read from the YAML file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    /// Seconds between two collections. Only values above
    /// `MIN_COLLECT_DURATION` are taken over, see [`Config::reload_from`].
    #[serde(default)]
    pub collect_duration: u64,

    /// `domain` or `domain|alias`; the alias is dialled, the domain is sent as
    /// TLS server name.
    #[serde(default)]
    pub certificate_domains: Vec<String>,

    #[serde(default)]
    pub whois_domains: Vec<String>,

    #[serde(default)]
    pub resolve_domains: Vec<String>,

    #[serde(default)]
    pub request_domains: Vec<RequestConfig>,

    /// Upper bound of probes in flight per probe kind. Unbounded if absent.
    #[serde(default)]
    pub probe_concurrency: Option<usize>,

    /// Report WHOIS answers without a recognised expiry as errors.
    #[serde(default)]
    pub strict_whois: bool,

    /// Zone to WHOIS server overrides.
    #[serde(default)]
    pub whois_servers: HashMap<String, String>,
}

/// A virtual host checked through each of its backing domains.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequestConfig {
    pub host: String,

    pub domains: Vec<String>,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default)]
    pub https: bool,

    /// Backend port, when not the scheme's default.
    #[serde(default)]
    pub port: Option<u16>,
}

fn default_path() -> String {
    "/".to_string()
}

impl RequestConfig {
    pub fn targets(&self) -> impl Iterator<Item = RequestTarget> + '_ {
        self.domains.iter().map(|domain| RequestTarget {
            domain: domain.clone(),
            host: self.host.clone(),
            path: self.path.clone(),
            https: self.https,
            port: self.port,
        })
    }
}

impl Config {
    /// Reads `path` and applies it on top of the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let mut config = Config {
            collect_duration: DEFAULT_COLLECT_DURATION,
            ..Default::default()
        };
        config.reload_from(Config::read(path)?);
        Ok(config)
    }

    /// Parses `path` without applying defaults or the interval floor.
    pub fn read(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Config::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Config, ConfigError> {
        // an empty file is a valid, empty configuration
        if config_str.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(config_str)?)
    }

    /// Takes over everything from `fresh`, except an interval that is not
    /// above the floor: then the current interval stays.
    pub fn reload_from(&mut self, fresh: Config) {
        let previous = self.collect_duration;
        if fresh.collect_duration > MIN_COLLECT_DURATION {
            *self = fresh;
        } else {
            log::warn!(
                "Ignoring collect_duration {}s (must be above {}s), keeping {}s",
                fresh.collect_duration,
                MIN_COLLECT_DURATION,
                previous
            );
            *self = Config {
                collect_duration: previous,
                ..fresh
            };
        }
    }

    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.collect_duration)
    }

    /// One target per virtual host and backing domain.
    pub fn request_targets(&self) -> Vec<RequestTarget> {
        self.request_domains
            .iter()
            .flat_map(|group| group.targets())
            .collect()
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    const YAML: &str = r#"
collect_duration: 600
certificate_domains:
  - www.example.com
  - example.com|edge.cdn.example.net
whois_domains:
  - example.com
  - example.jp
resolve_domains:
  - example.com
request_domains:
  - host: www.example.com
    domains: [lb1.example.net, lb2.example.net]
    path: /healthz
    https: true
  - host: api.example.com
    domains: [10.0.0.7]
    port: 8080
probe_concurrency: 16
whois_servers:
  xyz: whois.example-registry.net
"#;

    #[test]
    fn test_default_path() {
        assert_eq!(default_path(), "/");
    }

    #[test]
    fn test_config_deserialization() {
        let config = Config::from_yaml(YAML).expect("Invalid YAML");

        assert_eq!(config.collect_duration, 600);
        assert_eq!(config.certificate_domains.len(), 2);
        assert_eq!(config.whois_domains, vec!["example.com", "example.jp"]);
        assert_eq!(config.resolve_domains, vec!["example.com"]);
        assert_eq!(config.probe_concurrency, Some(16));
        assert!(!config.strict_whois);
        assert_eq!(
            config.whois_servers.get("xyz").map(String::as_str),
            Some("whois.example-registry.net")
        );

        let www = &config.request_domains[0];
        assert_eq!(www.path, "/healthz");
        assert!(www.https);
        assert_eq!(www.port, None);

        let api = &config.request_domains[1];
        assert_eq!(api.path, "/");
        assert!(!api.https);
        assert_eq!(api.port, Some(8080));
    }

    #[test]
    fn test_request_targets_are_expanded() {
        let config = Config::from_yaml(YAML).unwrap();
        let targets = config.request_targets();

        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].key(), "www.example.com @ lb1.example.net");
        assert_eq!(targets[1].key(), "www.example.com @ lb2.example.net");
        assert_eq!(targets[2].domain, "10.0.0.7");
        assert_eq!(targets[2].port, Some(8080));
    }

    #[test]
    fn test_interval_floor() {
        let mut config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.collect_interval(), Duration::from_secs(600));

        let mut fresh = Config::from_yaml(YAML).unwrap();
        fresh.collect_duration = 30;
        fresh.resolve_domains.push("example.org".to_string());
        config.reload_from(fresh);
        assert_eq!(config.collect_duration, 600);
        assert_eq!(config.resolve_domains.len(), 2);

        let mut fresh = Config::from_yaml(YAML).unwrap();
        fresh.collect_duration = 60;
        config.reload_from(fresh);
        assert_eq!(config.collect_duration, 600);

        let mut fresh = Config::from_yaml(YAML).unwrap();
        fresh.collect_duration = 61;
        config.reload_from(fresh);
        assert_eq!(config.collect_duration, 61);
    }

    #[test]
    fn test_missing_interval_keeps_default() {
        let dir = std::env::temp_dir().join(format!("domain-exporter-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        std::fs::write(&path, "resolve_domains: [example.com]\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.collect_duration, DEFAULT_COLLECT_DURATION);
        assert_eq!(config.resolve_domains, vec!["example.com"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Config::load("/nonexistent/domain-exporter.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_empty_file_is_empty_config() {
        let config = Config::from_yaml("\n").unwrap();
        assert!(config.certificate_domains.is_empty());
        assert!(config.request_domains.is_empty());
    }
}
