pub mod parsers;
pub mod servers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::error::{ProbeError, Result};
use super::{ProbeResultSet, ProbeStatus, days_until, report, run_probes};
use parsers::parse_expiry;
use servers::{get_whois_server, get_zone, whois_query};

const WHOIS_PORT: u16 = 43;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESPONSE_SIZE: u64 = 1024 * 1024; // 1MB
pub const DEFAULT_SERVER_PATTERN: &str = "whois.nic.{zone}";

#[derive(Debug, Clone, Serialize)]
pub struct WhoisResult {
    pub domain: String,
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    pub expire_at: Option<DateTime<Utc>>,
    pub expire_days: i64,
}

pub type WhoisResults = ProbeResultSet<WhoisResult>;

/// A raw WHOIS answer and the server that produced it.
#[derive(Debug, Clone)]
pub struct WhoisResponse {
    pub server: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct WhoisChecker {
    servers: HashMap<String, String>,
    default_server_pattern: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    strict: bool,
    concurrency: Option<usize>,
}

impl Default for WhoisChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl WhoisChecker {
    pub fn new() -> Self {
        Self {
            servers: HashMap::new(),
            default_server_pattern: DEFAULT_SERVER_PATTERN.to_string(),
            port: WHOIS_PORT,
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            strict: false,
            concurrency: None,
        }
    }

    /// Extra zone to server entries, consulted before the built-in table.
    pub fn with_servers(mut self, servers: HashMap<String, String>) -> Self {
        self.servers = servers
            .into_iter()
            .map(|(zone, server)| (zone.to_ascii_lowercase(), server))
            .collect();
        self
    }

    /// Pattern for zones without a curated server; `{zone}` is substituted.
    pub fn with_default_server_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.default_server_pattern = pattern.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Report responses without a recognised expiry as errors instead of OK
    /// with zero days.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_concurrency(mut self, concurrency: Option<usize>) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub async fn check(&self, domains: &[String]) -> WhoisResults {
        let checker = Arc::new(self.clone());
        run_probes(
            domains.to_vec(),
            |domain| domain.clone(),
            move |domain| {
                let checker = checker.clone();
                async move { checker.check_one_domain(&domain).await }
            },
            self.concurrency,
        )
        .await
    }

    pub async fn check_one_domain(&self, domain: &str) -> WhoisResult {
        let mut ret = WhoisResult {
            domain: domain.to_string(),
            status: ProbeStatus::Error,
            error_msg: None,
            server: None,
            expire_at: None,
            expire_days: 0,
        };

        let response = match self.get_whois(domain).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Whois {} failed: {}", domain, e);
                ret.error_msg = Some(report(&e));
                return ret;
            }
        };
        ret.server = Some(response.server.clone());

        match parse_expiry(&response.body) {
            Some(expire_at) => {
                let days = days_until(expire_at, Utc::now());
                log::info!("Whois {} expire after {} days, {}", domain, days, expire_at);
                ret.status = ProbeStatus::Ok;
                ret.expire_at = Some(expire_at);
                ret.expire_days = days;
            }
            None if self.strict => {
                let e = ProbeError::UnparsableResponse(response.server);
                log::warn!("Whois {} failed: {}", domain, e);
                ret.error_msg = Some(report(&e));
            }
            None => {
                // Reachable server, unrecognised answer: reported as OK with
                // zero days unless strict mode is on.
                log::warn!(
                    "Whois {}: no expiry date found in response from {}",
                    domain,
                    response.server
                );
                ret.status = ProbeStatus::Ok;
            }
        }
        ret
    }

    /// Queries the registry server for `domain`. An empty answer from a
    /// curated server is retried once against the default server name.
    pub async fn get_whois(&self, domain: &str) -> Result<WhoisResponse> {
        let zone = get_zone(domain).ok_or_else(|| ProbeError::MalformedDomain(domain.to_string()))?;
        let default = self.default_server(zone);

        let Some(server) = self.curated_server(zone) else {
            let server = default.ok_or_else(|| ProbeError::NoWhoisServer(zone.to_string()))?;
            let body = self.query_server(&server, &whois_query(&server, domain)).await?;
            return Ok(WhoisResponse { server, body });
        };

        let body = self.query_server(&server, &whois_query(&server, domain)).await?;
        if body.trim().is_empty() {
            if let Some(fallback) = default.filter(|d| !d.eq_ignore_ascii_case(&server)) {
                log::debug!(
                    "Whois {}: empty response from {}, retrying with {}",
                    domain,
                    server,
                    fallback
                );
                let body = self.query_server(&fallback, &whois_query(&fallback, domain)).await?;
                return Ok(WhoisResponse {
                    server: fallback,
                    body,
                });
            }
        }
        Ok(WhoisResponse { server, body })
    }

    fn curated_server(&self, zone: &str) -> Option<String> {
        self.servers
            .get(&zone.to_ascii_lowercase())
            .cloned()
            .or_else(|| get_whois_server(zone).map(str::to_string))
    }

    fn default_server(&self, zone: &str) -> Option<String> {
        servers::default_whois_server(zone)?;
        Some(
            self.default_server_pattern
                .replace("{zone}", &zone.to_ascii_lowercase()),
        )
    }

    async fn query_server(&self, server: &str, query: &str) -> Result<String> {
        let mut stream = timeout(self.connect_timeout, TcpStream::connect((server, self.port)))
            .await
            .map_err(|_| ProbeError::ConnectError(format!("connection to {} timed out", server)))?
            .map_err(|e| ProbeError::ConnectError(format!("{}: {}", server, report(&e))))?;

        let exchange = async {
            stream.write_all(format!("{}\r\n", query).as_bytes()).await?;
            let mut response = Vec::new();
            (&mut stream)
                .take(MAX_RESPONSE_SIZE)
                .read_to_end(&mut response)
                .await?;
            Ok::<_, std::io::Error>(response)
        };

        let response = timeout(self.read_timeout, exchange)
            .await
            .map_err(|_| ProbeError::ConnectError(format!("read from {} timed out", server)))?
            .map_err(|e| ProbeError::ConnectError(format!("{}: {}", server, report(&e))))?;

        // Try UTF-8, fall back to Latin-1
        Ok(String::from_utf8(response)
            .unwrap_or_else(|e| e.into_bytes().iter().map(|&c| c as char).collect()))
    }
}
