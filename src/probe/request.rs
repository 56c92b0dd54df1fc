use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use url::Url;

use super::error::{ProbeError, Result};
use super::resolver::HostResolver;
use super::{ProbeResultSet, ProbeStatus, report, run_probes};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One backend of a virtual host: `domain` picks the address to dial, `host`
/// is what the request presents as Host header and TLS server name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub domain: String,
    pub host: String,
    pub path: String,
    pub https: bool,
    pub port: Option<u16>,
}

impl RequestTarget {
    /// Several virtual hosts may share a backend domain, so the key carries both.
    pub fn key(&self) -> String {
        format!("{} @ {}", self.host, self.domain)
    }

    fn url(&self) -> Result<Url> {
        let scheme = if self.https { "https" } else { "http" };
        let port = self.port.map(|p| format!(":{p}")).unwrap_or_default();
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        Url::parse(&format!("{scheme}://{}{port}{path}", self.host))
            .map_err(|e| ProbeError::ConnectError(format!("invalid url for {}: {}", self.host, e)))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestResult {
    pub domain: String,
    pub status: ProbeStatus,
    pub host: String,
    pub path: String,
    pub address: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

pub type RequestResults = ProbeResultSet<RequestResult>;

pub struct RequestChecker<R> {
    resolver: Arc<R>,
    timeout: Duration,
    concurrency: Option<usize>,
}

impl<R: HostResolver> RequestChecker<R> {
    pub fn new(resolver: Arc<R>) -> Self {
        Self {
            resolver,
            timeout: REQUEST_TIMEOUT,
            concurrency: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: Option<usize>) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Probes every target, keyed by `"<host> @ <domain>"`.
    pub async fn check(&self, targets: Vec<RequestTarget>) -> RequestResults {
        let resolver = self.resolver.clone();
        let request_timeout = self.timeout;
        run_probes(
            targets,
            RequestTarget::key,
            move |target| {
                let resolver = resolver.clone();
                async move { check_one_domain(resolver.as_ref(), &target, request_timeout).await }
            },
            self.concurrency,
        )
        .await
    }
}

pub async fn check_one_domain<R: HostResolver>(
    resolver: &R,
    target: &RequestTarget,
    request_timeout: Duration,
) -> RequestResult {
    let mut ret = RequestResult {
        domain: target.domain.clone(),
        status: ProbeStatus::Error,
        host: target.host.clone(),
        path: target.path.clone(),
        address: String::new(),
        status_code: 0,
        error_msg: None,
    };

    let addrs = match resolver.lookup_host(&target.domain).await {
        Ok(addrs) => addrs,
        Err(e) => {
            ret.error_msg = Some(report(&e));
            log_failure(&ret);
            return ret;
        }
    };
    let Some(addr) = select_address(&addrs) else {
        ret.error_msg = Some(report(&ProbeError::NoAddresses(target.domain.clone())));
        log_failure(&ret);
        return ret;
    };
    ret.address = addr.to_string();

    let (status_code, outcome) = do_request(addr, target, request_timeout).await;
    ret.status_code = status_code;
    match outcome {
        Ok(()) => ret.status = ProbeStatus::Ok,
        Err(e) => {
            ret.error_msg = Some(report(&e));
            log_failure(&ret);
        }
    }
    ret
}

fn log_failure(result: &RequestResult) {
    log::warn!(
        "Request {}: {}{} -> {}",
        result.domain,
        result.host,
        result.path,
        result.error_msg.as_deref().unwrap_or_default()
    );
}

/// Prefers the first IPv4 address; falls back to the first of any family.
pub fn select_address(addrs: &[IpAddr]) -> Option<IpAddr> {
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

/// Answers every lookup with the selected backend, so redirects to other
/// hosts are dialled on it as well. The port comes from the URL.
struct PinnedResolver(IpAddr);

impl Resolve for PinnedResolver {
    fn resolve(&self, _name: Name) -> Resolving {
        let addr = SocketAddr::new(self.0, 0);
        Box::pin(async move {
            let addrs: Addrs = Box::new(std::iter::once(addr));
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}

/// GETs the target's URL with every connection pinned to `addr`. The URL is
/// built on the virtual host, so it is what the Host header and TLS server
/// name present, also after a redirect; certificates are not verified.
///
/// Returns the status code seen (0 without a response) and whether the probe
/// passed: status 200 and a readable first body chunk.
async fn do_request(
    addr: IpAddr,
    target: &RequestTarget,
    request_timeout: Duration,
) -> (u16, Result<()>) {
    let url = match target.url() {
        Ok(url) => url,
        Err(e) => return (0, Err(e)),
    };

    let client = Client::builder()
        .timeout(request_timeout)
        .danger_accept_invalid_certs(true)
        .use_rustls_tls()
        .no_proxy()
        .dns_resolver(Arc::new(PinnedResolver(addr)))
        .build();
    let client = match client {
        Ok(client) => client,
        Err(e) => return (0, Err(ProbeError::ConnectError(report(&e)))),
    };

    let mut response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => return (0, Err(ProbeError::ConnectError(report(&e)))),
    };

    let status = response.status();
    if status != StatusCode::OK {
        return (status.as_u16(), Err(ProbeError::HttpStatusMismatch(status.as_u16())));
    }

    let outcome = match response.chunk().await {
        Ok(Some(chunk)) if !chunk.is_empty() => Ok(()),
        Ok(_) => Err(ProbeError::BodyReadError("empty body".to_string())),
        Err(e) => Err(ProbeError::BodyReadError(report(&e))),
    };
    (status.as_u16(), outcome)
}
