use std::sync::Arc;

use serde::Serialize;

use super::resolver::HostResolver;
use super::{ProbeResultSet, ProbeStatus, report, run_probes};

#[derive(Debug, Clone, Serialize)]
pub struct ResolveResult {
    pub domain: String,
    pub status: ProbeStatus,
    pub ips: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

pub type ResolveResults = ProbeResultSet<ResolveResult>;

/// Checks that domains resolve to at least one address.
pub struct ResolveChecker<R> {
    resolver: Arc<R>,
    concurrency: Option<usize>,
}

impl<R: HostResolver> ResolveChecker<R> {
    pub fn new(resolver: Arc<R>) -> Self {
        Self {
            resolver,
            concurrency: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: Option<usize>) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub async fn check(&self, domains: &[String]) -> ResolveResults {
        let resolver = self.resolver.clone();
        run_probes(
            domains.to_vec(),
            |domain| domain.clone(),
            move |domain| {
                let resolver = resolver.clone();
                async move { check_one_domain(resolver.as_ref(), domain).await }
            },
            self.concurrency,
        )
        .await
    }
}

/// An empty answer counts as a failure even when the lookup itself succeeded.
pub async fn check_one_domain<R: HostResolver>(resolver: &R, domain: String) -> ResolveResult {
    let mut ret = ResolveResult {
        domain,
        status: ProbeStatus::Error,
        ips: Vec::new(),
        error_msg: None,
    };

    match resolver.lookup_host(&ret.domain).await {
        Ok(addrs) => ret.ips = addrs.iter().map(|ip| ip.to_string()).collect(),
        Err(e) => ret.error_msg = Some(report(&e)),
    }

    if !ret.ips.is_empty() {
        ret.status = ProbeStatus::Ok;
        log::debug!("Resolve {} -> {:?}", ret.domain, ret.ips);
    } else {
        log::warn!(
            "Resolve {} failed: {}",
            ret.domain,
            ret.error_msg.as_deref().unwrap_or("no addresses")
        );
    }
    ret
}
