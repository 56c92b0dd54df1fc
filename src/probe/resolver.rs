use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use trust_dns_resolver::{
    TokioAsyncResolver,
    config::{NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts},
};

use super::error::{ProbeError, Result};

/// Host resolution seam used by the resolve and request probes.
pub trait HostResolver: Send + Sync + 'static {
    fn lookup_host(&self, host: &str) -> impl Future<Output = Result<Vec<IpAddr>>> + Send;
}

/// DNS resolver backed by `trust-dns`, either from the system configuration
/// or from an explicit list of name servers.
#[derive(Clone)]
pub struct AddressResolver {
    inner: TokioAsyncResolver,
}

impl AddressResolver {
    /// Uses `/etc/resolv.conf` (or the platform equivalent) and the hosts file.
    pub fn from_system_conf() -> Result<Self> {
        let inner = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| ProbeError::ResolveError(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Queries the given name servers over TCP.
    /// Two attempts with a one second timeout each, results cached.
    pub fn with_name_servers(dns_hosts: &[IpAddr]) -> Self {
        let mut opts = ResolverOpts::default();
        opts.attempts = 2;
        opts.timeout = Duration::from_secs(1);
        opts.cache_size = 1024;

        let mut name_servers = NameServerConfigGroup::new();

        for ip in dns_hosts {
            name_servers.push(NameServerConfig {
                socket_addr: (*ip, 53).into(),
                protocol: Protocol::Tcp,
                tls_dns_name: None,
                trust_negative_responses: false,
                bind_addr: None,
            });
        }

        let resolver_config = ResolverConfig::from_parts(None, vec![], name_servers);
        Self {
            inner: TokioAsyncResolver::tokio(resolver_config, opts),
        }
    }
}

impl HostResolver for AddressResolver {
    async fn lookup_host(&self, host: &str) -> Result<Vec<IpAddr>> {
        let lookup = self
            .inner
            .lookup_ip(host)
            .await
            .map_err(|e| ProbeError::ResolveError(e.to_string()))?;
        Ok(lookup.iter().collect())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::net::IpAddr;

    use super::*;

    /// Resolver answering from a fixed table; unknown names fail.
    #[derive(Default, Clone)]
    pub struct StaticResolver {
        entries: HashMap<String, Vec<IpAddr>>,
    }

    impl StaticResolver {
        pub fn with(mut self, host: &str, addrs: &[&str]) -> Self {
            let addrs = addrs.iter().map(|a| a.parse().unwrap()).collect();
            self.entries.insert(host.to_string(), addrs);
            self
        }
    }

    impl HostResolver for StaticResolver {
        async fn lookup_host(&self, host: &str) -> Result<Vec<IpAddr>> {
            self.entries
                .get(host)
                .cloned()
                .ok_or_else(|| ProbeError::ResolveError(format!("lookup {host}: no such host")))
        }
    }
}
