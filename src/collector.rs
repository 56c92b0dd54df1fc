use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::sleep;
use tokio_rustls::TlsConnector;
use unicode_truncate::UnicodeTruncateStr;

use crate::config::probe_config::Config;
use crate::metrics::{
    ADDRESS_LABEL, CERTIFICATE_EXPIRE_DAYS_METRIC, CERTIFICATE_STATUS_METRIC, DOMAIN_LABEL,
    HOST_LABEL, MetricsSink, PATH_LABEL, REQUEST_ERROR_METRIC, REQUEST_STATUS_METRIC,
    RESOLVE_IPS_METRIC, RESOLVE_STATUS_METRIC, STATUS_LABEL, WHOIS_EXPIRE_DAYS_METRIC,
    WHOIS_STATUS_METRIC,
};
use crate::mimir::MimirPusher;
use crate::probe::ProbeStatus;
use crate::probe::certificate::{CertResults, CertificatesChecker};
use crate::probe::request::{RequestChecker, RequestResults};
use crate::probe::resolve::{ResolveChecker, ResolveResults};
use crate::probe::resolver::HostResolver;
use crate::probe::whois::{WhoisChecker, WhoisResults};

const KIND_WIDTH: usize = 11;

pub(crate) fn to_fixed_width(input: &str, width: usize) -> String {
    let (truncated, _) = input.unicode_truncate(width);
    format!("{:<width$}", truncated, width = width)
}

/// Runs the four probe kinds against the current configuration and writes
/// their outcomes into the metrics sink.
pub struct Collector<R, S: ?Sized> {
    config: Arc<RwLock<Config>>,
    resolver: Arc<R>,
    connector: TlsConnector,
    sink: Arc<S>,
    mimir: Option<MimirPusher>,
}

impl<R, S: ?Sized> Clone for Collector<R, S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            resolver: self.resolver.clone(),
            connector: self.connector.clone(),
            sink: self.sink.clone(),
            mimir: self.mimir.clone(),
        }
    }
}

impl<R: HostResolver, S: MetricsSink + ?Sized> Collector<R, S> {
    pub fn new(
        config: Arc<RwLock<Config>>,
        resolver: Arc<R>,
        connector: TlsConnector,
        sink: Arc<S>,
    ) -> Self {
        Self {
            config,
            resolver,
            connector,
            sink,
            mimir: None,
        }
    }

    pub fn with_mimir(mut self, mimir: Option<MimirPusher>) -> Self {
        self.mimir = mimir;
        self
    }

    /// Collects, then sleeps for the configured interval, forever. The
    /// interval is read again each cycle so that reloads apply.
    pub async fn run(self) {
        loop {
            self.collect_once().await;
            let interval = self.config.read().await.collect_interval();
            log::debug!("Next collection in {}s", interval.as_secs());
            sleep(interval).await;
        }
    }

    /// Runs all probe kinds concurrently and waits for every one of them,
    /// then pushes the sink to Mimir when configured.
    pub async fn collect_once(&self) {
        let config = self.config.read().await.clone();

        tokio::join!(
            self.collect_certificates(&config),
            self.collect_domains(&config),
            self.collect_resolves(&config),
            self.collect_requests(&config),
        );

        if let Some(mimir) = &self.mimir {
            match mimir.push(self.sink.as_ref()).await {
                Ok(()) => log::debug!("Pushed metrics to {}", mimir.endpoint()),
                Err(e) => log::error!("Failed to push metrics to {}: {}", mimir.endpoint(), e),
            }
        }
    }

    async fn collect_certificates(&self, config: &Config) {
        let kind = to_fixed_width("certificate", KIND_WIDTH);
        log::info!("[{kind}] Collect {} domains", config.certificate_domains.len());
        let results = CertificatesChecker::new(self.connector.clone())
            .with_concurrency(config.probe_concurrency)
            .check(&config.certificate_domains)
            .await;
        record_certificates(self.sink.as_ref(), &results);
        log::info!("[{kind}] Finished, {} failed", failed(results.values().map(|r| r.status)));
    }

    async fn collect_domains(&self, config: &Config) {
        let kind = to_fixed_width("whois", KIND_WIDTH);
        log::info!("[{kind}] Collect {} domains", config.whois_domains.len());
        let results = WhoisChecker::new()
            .with_servers(config.whois_servers.clone())
            .with_strict(config.strict_whois)
            .with_concurrency(config.probe_concurrency)
            .check(&config.whois_domains)
            .await;
        record_whois(self.sink.as_ref(), &results);
        log::info!("[{kind}] Finished, {} failed", failed(results.values().map(|r| r.status)));
    }

    async fn collect_resolves(&self, config: &Config) {
        let kind = to_fixed_width("resolve", KIND_WIDTH);
        log::info!("[{kind}] Collect {} domains", config.resolve_domains.len());
        let results = ResolveChecker::new(self.resolver.clone())
            .with_concurrency(config.probe_concurrency)
            .check(&config.resolve_domains)
            .await;
        record_resolves(self.sink.as_ref(), &results);
        log::info!("[{kind}] Finished, {} failed", failed(results.values().map(|r| r.status)));
    }

    async fn collect_requests(&self, config: &Config) {
        let kind = to_fixed_width("request", KIND_WIDTH);
        let targets = config.request_targets();
        log::info!("[{kind}] Collect {} targets", targets.len());
        let results = RequestChecker::new(self.resolver.clone())
            .with_concurrency(config.probe_concurrency)
            .check(targets)
            .await;
        record_requests(self.sink.as_ref(), &results);
        log::info!("[{kind}] Finished, {} failed", failed(results.values().map(|r| r.status)));
    }
}

fn failed(statuses: impl Iterator<Item = ProbeStatus>) -> usize {
    statuses.filter(|s| *s == ProbeStatus::Error).count()
}

// Every family is labelled with the result set key.

pub fn record_certificates<S: MetricsSink + ?Sized>(sink: &S, results: &CertResults) {
    for (key, result) in results {
        let labels = [(DOMAIN_LABEL, key.as_str())];
        sink.set_gauge(CERTIFICATE_STATUS_METRIC, &labels, result.status.as_gauge());
        sink.set_gauge(CERTIFICATE_EXPIRE_DAYS_METRIC, &labels, result.expire_days as f64);
    }
}

pub fn record_whois<S: MetricsSink + ?Sized>(sink: &S, results: &WhoisResults) {
    for (key, result) in results {
        let labels = [(DOMAIN_LABEL, key.as_str())];
        sink.set_gauge(WHOIS_STATUS_METRIC, &labels, result.status.as_gauge());
        sink.set_gauge(WHOIS_EXPIRE_DAYS_METRIC, &labels, result.expire_days as f64);
    }
}

pub fn record_resolves<S: MetricsSink + ?Sized>(sink: &S, results: &ResolveResults) {
    for (key, result) in results {
        let labels = [(DOMAIN_LABEL, key.as_str())];
        sink.set_gauge(RESOLVE_STATUS_METRIC, &labels, result.status.as_gauge());
        sink.set_gauge(RESOLVE_IPS_METRIC, &labels, result.ips.len() as f64);
    }
}

/// Sets the request status and, for failed requests, counts one error under
/// the contacted address and status code.
pub fn record_requests<S: MetricsSink + ?Sized>(sink: &S, results: &RequestResults) {
    for (key, result) in results {
        sink.set_gauge(
            REQUEST_STATUS_METRIC,
            &[
                (DOMAIN_LABEL, key.as_str()),
                (HOST_LABEL, result.host.as_str()),
                (PATH_LABEL, result.path.as_str()),
            ],
            result.status.as_gauge(),
        );
        if result.status == ProbeStatus::Error {
            let status_code = result.status_code.to_string();
            sink.inc_counter(
                REQUEST_ERROR_METRIC,
                &[
                    (DOMAIN_LABEL, key.as_str()),
                    (HOST_LABEL, result.host.as_str()),
                    (PATH_LABEL, result.path.as_str()),
                    (ADDRESS_LABEL, result.address.as_str()),
                    (STATUS_LABEL, status_code.as_str()),
                ],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Registry, Sample};
    use crate::probe::certificate::{CertResult, setup_tls_connector};
    use crate::probe::request::RequestResult;
    use crate::probe::resolver::test_support::StaticResolver;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        gauges: Mutex<Vec<Sample>>,
        counters: Mutex<Vec<Sample>>,
    }

    fn sample(name: &str, labels: &[(&str, &str)], value: f64) -> Sample {
        Sample {
            name: name.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value,
        }
    }

    impl MetricsSink for RecordingSink {
        fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
            self.gauges.lock().unwrap().push(sample(name, labels, value));
        }

        fn inc_counter(&self, name: &str, labels: &[(&str, &str)]) {
            self.counters.lock().unwrap().push(sample(name, labels, 1.0));
        }

        fn reset(&self) {
            self.gauges.lock().unwrap().clear();
            self.counters.lock().unwrap().clear();
        }

        fn snapshot(&self) -> Vec<Sample> {
            let mut all = self.gauges.lock().unwrap().clone();
            all.extend(self.counters.lock().unwrap().iter().cloned());
            all
        }
    }

    #[test]
    fn test_to_fixed_width() {
        assert_eq!(to_fixed_width("whois", 8), "whois   ");
        assert_eq!(to_fixed_width("certificate", 4), "cert");
    }

    #[test]
    fn test_record_certificates_uses_entry_as_label() {
        let sink = RecordingSink::default();
        let mut results = HashMap::new();
        results.insert(
            "example.com|edge.example.net".to_string(),
            CertResult {
                domain: "example.com".to_string(),
                cname: "edge.example.net".to_string(),
                status: ProbeStatus::Ok,
                error_msg: None,
                expire_at: None,
                expire_days: 30,
            },
        );

        record_certificates(&sink, &results);

        let gauges = sink.gauges.lock().unwrap();
        assert_eq!(gauges.len(), 2);
        assert!(gauges.contains(&sample(
            CERTIFICATE_STATUS_METRIC,
            &[(DOMAIN_LABEL, "example.com|edge.example.net")],
            1.0
        )));
        assert!(gauges.contains(&sample(
            CERTIFICATE_EXPIRE_DAYS_METRIC,
            &[(DOMAIN_LABEL, "example.com|edge.example.net")],
            30.0
        )));
    }

    #[test]
    fn test_record_requests_counts_errors_only() {
        let sink = RecordingSink::default();
        let ok = RequestResult {
            domain: "lb1.example.net".to_string(),
            status: ProbeStatus::Ok,
            host: "www.example.com".to_string(),
            path: "/".to_string(),
            address: "192.0.2.1".to_string(),
            status_code: 200,
            error_msg: None,
        };
        let failed = RequestResult {
            domain: "lb2.example.net".to_string(),
            status: ProbeStatus::Error,
            address: "192.0.2.2".to_string(),
            status_code: 503,
            error_msg: Some("status not equals to 200, 503".to_string()),
            ..ok.clone()
        };
        let mut results = HashMap::new();
        results.insert("www.example.com @ lb1.example.net".to_string(), ok);
        results.insert("www.example.com @ lb2.example.net".to_string(), failed);

        record_requests(&sink, &results);

        let gauges = sink.gauges.lock().unwrap();
        assert_eq!(gauges.len(), 2);
        assert!(gauges.contains(&sample(
            REQUEST_STATUS_METRIC,
            &[
                (DOMAIN_LABEL, "www.example.com @ lb2.example.net"),
                (HOST_LABEL, "www.example.com"),
                (PATH_LABEL, "/"),
            ],
            0.0
        )));

        let counters = sink.counters.lock().unwrap();
        assert_eq!(
            *counters,
            vec![sample(
                REQUEST_ERROR_METRIC,
                &[
                    (DOMAIN_LABEL, "www.example.com @ lb2.example.net"),
                    (HOST_LABEL, "www.example.com"),
                    (PATH_LABEL, "/"),
                    (ADDRESS_LABEL, "192.0.2.2"),
                    (STATUS_LABEL, "503"),
                ],
                1.0
            )]
        );
    }

    #[tokio::test]
    async fn test_collect_once_resolves_into_registry() {
        let config = Config {
            collect_duration: 600,
            resolve_domains: vec!["example.com".to_string(), "missing.example".to_string()],
            ..Default::default()
        };
        let resolver = StaticResolver::default().with("example.com", &["192.0.2.1", "192.0.2.2"]);
        let registry = Arc::new(Registry::new());
        let collector = Collector::new(
            Arc::new(RwLock::new(config)),
            Arc::new(resolver),
            setup_tls_connector().unwrap(),
            registry.clone(),
        );

        collector.collect_once().await;

        let text = registry.render();
        assert!(text.contains("domain_resolve_status{domain=\"example.com\"} 1\n"));
        assert!(text.contains("domain_resolve_ips{domain=\"example.com\"} 2\n"));
        assert!(text.contains("domain_resolve_status{domain=\"missing.example\"} 0\n"));
        assert!(text.contains("domain_resolve_ips{domain=\"missing.example\"} 0\n"));
        assert!(!text.contains("domain_certificate_status{"));
    }
}
