use client::prometheus::prompb;
use reqwest::Client;

use crate::metrics::{MetricsSink, Sample};

pub mod client;

pub use client::MimirError;

const JOB_LABEL: &str = "job";
const EXPORTER_JOB: &str = "domain-exporter";

/// Pushes the samples of a metrics sink to Mimir after each collection.
#[derive(Debug, Clone)]
pub struct MimirPusher {
    client: Client,
    endpoint: String,
    tenant: Option<String>,
}

impl MimirPusher {
    pub fn new(endpoint: impl Into<String>, tenant: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            tenant,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn push<S: MetricsSink + ?Sized>(&self, sink: &S) -> Result<(), MimirError> {
        let metrics = create_sink_metrics(&sink.snapshot(), None);
        client::send_to_mimir(&self.client, &self.endpoint, self.tenant.as_deref(), metrics).await
    }
}

/// Converts sink samples into one series each, tagged with the exporter job.
/// All series share one timestamp.
pub fn create_sink_metrics(samples: &[Sample], timestamp_ms: Option<i64>) -> Vec<prompb::TimeSeries> {
    let timestamp_ms = timestamp_ms.unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
    samples
        .iter()
        .map(|sample| {
            let mut labels: Vec<(&str, &str)> = sample
                .labels
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            labels.push((JOB_LABEL, EXPORTER_JOB));
            client::create_time_series(&sample.name, &labels, sample.value, Some(timestamp_ms))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{DOMAIN_LABEL, RESOLVE_IPS_METRIC, RESOLVE_STATUS_METRIC, Registry};

    #[test]
    fn test_sink_samples_become_series() {
        let registry = Registry::new();
        registry.set_gauge(RESOLVE_STATUS_METRIC, &[(DOMAIN_LABEL, "example.com")], 1.0);
        registry.set_gauge(RESOLVE_IPS_METRIC, &[(DOMAIN_LABEL, "example.com")], 3.0);

        let series = create_sink_metrics(&registry.snapshot(), Some(1000));
        assert_eq!(series.len(), 2);

        let ips = series
            .iter()
            .find(|s| s.labels.iter().any(|l| l.value == RESOLVE_IPS_METRIC))
            .unwrap();
        assert_eq!(ips.samples[0].value, 3.0);
        assert_eq!(ips.samples[0].timestamp, 1000);
        assert!(ips.labels.iter().any(|l| l.name == "job" && l.value == "domain-exporter"));
        assert!(ips.labels.iter().any(|l| l.name == "domain" && l.value == "example.com"));
    }

    #[test]
    fn test_empty_sink() {
        assert!(create_sink_metrics(&[], None).is_empty());
    }
}
