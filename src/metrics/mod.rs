//! In-process metric families and their Prometheus text exposition.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::{Mutex, PoisonError};

pub const DOMAIN_LABEL: &str = "domain";
pub const HOST_LABEL: &str = "host";
pub const PATH_LABEL: &str = "path";
pub const ADDRESS_LABEL: &str = "address";
pub const STATUS_LABEL: &str = "status";

pub const CERTIFICATE_STATUS_METRIC: &str = "domain_certificate_status";
pub const CERTIFICATE_EXPIRE_DAYS_METRIC: &str = "domain_certificate_expire_days";
pub const WHOIS_STATUS_METRIC: &str = "domain_whois_status";
pub const WHOIS_EXPIRE_DAYS_METRIC: &str = "domain_whois_expire_days";
pub const RESOLVE_STATUS_METRIC: &str = "domain_resolve_status";
pub const RESOLVE_IPS_METRIC: &str = "domain_resolve_ips";
pub const REQUEST_STATUS_METRIC: &str = "domain_request_status";
pub const REQUEST_ERROR_METRIC: &str = "domain_request_error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

const FAMILIES: [(&str, &str, MetricKind); 8] = [
    (
        CERTIFICATE_STATUS_METRIC,
        "Domain certificate status, 0 means error, 1 means OK.",
        MetricKind::Gauge,
    ),
    (
        CERTIFICATE_EXPIRE_DAYS_METRIC,
        "Domain certificate expire days.",
        MetricKind::Gauge,
    ),
    (
        WHOIS_STATUS_METRIC,
        "Domain whois status, 0 means error, 1 means OK.",
        MetricKind::Gauge,
    ),
    (
        WHOIS_EXPIRE_DAYS_METRIC,
        "Domain whois expire days.",
        MetricKind::Gauge,
    ),
    (
        RESOLVE_STATUS_METRIC,
        "Domain resolve status, 0 means error, 1 means OK.",
        MetricKind::Gauge,
    ),
    (
        RESOLVE_IPS_METRIC,
        "Domain resolved IP addresses",
        MetricKind::Gauge,
    ),
    (
        REQUEST_STATUS_METRIC,
        "Domain request status, 0 means error, 1 means OK.",
        MetricKind::Gauge,
    ),
    (
        REQUEST_ERROR_METRIC,
        "Domain request error Log.",
        MetricKind::Counter,
    ),
];

/// Destination of the values produced by the collector.
pub trait MetricsSink: Send + Sync + 'static {
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64);

    fn inc_counter(&self, name: &str, labels: &[(&str, &str)]);

    /// Drops every series, keeping the family descriptions.
    fn reset(&self);

    /// Current value of every series.
    fn snapshot(&self) -> Vec<Sample>;
}

/// One series value at the time of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

type LabelSet = Vec<(String, String)>;

#[derive(Debug)]
struct Family {
    help: &'static str,
    kind: MetricKind,
    series: BTreeMap<LabelSet, f64>,
}

/// Metric families of the exporter, built once at start-up and shared with
/// the collector and the HTTP server.
#[derive(Debug)]
pub struct Registry {
    families: Mutex<BTreeMap<&'static str, Family>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let families = FAMILIES
            .iter()
            .map(|&(name, help, kind)| {
                (
                    name,
                    Family {
                        help,
                        kind,
                        series: BTreeMap::new(),
                    },
                )
            })
            .collect();
        Self {
            families: Mutex::new(families),
        }
    }

    fn update(&self, name: &str, kind: MetricKind, labels: &[(&str, &str)], f: impl FnOnce(&mut f64)) {
        let mut families = self.families.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(family) = families.get_mut(name) else {
            log::warn!("Unknown metric {}", name);
            return;
        };
        if family.kind != kind {
            log::warn!("Metric {} is a {}", name, family.kind.as_str());
            return;
        }
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        f(family.series.entry(labels).or_insert(0.0));
    }

    /// Renders every family in the Prometheus text format, sorted by name.
    /// Families without series only carry their HELP and TYPE lines.
    pub fn render(&self) -> String {
        let families = self.families.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = String::new();
        for (name, family) in families.iter() {
            let _ = writeln!(out, "# HELP {} {}", name, family.help);
            let _ = writeln!(out, "# TYPE {} {}", name, family.kind.as_str());
            for (labels, value) in &family.series {
                let _ = writeln!(out, "{}{} {}", name, format_labels(labels), format_value(*value));
            }
        }
        out
    }
}

impl MetricsSink for Registry {
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        self.update(name, MetricKind::Gauge, labels, |v| *v = value);
    }

    fn inc_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.update(name, MetricKind::Counter, labels, |v| *v += 1.0);
    }

    fn reset(&self) {
        let mut families = self.families.lock().unwrap_or_else(PoisonError::into_inner);
        for family in families.values_mut() {
            family.series.clear();
        }
    }

    fn snapshot(&self) -> Vec<Sample> {
        let families = self.families.lock().unwrap_or_else(PoisonError::into_inner);
        families
            .iter()
            .flat_map(|(name, family)| {
                family.series.iter().map(move |(labels, value)| Sample {
                    name: name.to_string(),
                    labels: labels.clone(),
                    value: *value,
                })
            })
            .collect()
    }
}

fn format_labels(labels: &LabelSet) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();
    format!("{{{}}}", pairs.join(","))
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn format_value(value: f64) -> String {
    if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        value.to_string()
    }
}
