pub mod certificate;
pub mod error;
pub mod harness;
pub mod request;
pub mod resolve;
pub mod resolver;
pub mod whois;

use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use error::ProbeError;
pub use harness::{ProbeResultSet, run_probes};

/// Outcome status shared by every probe kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProbeStatus {
    #[serde(rename = "OK")]
    Ok,
    Error,
}

impl ProbeStatus {
    /// Gauge value published for this status: 1 for OK, 0 otherwise.
    pub fn as_gauge(self) -> f64 {
        match self {
            ProbeStatus::Ok => 1.0,
            ProbeStatus::Error => 0.0,
        }
    }
}

/// Flattens an error and its sources into one line.
pub(crate) fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let _ = write!(s, ": {}", src);
        err = src;
    }
    s
}

/// Whole days from `now` until `expiry`, rounded towards negative infinity.
pub(crate) fn days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry - now).num_seconds().div_euclid(86_400)
}
