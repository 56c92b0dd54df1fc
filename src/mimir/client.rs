pub mod prometheus {
    /// The subset of the Prometheus remote-write protobuf messages needed to
    /// push gauge and counter samples.
    pub mod prompb {
        #[derive(Clone, PartialEq, prost::Message)]
        pub struct Label {
            #[prost(string, tag = "1")]
            pub name: String,
            #[prost(string, tag = "2")]
            pub value: String,
        }

        #[derive(Clone, PartialEq, prost::Message)]
        pub struct Sample {
            #[prost(double, tag = "1")]
            pub value: f64,
            #[prost(int64, tag = "2")]
            pub timestamp: i64,
        }

        #[derive(Clone, PartialEq, prost::Message)]
        pub struct TimeSeries {
            #[prost(message, repeated, tag = "1")]
            pub labels: Vec<Label>,
            #[prost(message, repeated, tag = "2")]
            pub samples: Vec<Sample>,
        }

        #[derive(Clone, PartialEq, prost::Message)]
        pub struct WriteRequest {
            #[prost(message, repeated, tag = "1")]
            pub timeseries: Vec<TimeSeries>,
        }
    }
}

use chrono::Utc;
use prometheus::prompb::{Label, Sample, TimeSeries, WriteRequest};
use reqwest::{
    Client,
    header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderValue, InvalidHeaderValue},
};
use snap::raw::Encoder;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MimirError {
    #[error("snappy compression failed: {0}")]
    Compress(#[from] snap::Error),

    #[error("invalid tenant id: {0}")]
    InvalidTenant(#[from] InvalidHeaderValue),

    #[error("push request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("push rejected: {status} - {body}")]
    Rejected { status: u16, body: String },
}

/// Encodes `metrics` as a snappy-compressed remote-write request.
pub fn encode_write_request(metrics: Vec<TimeSeries>) -> Result<Vec<u8>, MimirError> {
    let write_request = WriteRequest {
        timeseries: metrics,
    };
    let buf = prost::Message::encode_to_vec(&write_request);

    let mut encoder = Encoder::new();
    Ok(encoder.compress_vec(&buf)?)
}

/// Sends metrics to the remote-write endpoint of a Mimir instance.
///
/// # Arguments
///
/// * `client` - The HTTP client, shared between pushes.
/// * `mimir_endpoint` - The base URL of the Mimir instance (e.g., "http://localhost:9009").
/// * `tenant_id` - An optional tenant ID for multi-tenant Mimir setups.
/// * `metrics` - The series to send.
pub async fn send_to_mimir(
    client: &Client,
    mimir_endpoint: &str,
    tenant_id: Option<&str>,
    metrics: Vec<TimeSeries>,
) -> Result<(), MimirError> {
    if metrics.is_empty() {
        log::warn!("No metrics to send.");
        return Ok(());
    }

    let compressed_data = encode_write_request(metrics)?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_ENCODING, HeaderValue::from_static("snappy"));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-protobuf"),
    );
    headers.insert(
        "X-Prometheus-Remote-Write-Version",
        HeaderValue::from_static("0.1.0"),
    );
    if let Some(id) = tenant_id {
        headers.insert("X-Scope-OrgID", HeaderValue::from_str(id)?);
    }

    let response = client
        .post(format!("{mimir_endpoint}/api/v1/push"))
        .headers(headers)
        .body(compressed_data)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(MimirError::Rejected { status, body });
    }
    Ok(())
}

/// Builds a single-sample series. Without `timestamp_ms` the current time is
/// used.
pub fn create_time_series(
    metric_name: &str,
    labels: &[(&str, &str)],
    value: f64,
    timestamp_ms: Option<i64>,
) -> TimeSeries {
    let mut all_labels = Vec::with_capacity(labels.len() + 1);
    all_labels.push(Label {
        name: "__name__".to_string(),
        value: metric_name.to_string(),
    });
    all_labels.extend(labels.iter().map(|(name, val)| Label {
        name: name.to_string(),
        value: val.to_string(),
    }));
    // remote write expects labels sorted by name
    all_labels.sort_by(|a, b| a.name.cmp(&b.name));

    TimeSeries {
        labels: all_labels,
        samples: vec![Sample {
            value,
            timestamp: timestamp_ms.unwrap_or_else(|| Utc::now().timestamp_millis()),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_create_time_series() {
        let series = create_time_series(
            "domain_resolve_status",
            &[("domain", "example.com"), ("job", "domain-exporter")],
            1.0,
            Some(1_700_000_000_000),
        );

        let names: Vec<&str> = series.labels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["__name__", "domain", "job"]);
        assert_eq!(series.labels[0].value, "domain_resolve_status");
        assert_eq!(series.samples.len(), 1);
        assert_eq!(series.samples[0].timestamp, 1_700_000_000_000);
    }

    #[test]
    fn test_encoded_request_decodes() {
        let series = create_time_series("domain_whois_expire_days", &[], 42.0, Some(1));
        let compressed = encode_write_request(vec![series.clone()]).unwrap();

        let raw = snap::raw::Decoder::new().decompress_vec(&compressed).unwrap();
        let decoded = WriteRequest::decode(raw.as_slice()).unwrap();
        assert_eq!(decoded.timeseries, vec![series]);
    }

    #[tokio::test]
    async fn test_push_sends_tenant_and_reports_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 4096];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let text = String::from_utf8_lossy(&head).to_lowercase();
            let header_end = text.find("\r\n\r\n").unwrap() + 4;
            let content_length: usize = text
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse().unwrap())
                .unwrap_or(0);
            let mut received = head.len() - header_end;
            while received < content_length {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received += n;
            }
            stream
                .write_all(b"HTTP/1.1 400 Bad Request\r\ncontent-length: 3\r\nconnection: close\r\n\r\nbad")
                .await
                .unwrap();
            text
        });

        let client = Client::builder().no_proxy().build().unwrap();
        let series = create_time_series("domain_resolve_ips", &[], 2.0, None);
        let err = send_to_mimir(&client, &format!("http://{addr}"), Some("ops"), vec![series])
            .await
            .unwrap_err();

        assert!(matches!(err, MimirError::Rejected { status: 400, ref body } if body == "bad"));
        let head = server.await.unwrap();
        assert!(head.starts_with("post /api/v1/push "));
        assert!(head.contains("x-scope-orgid: ops"));
        assert!(head.contains("content-encoding: snappy"));
    }

    #[tokio::test]
    async fn test_empty_push_is_skipped() {
        let client = Client::new();
        assert!(send_to_mimir(&client, "http://127.0.0.1:1", None, vec![]).await.is_ok());
    }
}
