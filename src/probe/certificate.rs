use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_rustls::TlsConnector;
use x509_parser::parse_x509_certificate;

use super::error::{ProbeError, Result};
use super::{ProbeResultSet, ProbeStatus, days_until, report, run_probes};

const HTTPS_PORT: u16 = 443;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_STEP: Duration = Duration::from_secs(1);

/// A certificate check target: the name presented through SNI and the host
/// actually dialled. Both are the same unless the entry carries an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertTarget {
    pub domain: String,
    pub connect_host: String,
}

impl CertTarget {
    /// Parses `domain` or `domain|alias`.
    pub fn parse(entry: &str) -> Self {
        match entry.split('|').collect::<Vec<_>>().as_slice() {
            [domain, alias] => Self {
                domain: domain.trim().to_string(),
                connect_host: alias.trim().to_string(),
            },
            _ => Self {
                domain: entry.trim().to_string(),
                connect_host: entry.trim().to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CertResult {
    pub domain: String,
    pub cname: String,
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    pub expire_at: Option<DateTime<Utc>>,
    pub expire_days: i64,
}

pub type CertResults = ProbeResultSet<CertResult>;

/// Accepts whatever chain the server presents. Only the leaf expiry is of
/// interest here, and expired certificates must still complete the handshake.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Setup a TLS connector that accepts invalid certificates
pub fn setup_tls_connector() -> std::result::Result<TlsConnector, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Checks the expiry of the leaf certificate served on port 443.
#[derive(Clone)]
pub struct CertificatesChecker {
    connector: TlsConnector,
    port: u16,
    timeout: Duration,
    attempts: u32,
    backoff_step: Duration,
    concurrency: Option<usize>,
}

impl CertificatesChecker {
    pub fn new(connector: TlsConnector) -> Self {
        Self {
            connector,
            port: HTTPS_PORT,
            timeout: CONNECT_TIMEOUT,
            attempts: MAX_ATTEMPTS,
            backoff_step: BACKOFF_STEP,
            concurrency: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attempt `n` failing waits `n * backoff_step` before the next one.
    pub fn with_retry(mut self, attempts: u32, backoff_step: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff_step = backoff_step;
        self
    }

    pub fn with_concurrency(mut self, concurrency: Option<usize>) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Probes every entry, keyed by the entry as configured.
    pub async fn check(&self, entries: &[String]) -> CertResults {
        let checker = Arc::new(self.clone());
        run_probes(
            entries.to_vec(),
            |entry| entry.clone(),
            move |entry| {
                let checker = checker.clone();
                async move { checker.check_one_domain(&entry).await }
            },
            self.concurrency,
        )
        .await
    }

    pub async fn check_one_domain(&self, entry: &str) -> CertResult {
        let target = CertTarget::parse(entry);
        let mut ret = CertResult {
            domain: target.domain.clone(),
            cname: target.connect_host.clone(),
            status: ProbeStatus::Error,
            error_msg: None,
            expire_at: None,
            expire_days: 0,
        };

        let mut last = self.get_expire_time(&target).await;
        for attempt in 1..self.attempts {
            if last.is_ok() {
                break;
            }
            sleep(self.backoff_step * attempt).await;
            last = self.get_expire_time(&target).await;
        }

        match last {
            Ok(expire_at) => {
                let days = days_until(expire_at, Utc::now());
                log::info!(
                    "Certificate {} expire after {} days, {}",
                    target.domain,
                    days,
                    expire_at
                );
                ret.status = ProbeStatus::Ok;
                ret.expire_at = Some(expire_at);
                ret.expire_days = days;
            }
            Err(e) => {
                log::warn!("Certificate {} check failed: {}", target.domain, e);
                ret.error_msg = Some(report(&e));
            }
        }
        ret
    }

    /// Returns the not-after time of the first non-CA certificate presented.
    async fn get_expire_time(&self, target: &CertTarget) -> Result<DateTime<Utc>> {
        let server_name = ServerName::try_from(target.domain.clone())
            .map_err(|e| ProbeError::ConnectError(format!("{}: {}", target.domain, e)))?;

        let handshake = async {
            let stream = TcpStream::connect((target.connect_host.as_str(), self.port)).await?;
            self.connector.connect(server_name, stream).await
        };

        let tls_stream = timeout(self.timeout, handshake)
            .await
            .map_err(|_| {
                ProbeError::ConnectError(format!(
                    "connection to {}:{} timed out",
                    target.connect_host, self.port
                ))
            })?
            .map_err(|e| ProbeError::ConnectError(report(&e)))?;

        let peer_certificates = tls_stream.get_ref().1.peer_certificates().unwrap_or_default();
        leaf_expiry(peer_certificates)
    }
}

fn leaf_expiry(chain: &[CertificateDer<'_>]) -> Result<DateTime<Utc>> {
    for der in chain {
        let Ok((_, cert)) = parse_x509_certificate(der.as_ref()) else {
            continue;
        };
        if cert.is_ca() {
            continue;
        }
        let not_after = cert.validity().not_after.timestamp();
        return DateTime::from_timestamp(not_after, 0).ok_or(ProbeError::NoPeerLeafCertificate);
    }
    Err(ProbeError::NoPeerLeafCertificate)
}
