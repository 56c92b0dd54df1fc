use thiserror::Error;

/// Failure of a single probe unit.
///
/// These never escape the harness: every variant is turned into an `Error`
/// outcome carrying the rendered message.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    ConnectError(String),

    #[error("domain name {0} is malformed")]
    MalformedDomain(String),

    #[error("no whois server for zone {0}")]
    NoWhoisServer(String),

    #[error("domain {0} has no IP addresses")]
    NoAddresses(String),

    #[error("invalid certificate: no peer leaf certificate")]
    NoPeerLeafCertificate,

    #[error("status not equals to 200, {0}")]
    HttpStatusMismatch(u16),

    #[error("resolve failed: {0}")]
    ResolveError(String),

    #[error("failed to read response body: {0}")]
    BodyReadError(String),

    #[error("unparsable whois response from {0}")]
    UnparsableResponse(String),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
