//! End-to-end probe: connect, walk, validate, classify.

use crate::connector::fetch_peer_chain;
use crate::parser::parse_der;
use crate::validate::validate_chain;
use crate::verdict::{ValidSummary, Verdict};
use crate::walk::{Chain, PresentedChain, MAX_CHAIN_HOPS};
use crate::ProbeError;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Port probed unless configured otherwise.
pub const DEFAULT_PORT: u16 = 443;

/// Wall-clock bound on resolve + connect + handshake.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options controlling a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub port: u16,
    pub timeout: Duration,
    /// Hop cap for the chain walk.
    pub max_hops: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            max_hops: MAX_CHAIN_HOPS,
        }
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Probe `hostname` and classify what it presents.
///
/// The pipeline runs in its own task. A panic inside it becomes an internal
/// error verdict instead of propagating to the caller. Dropping the returned
/// future does not stop the task; it still ends, and closes its socket, by
/// its own timeout.
pub async fn probe(hostname: &str, config: &ProbeConfig) -> Verdict {
    let host = hostname.to_string();
    let config = config.clone();
    let task = tokio::spawn(async move { run_pipeline(&host, &config).await });

    match task.await {
        Ok(result) => {
            if let Err(e) = &result {
                debug!(host = hostname, code = %e.code(), error = %e, "probe failed");
            }
            Verdict::from(result)
        }
        Err(join_err) => {
            warn!(host = hostname, error = %join_err, "probe task aborted");
            Verdict::from(ProbeError::Internal(join_err.to_string()))
        }
    }
}

async fn run_pipeline(hostname: &str, config: &ProbeConfig) -> Result<ValidSummary, ProbeError> {
    let ders = fetch_peer_chain(hostname, config.port, config.timeout).await?;
    debug!(host = hostname, certificates = ders.len(), "chain received");
    validate_presented(&ders, hostname, unix_now(), config.max_hops)
}

/// Parse, walk, and validate a chain that has already been captured.
///
/// `ders` is in presentation order with the leaf first. A missing or empty
/// leaf is reported by the presence check. A certificate that fails to parse
/// is the server's fault, so it is reported as a failed connection naming
/// its position.
pub fn validate_presented(
    ders: &[Vec<u8>],
    hostname: &str,
    now: i64,
    max_hops: usize,
) -> Result<ValidSummary, ProbeError> {
    let chain = match ders.first() {
        Some(leaf) if !leaf.is_empty() => {
            let certs = ders
                .iter()
                .enumerate()
                .map(|(i, der)| {
                    parse_der(der).map_err(|e| {
                        let detail = format!("certificate {} unreadable: {}", i, e);
                        ProbeError::ConnectionFailed(detail)
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            PresentedChain::link(certs).walk(max_hops)
        }
        _ => Chain::default(),
    };
    debug!(
        chain_length = chain.len(),
        truncated = chain.is_truncated(),
        "chain walked"
    );
    validate_chain(&chain, hostname, now)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::verdict::ErrorCode;

    #[test]
    fn defaults() {
        let config = ProbeConfig::default();
        assert_eq!(config.port, 443);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_hops, 16);
    }

    #[test]
    fn nothing_presented_means_no_certificate() {
        let err = validate_presented(&[], "example.com", 0, MAX_CHAIN_HOPS).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoCertificate);

        let err = validate_presented(&[Vec::new()], "example.com", 0, MAX_CHAIN_HOPS).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoCertificate);
    }

    #[test]
    fn unreadable_certificate_is_a_connection_failure() {
        let err =
            validate_presented(&[b"junk".to_vec()], "example.com", 0, MAX_CHAIN_HOPS).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConnectionFailed);
        assert!(err.code().is_probe_outcome());
        assert!(err.to_string().starts_with("Connection failed: certificate 0 unreadable"));
    }

    #[test]
    fn unreadable_extra_certificate_is_a_connection_failure() {
        let key = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec!["example.com".to_string()]).unwrap();
        let leaf = params.self_signed(&key).unwrap().der().to_vec();

        let ders = vec![leaf, b"\x30\x03\x02\x01\x00".to_vec()];
        let err = validate_presented(&ders, "example.com", 0, MAX_CHAIN_HOPS).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConnectionFailed);
        assert!(err.to_string().contains("certificate 1 unreadable"));
    }
}
