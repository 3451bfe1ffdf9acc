//! OpenSSL handshake for servers rustls cannot talk to: TLS 1.0/1.1 only,
//! CBC-only, or RSA key exchange only.

use super::classify_io_error;
use crate::util::strip_brackets;
use crate::ProbeError;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode, SslVersion};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::Instant;
use tokio_rustls::rustls::{self, AlertDescription};

/// Everything OpenSSL still implements, weak suites included.
const CIPHER_LIST: &str = "ALL:@SECLEVEL=0";

/// Whether a failed rustls handshake looks like a version or cipher mismatch.
pub(super) fn needs_fallback(err: &io::Error) -> bool {
    let Some(tls_err) = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    else {
        return false;
    };
    matches!(
        tls_err,
        rustls::Error::PeerIncompatible(_)
            | rustls::Error::AlertReceived(
                AlertDescription::HandshakeFailure
                    | AlertDescription::ProtocolVersion
                    | AlertDescription::InsufficientSecurity
                    | AlertDescription::IllegalParameter
            )
    )
}

/// Handshake with `addr` over a fresh connection and return the peer chain.
///
/// OpenSSL is blocking, so this runs on the blocking pool. The socket carries
/// read and write timeouts for whatever is left until `deadline`, so the
/// thread ends on its own if the caller stops waiting.
pub(super) async fn fetch_peer_chain(
    hostname: &str,
    addr: SocketAddr,
    deadline: Instant,
) -> Result<Vec<Vec<u8>>, ProbeError> {
    let host = hostname.to_string();
    tokio::task::spawn_blocking(move || handshake(&host, addr, deadline))
        .await
        .map_err(|e| ProbeError::Internal(format!("OpenSSL handshake task failed: {}", e)))?
}

fn handshake(
    hostname: &str,
    addr: SocketAddr,
    deadline: Instant,
) -> Result<Vec<Vec<u8>>, ProbeError> {
    let port = addr.port();
    let budget = deadline.saturating_duration_since(Instant::now());
    if budget.is_zero() {
        return Err(ProbeError::ConnectionTimedOut {
            host: hostname.to_string(),
            port,
        });
    }

    let mut config = connector()
        .and_then(|c| c.configure())
        .map_err(|e| ProbeError::Internal(format!("OpenSSL configuration rejected: {}", e)))?;
    config.set_verify_hostname(false);

    let tcp = TcpStream::connect_timeout(&addr, budget)
        .map_err(|e| classify_io_error(&e, hostname, port))?;
    tcp.set_read_timeout(Some(budget))
        .and_then(|()| tcp.set_write_timeout(Some(budget)))
        .map_err(|e| classify_io_error(&e, hostname, port))?;

    let stream = config
        .connect(strip_brackets(hostname), tcp)
        .map_err(|e| ProbeError::ConnectionFailed(e.to_string()))?;

    let ssl = stream.ssl();
    tracing::debug!(host = hostname, version = ssl.version_str(), "OpenSSL handshake complete");

    let unreadable = |e: openssl::error::ErrorStack| {
        ProbeError::ConnectionFailed(format!("certificate unreadable: {}", e))
    };
    let mut chain = Vec::new();
    if let Some(stack) = ssl.peer_cert_chain() {
        for cert in stack {
            chain.push(cert.to_der().map_err(unreadable)?);
        }
    } else if let Some(leaf) = ssl.peer_certificate() {
        chain.push(leaf.to_der().map_err(unreadable)?);
    }
    Ok(chain)
}

fn connector() -> Result<SslConnector, openssl::error::ErrorStack> {
    let mut builder = SslConnector::builder(SslMethod::tls())?;
    builder.set_verify(SslVerifyMode::NONE);
    builder.set_min_proto_version(Some(SslVersion::TLS1))?;
    builder.set_cipher_list(CIPHER_LIST)?;
    Ok(builder.build())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_rustls::rustls::PeerIncompatible;

    fn wrapped(err: rustls::Error) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }

    #[test]
    fn version_and_cipher_mismatches_fall_back() {
        assert!(needs_fallback(&wrapped(rustls::Error::PeerIncompatible(
            PeerIncompatible::ServerDoesNotSupportTls12Or13
        ))));
        assert!(needs_fallback(&wrapped(rustls::Error::AlertReceived(
            AlertDescription::HandshakeFailure
        ))));
        assert!(needs_fallback(&wrapped(rustls::Error::AlertReceived(
            AlertDescription::ProtocolVersion
        ))));
    }

    #[test]
    fn other_failures_do_not_fall_back() {
        assert!(!needs_fallback(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!needs_fallback(&wrapped(rustls::Error::AlertReceived(
            AlertDescription::UnrecognisedName
        ))));
        assert!(!needs_fallback(&wrapped(rustls::Error::DecryptError)));
    }

    #[test]
    fn connector_accepts_legacy_settings() {
        assert!(connector().is_ok());
    }

    #[test]
    fn expired_deadline_times_out_without_connecting() {
        let addr = SocketAddr::from(([127, 0, 0, 1], 9));
        let err = handshake("127.0.0.1", addr, Instant::now()).unwrap_err();
        assert!(matches!(err, ProbeError::ConnectionTimedOut { port: 9, .. }));
    }
}
