//! TLS connection and raw chain capture.
//!
//! The handshake runs with peer verification switched off on purpose: the
//! probe has to see expired, self-signed, and incomplete chains in order to
//! report on them. Verification happens afterwards in [`crate::validate_chain`].
//!
//! rustls is tried first. When a server only speaks protocol versions or
//! cipher suites rustls does not implement, the `legacy-tls` feature retries
//! the handshake with OpenSSL at its lowest security level.

#[cfg(feature = "legacy-tls")]
mod legacy;

use crate::util::strip_brackets;
use crate::ProbeError;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_rustls::rustls::{self, pki_types, ClientConfig};
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Connect to `hostname:port`, complete a TLS handshake, and return the
/// server's certificates (DER, in the order they were sent).
///
/// Resolution, connection, and handshake together are bounded by `timeout`.
/// When it elapses the in-flight attempt is dropped, closing its socket, and
/// [`ProbeError::Timeout`] is returned. The TLS stream is closed before this
/// function returns on every path.
pub async fn fetch_peer_chain(
    hostname: &str,
    port: u16,
    timeout: Duration,
) -> Result<Vec<Vec<u8>>, ProbeError> {
    let deadline = Instant::now() + timeout;
    match tokio::time::timeout(timeout, handshake(hostname, port, deadline)).await {
        Ok(result) => result,
        Err(_) => {
            debug!(host = hostname, port, ?timeout, "handshake timed out");
            Err(ProbeError::Timeout {
                host: hostname.to_string(),
                port,
                timeout,
            })
        }
    }
}

#[cfg_attr(not(feature = "legacy-tls"), allow(unused_variables))]
async fn handshake(
    hostname: &str,
    port: u16,
    deadline: Instant,
) -> Result<Vec<Vec<u8>>, ProbeError> {
    let server_name = server_name(hostname)?;
    let tcp = connect_tcp(hostname, port).await?;
    #[cfg(feature = "legacy-tls")]
    let peer = tcp
        .peer_addr()
        .map_err(|e| classify_io_error(&e, hostname, port))?;

    let connector = TlsConnector::from(Arc::new(client_config()?));
    let tls = match connector.connect(server_name, tcp).await {
        Ok(tls) => tls,
        #[cfg(feature = "legacy-tls")]
        Err(e) if legacy::needs_fallback(&e) => {
            debug!(host = hostname, error = %e, "retrying handshake with OpenSSL");
            return legacy::fetch_peer_chain(hostname, peer, deadline).await;
        }
        Err(e) => return Err(classify_io_error(&e, hostname, port)),
    };

    let (_, session) = tls.get_ref();
    debug!(
        host = hostname,
        version = ?session.protocol_version(),
        suite = ?session.negotiated_cipher_suite().map(|s| s.suite()),
        "handshake complete"
    );
    let chain = session
        .peer_certificates()
        .map(|certs| certs.iter().map(|c| c.as_ref().to_vec()).collect())
        .unwrap_or_default();
    drop(tls);

    Ok(chain)
}

fn server_name(hostname: &str) -> Result<pki_types::ServerName<'static>, ProbeError> {
    let host = strip_brackets(hostname);
    pki_types::ServerName::try_from(host.to_string())
        .map_err(|e| ProbeError::InvalidParameter(format!("Invalid domain format: {}", e)))
}

/// Resolve and connect, trying each address in order.
async fn connect_tcp(hostname: &str, port: u16) -> Result<TcpStream, ProbeError> {
    let host = strip_brackets(hostname);
    let not_found = || ProbeError::HostNotFound {
        host: hostname.to_string(),
    };

    let addrs: Vec<_> = match tokio::net::lookup_host((host, port)).await {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            debug!(host = hostname, error = %e, "resolution failed");
            return Err(not_found());
        }
    };

    let mut last_err = None;
    for addr in addrs {
        debug!(host = hostname, %addr, "connecting");
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "connect failed");
                last_err = Some(e);
            }
        }
    }

    match last_err {
        Some(e) => Err(classify_io_error(&e, hostname, port)),
        None => Err(not_found()),
    }
}

/// Map a socket-level error onto the connection failure taxonomy.
fn classify_io_error(err: &io::Error, hostname: &str, port: u16) -> ProbeError {
    let host = hostname.to_string();
    match err.kind() {
        io::ErrorKind::ConnectionRefused => ProbeError::ConnectionRefused { host, port },
        io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
            ProbeError::HostUnreachable { host }
        }
        io::ErrorKind::TimedOut => ProbeError::ConnectionTimedOut { host, port },
        _ => ProbeError::ConnectionFailed(err.to_string()),
    }
}

/// Client configuration that offers every protocol version and cipher suite
/// rustls implements and accepts any server certificate.
fn client_config() -> Result<ClientConfig, ProbeError> {
    let mut provider = rustls::crypto::ring::default_provider();
    provider.cipher_suites = rustls::crypto::ring::ALL_CIPHER_SUITES.to_vec();

    let config = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(rustls::ALL_VERSIONS)
        .map_err(|e| ProbeError::Internal(format!("TLS configuration rejected: {}", e)))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(danger::AcceptAnyServerCert))
        .with_no_client_auth();
    Ok(config)
}

mod danger {
    use tokio_rustls::rustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use tokio_rustls::rustls::{pki_types, DigitallySignedStruct, Error, SignatureScheme};

    /// Accepts every certificate and handshake signature.
    #[derive(Debug)]
    pub(super) struct AcceptAnyServerCert;

    impl ServerCertVerifier for AcceptAnyServerCert {
        fn verify_server_cert(
            &self,
            _: &pki_types::CertificateDer<'_>,
            _: &[pki_types::CertificateDer<'_>],
            _: &pki_types::ServerName<'_>,
            _: &[u8],
            _: pki_types::UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _: &[u8],
            _: &pki_types::CertificateDer<'_>,
            _: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _: &[u8],
            _: &pki_types::CertificateDer<'_>,
            _: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            vec![
                SignatureScheme::RSA_PKCS1_SHA1,
                SignatureScheme::ECDSA_SHA1_Legacy,
                SignatureScheme::RSA_PKCS1_SHA256,
                SignatureScheme::ECDSA_NISTP256_SHA256,
                SignatureScheme::RSA_PKCS1_SHA384,
                SignatureScheme::ECDSA_NISTP384_SHA384,
                SignatureScheme::RSA_PKCS1_SHA512,
                SignatureScheme::ECDSA_NISTP521_SHA512,
                SignatureScheme::RSA_PSS_SHA256,
                SignatureScheme::RSA_PSS_SHA384,
                SignatureScheme::RSA_PSS_SHA512,
                SignatureScheme::ED25519,
                SignatureScheme::ED448,
            ]
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert!(matches!(
            classify_io_error(&refused, "example.com", 443),
            ProbeError::ConnectionRefused { port: 443, .. }
        ));

        let unreachable = io::Error::from(io::ErrorKind::HostUnreachable);
        assert_eq!(
            classify_io_error(&unreachable, "example.com", 443).to_string(),
            "Host unreachable: example.com"
        );

        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(
            classify_io_error(&timed_out, "example.com", 443).to_string(),
            "Connection timed out: example.com:443"
        );

        let other = io::Error::new(io::ErrorKind::InvalidData, "received fatal alert");
        assert_eq!(
            classify_io_error(&other, "example.com", 443).to_string(),
            "Connection failed: received fatal alert"
        );
    }

    #[test]
    fn server_names_accept_dns_and_ip_literals() {
        assert!(server_name("example.com").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(server_name("[::1]").is_ok());
        assert!(server_name("not a host").is_err());
    }

    #[test]
    fn client_config_enables_sni() {
        let config = client_config().unwrap();
        assert!(config.enable_sni);
    }
}
