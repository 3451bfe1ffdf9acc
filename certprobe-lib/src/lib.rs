//! certprobe-lib: fetch the certificate chain a TLS server presents and
//! classify what is wrong with it.
//!
//! The probe deliberately accepts any certificate during the handshake so it
//! can report on broken servers instead of refusing them. The captured chain
//! is then linearized and run through ordered structural checks (expiry,
//! completeness, hostname identity, issuer/subject linkage, root
//! self-signature), ending in a [`Verdict`] with a stable numeric
//! [`ErrorCode`].

mod connector;
mod fields;
mod fingerprint;
mod oid;
mod parser;
mod probe;
mod util;
mod validate;
mod verdict;
mod walk;

use std::time::Duration;

pub use connector::fetch_peer_chain;
pub use fields::{dn_equal, Certificate, DateTime, DistinguishedName, SUMMARY_ATTRIBUTES};
pub use fingerprint::compute_fingerprint;
pub use parser::{parse_der, parse_pem_chain};
pub use probe::{
    probe, unix_now, validate_presented, ProbeConfig, DEFAULT_PORT, DEFAULT_TIMEOUT,
};
pub use util::{dns_name_matches, is_valid_domain};
pub use validate::{match_hostname, validate_chain};
pub use verdict::{ErrorCode, Response, ResponseData, ValidSummary, Verdict};
pub use walk::{Chain, PresentedChain, MAX_CHAIN_HOPS};

/// Errors returned by certprobe-lib.
///
/// The `Display` text of each variant is the operator-facing message that
/// ends up in the verdict.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{0}")]
    InvalidParameter(String),

    #[error("Domain not found: {host}")]
    HostNotFound { host: String },

    #[error("Connection refused: {host}:{port}")]
    ConnectionRefused { host: String, port: u16 },

    #[error("Host unreachable: {host}")]
    HostUnreachable { host: String },

    #[error("Connection timed out: {host}:{port}")]
    ConnectionTimedOut { host: String, port: u16 },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timeout ({timeout:?}) to {host}:{port}")]
    Timeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    #[error("No certificate presented by server")]
    NoCertificate,

    #[error("Certificate expired on {expired_at}")]
    Expired { expired_at: String },

    #[error("Certificate chain is incomplete: missing intermediate certificate(s)")]
    ChainIncomplete,

    #[error("Validation error: {0}")]
    HostnameMismatch(String),

    #[error("Issuer/Subject mismatch between certificate {index} and {}", .index + 1)]
    IssuerMismatch { index: usize },

    #[error("Root certificate is not self-signed")]
    RootNotSelfSigned,

    #[error("Failed to parse certificate: {0}")]
    Parse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProbeError {
    /// The external result code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidParameter(_) => ErrorCode::InvalidParameter,
            Self::HostNotFound { .. }
            | Self::ConnectionRefused { .. }
            | Self::HostUnreachable { .. }
            | Self::ConnectionTimedOut { .. }
            | Self::ConnectionFailed(_) => ErrorCode::ConnectionFailed,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::NoCertificate => ErrorCode::NoCertificate,
            Self::Expired { .. } => ErrorCode::Expired,
            Self::ChainIncomplete => ErrorCode::MissingIntermediate,
            Self::HostnameMismatch(_) | Self::IssuerMismatch { .. } | Self::RootNotSelfSigned => {
                ErrorCode::ValidationFailed
            }
            Self::Parse(_) | Self::Internal(_) => ErrorCode::InternalError,
        }
    }
}
