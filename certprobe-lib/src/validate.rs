//! Ordered structural checks over a linearized chain.
//!
//! The checks run in a fixed order and the first failure decides the
//! verdict:
//!
//! 1. presence of a leaf certificate
//! 2. leaf expiry
//! 3. completeness (at least one certificate above the leaf)
//! 4. hostname identity of the leaf
//! 5. issuer/subject linkage of every adjacent pair
//! 6. root self-signature (by name)
//!
//! Expiry runs before completeness, so an expired lone leaf reports as
//! expired rather than incomplete.

use crate::fields::{dn_equal, Certificate};
use crate::util::{dns_name_matches, strip_brackets};
use crate::verdict::ValidSummary;
use crate::walk::Chain;
use crate::ProbeError;
use std::net::IpAddr;

/// Run all checks against `chain` for `hostname`, at Unix time `now`.
pub fn validate_chain(
    chain: &Chain,
    hostname: &str,
    now: i64,
) -> Result<ValidSummary, ProbeError> {
    let leaf = check_presence(chain)?;
    check_expiry(leaf, now)?;
    check_completeness(chain)?;
    match_hostname(leaf, hostname).map_err(ProbeError::HostnameMismatch)?;
    check_linkage(chain)?;
    check_root_self_signed(chain)?;
    Ok(ValidSummary::new(leaf, chain.len()))
}

fn check_presence(chain: &Chain) -> Result<&Certificate, ProbeError> {
    match chain.leaf() {
        Some(leaf) if !leaf.raw_der.is_empty() => Ok(leaf),
        _ => Err(ProbeError::NoCertificate),
    }
}

fn check_expiry(leaf: &Certificate, now: i64) -> Result<(), ProbeError> {
    if now > leaf.not_after.timestamp {
        return Err(ProbeError::Expired {
            expired_at: leaf.not_after.iso8601.clone(),
        });
    }
    Ok(())
}

// A lone self-signed leaf is incomplete too: it flags servers that omit
// their intermediates.
fn check_completeness(chain: &Chain) -> Result<(), ProbeError> {
    if chain.len() < 2 || chain.is_truncated() {
        return Err(ProbeError::ChainIncomplete);
    }
    Ok(())
}

fn check_linkage(chain: &Chain) -> Result<(), ProbeError> {
    for (index, pair) in chain.certificates().windows(2).enumerate() {
        if let [subject, issuer] = pair {
            if !dn_equal(&issuer.subject, &subject.issuer) {
                return Err(ProbeError::IssuerMismatch { index });
            }
        }
    }
    Ok(())
}

fn check_root_self_signed(chain: &Chain) -> Result<(), ProbeError> {
    match chain.root() {
        Some(root) if root.is_self_issued() => Ok(()),
        _ => Err(ProbeError::RootNotSelfSigned),
    }
}

/// Check that `hostname` is one of the names `cert` was issued for.
///
/// IP literals are compared against SAN IP entries only. DNS names are
/// matched against SAN DNS entries, falling back to the subject CN only when
/// the certificate carries no SAN DNS entries at all. On mismatch the error
/// names both the host and the certificate's names.
pub fn match_hostname(cert: &Certificate, hostname: &str) -> Result<(), String> {
    let host = strip_brackets(hostname);

    if let Ok(ip) = host.parse::<IpAddr>() {
        if cert.ip_addresses.contains(&ip) {
            return Ok(());
        }
        let listed = cert
            .ip_addresses
            .iter()
            .map(|ip| format!("IP Address:{}", ip))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(format!(
            "Hostname/IP does not match certificate's altnames: IP: {} is not in the cert's list: {}",
            host, listed
        ));
    }

    if !cert.dns_names.is_empty() {
        if cert.dns_names.iter().any(|name| dns_name_matches(name, host)) {
            return Ok(());
        }
        let listed = cert
            .dns_names
            .iter()
            .map(|name| format!("DNS:{}", name))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(format!(
            "Hostname/IP does not match certificate's altnames: Host: {}. is not in the cert's altnames: {}",
            host, listed
        ));
    }

    match cert.common_name() {
        Some(cn) if dns_name_matches(cn, host) => Ok(()),
        Some(cn) => Err(format!(
            "Hostname/IP does not match certificate's altnames: Host: {}. is not cert's CN: {}",
            host, cn
        )),
        None => Err(format!(
            "Hostname/IP does not match certificate's altnames: Host: {}. certificate has no DNS names",
            host
        )),
    }
}
