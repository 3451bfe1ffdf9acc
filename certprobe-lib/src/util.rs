//! Shared encoding, naming, and hostname-matching utilities.

use crate::oid;

/// Format bytes as colon-separated uppercase hex (e.g., "AB:CD:EF").
pub fn hex_colon_upper(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Render a Unix timestamp as ISO 8601 UTC with millisecond precision,
/// e.g. `2024-05-01T12:00:00.000Z`.
///
/// Falls back to the bare number for timestamps outside the representable
/// calendar range.
pub fn iso8601(timestamp: i64) -> String {
    match ::time::OffsetDateTime::from_unix_timestamp(timestamp) {
        Ok(dt) => format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
            dt.year(),
            u8::from(dt.month()),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second(),
            dt.millisecond()
        ),
        Err(_) => format!("{}", timestamp),
    }
}

/// Map a name attribute OID to its conventional short name.
///
/// Unknown OIDs are returned in dotted-decimal form.
pub fn oid_short_name(oid_str: &str) -> String {
    match oid_str {
        oid::COMMON_NAME => "CN",
        oid::SURNAME => "SN",
        oid::SERIAL_NUMBER => "serialNumber",
        oid::COUNTRY => "C",
        oid::LOCALITY => "L",
        oid::STATE_OR_PROVINCE => "ST",
        oid::STREET_ADDRESS => "street",
        oid::ORGANIZATION => "O",
        oid::ORGANIZATIONAL_UNIT => "OU",
        oid::TITLE => "title",
        oid::POSTAL_CODE => "postalCode",
        oid::GIVEN_NAME => "GN",
        oid::EMAIL_ADDRESS => "emailAddress",
        oid::DOMAIN_COMPONENT => "DC",
        oid::USER_ID => "UID",
        oid::JURISDICTION_COUNTRY => "jurisdictionC",
        oid::BUSINESS_CATEGORY => "businessCategory",
        other => other,
    }
    .to_string()
}

/// Remove one pair of enclosing brackets from an IPv6 literal (`[::1]`).
pub(crate) fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// Normalize a DNS name for comparison: ASCII lowercase, trailing dot removed.
fn normalize_dns(name: &str) -> String {
    name.strip_suffix('.').unwrap_or(name).to_ascii_lowercase()
}

/// Match a hostname against a certificate DNS name, RFC 6125 style.
///
/// A wildcard is only honoured as the entire left-most label and covers
/// exactly one label, so `*.example.com` matches `foo.example.com` but not
/// `example.com` or `foo.bar.example.com`. Wildcards directly above a
/// single label (`*.com`) never match.
pub fn dns_name_matches(pattern: &str, hostname: &str) -> bool {
    let pattern = normalize_dns(pattern);
    let hostname = normalize_dns(hostname);
    if pattern.is_empty() || hostname.is_empty() {
        return false;
    }

    let Some(base) = pattern.strip_prefix("*.") else {
        return !pattern.contains('*') && pattern == hostname;
    };
    if base.contains('*') || !base.contains('.') {
        return false;
    }

    match hostname.split_once('.') {
        Some((label, rest)) => !label.is_empty() && rest == base,
        None => false,
    }
}

/// Check whether `domain` is a syntactically valid DNS name or IP literal.
///
/// Labels are 1-63 characters of ASCII letters, digits, `-` or `_`, must not
/// start or end with `-`, and the whole name is at most 253 characters
/// (a single trailing dot is allowed).
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }
    let name = domain.strip_suffix('.').unwrap_or(domain);
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    })
}
