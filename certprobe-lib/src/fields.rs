//! Certificate data types as seen by the probe.

use std::collections::BTreeMap;
use std::net::IpAddr;

/// Name attributes reported in the success summary; everything else is dropped.
pub const SUMMARY_ATTRIBUTES: &[&str] = &["CN", "O", "OU", "C", "L", "ST"];

/// An immutable view of one certificate the server presented.
#[derive(Debug, Clone)]
pub struct Certificate {
    /// Subject distinguished name.
    pub subject: DistinguishedName,
    /// Issuer distinguished name.
    pub issuer: DistinguishedName,
    /// Validity end date.
    pub not_after: DateTime,
    /// DNS names from the Subject Alternative Name extension.
    pub dns_names: Vec<String>,
    /// IP addresses from the Subject Alternative Name extension.
    pub ip_addresses: Vec<IpAddr>,
    /// SHA-256 fingerprint of `raw_der`, colon-separated uppercase hex.
    pub fingerprint: String,

    /// Raw DER bytes exactly as received.
    pub raw_der: Vec<u8>,
}

impl Certificate {
    /// Whether subject and issuer names are equal.
    pub fn is_self_issued(&self) -> bool {
        dn_equal(&self.subject, &self.issuer)
    }

    /// The first Common Name in the subject, if any.
    pub fn common_name(&self) -> Option<&str> {
        self.subject.get("CN")
    }
}

/// Distinguished name with ordered components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    /// Ordered list of (attribute_type, value) pairs.
    /// Attribute types use short names where known (e.g., "CN", "O", "C").
    pub components: Vec<(String, String)>,
}

impl DistinguishedName {
    pub fn new<K, V>(components: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            components: components
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// First value recorded for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value recorded for `key`, in order.
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.components
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Reduce to the summary attributes (CN, O, OU, C, L, ST), first value wins.
    pub fn summary(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (k, v) in &self.components {
            if SUMMARY_ATTRIBUTES.contains(&k.as_str()) {
                out.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        out
    }

    /// Format as a comma-separated one-line string in OpenSSL's style.
    /// Example: "C = US, O = Org, CN = example.com"
    ///
    /// Values containing commas, equals signs, or backslashes are escaped.
    pub fn to_oneline(&self) -> String {
        let mut result = String::new();
        for (i, (k, v)) in self.components.iter().enumerate() {
            if i > 0 {
                result.push_str(", ");
            }
            result.push_str(k);
            result.push_str(" = ");
            for ch in v.chars() {
                match ch {
                    '\\' => result.push_str("\\\\"),
                    ',' => result.push_str("\\,"),
                    '=' => result.push_str("\\="),
                    _ => result.push(ch),
                }
            }
        }
        result
    }
}

impl std::fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_oneline())
    }
}

/// Compare two names attribute by attribute.
///
/// Every key present on either side must carry the same values on both
/// sides. A key missing from one side never equals a key present on the
/// other. Component order across different keys does not matter.
pub fn dn_equal(a: &DistinguishedName, b: &DistinguishedName) -> bool {
    a.components
        .iter()
        .chain(b.components.iter())
        .all(|(key, _)| a.values(key) == b.values(key))
}

/// Date-time representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTime {
    /// ISO 8601 formatted string.
    pub iso8601: String,
    /// Unix timestamp.
    pub timestamp: i64,
}

impl DateTime {
    pub fn from_timestamp(timestamp: i64) -> Self {
        Self {
            iso8601: crate::util::iso8601(timestamp),
            timestamp,
        }
    }
}
