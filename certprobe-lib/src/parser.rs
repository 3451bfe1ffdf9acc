//! Certificate decoding from DER and PEM.

use crate::fields::{Certificate, DateTime, DistinguishedName};
use crate::fingerprint::compute_fingerprint;
use crate::util;
use crate::ProbeError;
use std::net::IpAddr;
use x509_parser::prelude::*;

/// Parse one DER-encoded certificate.
pub fn parse_der(input: &[u8]) -> Result<Certificate, ProbeError> {
    if input.is_empty() {
        return Err(ProbeError::Parse("empty input".into()));
    }
    let (remaining, x509) =
        X509Certificate::from_der(input).map_err(|e| ProbeError::Parse(format!("{}", e)))?;

    // Use only the actual certificate bytes, not any trailing data,
    // so that fingerprints are computed over the correct content.
    let cert_len = input.len() - remaining.len();
    let cert_der = input.get(..cert_len).unwrap_or(input);
    Ok(build_certificate(&x509, cert_der))
}

/// Split a PEM bundle into individual DER-encoded certificates, in file order.
pub fn parse_pem_chain(input: &[u8]) -> Result<Vec<Vec<u8>>, ProbeError> {
    let mut certs = Vec::new();

    for pem_result in Pem::iter_from_buffer(input) {
        match pem_result {
            Ok(pem) => {
                if pem.label == "CERTIFICATE" || pem.label == "TRUSTED CERTIFICATE" {
                    certs.push(pem.contents);
                }
            }
            Err(e) => {
                // Trailing garbage after at least one certificate is tolerated.
                if !certs.is_empty() {
                    break;
                }
                return Err(ProbeError::Parse(format!("failed to parse PEM: {}", e)));
            }
        }
    }

    if certs.is_empty() {
        return Err(ProbeError::Parse("no certificates found in PEM input".into()));
    }

    Ok(certs)
}

fn build_certificate(x509: &X509Certificate, raw_der: &[u8]) -> Certificate {
    let tbs = &x509.tbs_certificate;
    let (dns_names, ip_addresses) = extract_san(x509);

    Certificate {
        subject: build_dn(&tbs.subject),
        issuer: build_dn(&tbs.issuer),
        not_after: DateTime::from_timestamp(tbs.validity.not_after.timestamp()),
        dns_names,
        ip_addresses,
        fingerprint: compute_fingerprint(raw_der),
        raw_der: raw_der.to_vec(),
    }
}

pub(crate) fn build_dn(name: &X509Name) -> DistinguishedName {
    let mut components = Vec::new();
    for rdn in name.iter() {
        for attr in rdn.iter() {
            let key = util::oid_short_name(&attr.attr_type().to_id_string());
            components.push((key, attr_value_string(attr)));
        }
    }
    DistinguishedName { components }
}

const UNIVERSAL_STRING: u32 = 28;
const BMP_STRING: u32 = 30;

/// Text of one name attribute.
///
/// BMPString and UniversalString are decoded from UCS-2 / UCS-4. Anything
/// else that is not text becomes `#<tag><hex>` over the raw value, so
/// distinct binary values stay distinct.
fn attr_value_string(attr: &AttributeTypeAndValue) -> String {
    if let Ok(s) = attr.as_str() {
        return s.to_string();
    }
    let value = attr.attr_value();
    let tag = value.tag().0;
    let decoded = match tag {
        BMP_STRING => decode_bmp(value.data),
        UNIVERSAL_STRING => decode_universal(value.data),
        _ => None,
    };
    decoded.unwrap_or_else(|| {
        let hex: String = value.data.iter().map(|b| format!("{:02x}", b)).collect();
        format!("#{:02x}{}", tag, hex)
    })
}

fn decode_bmp(data: &[u8]) -> Option<String> {
    if data.len() % 2 != 0 {
        return None;
    }
    let units = data
        .chunks_exact(2)
        .filter_map(|pair| <[u8; 2]>::try_from(pair).ok())
        .map(u16::from_be_bytes);
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

fn decode_universal(data: &[u8]) -> Option<String> {
    if data.len() % 4 != 0 {
        return None;
    }
    data.chunks_exact(4)
        .filter_map(|quad| <[u8; 4]>::try_from(quad).ok())
        .map(|quad| char::from_u32(u32::from_be_bytes(quad)))
        .collect()
}

/// DNS names and IP addresses from the SAN extension. A malformed extension
/// yields no names rather than an error; hostname matching then fails.
fn extract_san(x509: &X509Certificate) -> (Vec<String>, Vec<IpAddr>) {
    let mut dns = Vec::new();
    let mut ips = Vec::new();
    if let Ok(Some(san)) = x509.subject_alternative_name() {
        for gn in &san.value.general_names {
            match gn {
                GeneralName::DNSName(name) => dns.push(name.to_string()),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = ip_from_bytes(bytes) {
                        ips.push(ip);
                    }
                }
                _ => {}
            }
        }
    }
    (dns, ips)
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}
