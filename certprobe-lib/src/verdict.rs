//! Result classification: stable numeric codes and the response envelope.

use crate::fields::Certificate;
use crate::ProbeError;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Stable result codes. The numeric values are part of the external contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    InvalidParameter = 400,
    NoCertificate = 401,
    MissingIntermediate = 402,
    ValidationFailed = 403,
    Expired = 404,
    ConnectionFailed = 405,
    Timeout = 406,
    InternalError = 500,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// True when the probe itself ran to completion, whatever it found.
    ///
    /// 400 and 500 mean the probe could not run; a transport adapter reports
    /// those with an error status and everything else with a success status.
    pub fn is_probe_outcome(self) -> bool {
        !matches!(self, Self::InvalidParameter | Self::InternalError)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.as_u16())
    }
}

/// Descriptor of a chain that passed every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidSummary {
    /// Leaf `notAfter`, ISO 8601.
    pub expires_at: String,
    /// Leaf subject reduced to CN, O, OU, C, L, ST.
    pub subject: BTreeMap<String, String>,
    /// Leaf issuer reduced to CN, O, OU, C, L, ST.
    pub issuer: BTreeMap<String, String>,
    /// SHA-256 fingerprint of the leaf.
    pub fingerprint: String,
    pub chain_length: usize,
}

impl ValidSummary {
    pub fn new(leaf: &Certificate, chain_length: usize) -> Self {
        Self {
            expires_at: leaf.not_after.iso8601.clone(),
            subject: leaf.subject.summary(),
            issuer: leaf.issuer.summary(),
            fingerprint: leaf.fingerprint.clone(),
            chain_length,
        }
    }
}

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid(ValidSummary),
    Invalid { code: ErrorCode, message: String },
}

impl Verdict {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Valid(_) => ErrorCode::Success,
            Self::Invalid { code, .. } => *code,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Valid(_) => "ok",
            Self::Invalid { message, .. } => message,
        }
    }

    /// Build the external envelope for `domain`.
    pub fn to_response<'a>(&'a self, domain: &'a str) -> Response<'a> {
        Response {
            code: self.code(),
            message: self.message(),
            data: match self {
                Self::Valid(summary) => Some(ResponseData {
                    domain,
                    valid: true,
                    summary,
                }),
                Self::Invalid { .. } => None,
            },
        }
    }
}

impl From<ProbeError> for Verdict {
    fn from(err: ProbeError) -> Self {
        Self::Invalid {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<Result<ValidSummary, ProbeError>> for Verdict {
    fn from(result: Result<ValidSummary, ProbeError>) -> Self {
        match result {
            Ok(summary) => Self::Valid(summary),
            Err(err) => err.into(),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid(s) => {
                let cn = s.subject.get("CN").map(String::as_str).unwrap_or("-");
                write!(
                    f,
                    "OK ({}, expires {}, chain length {})",
                    cn, s.expires_at, s.chain_length
                )
            }
            Self::Invalid { code, message } => write!(f, "FAIL [{}] {}", code, message),
        }
    }
}

/// `{code, message, data}` envelope. `data` is `null` unless the chain is valid.
#[derive(Debug, Serialize)]
pub struct Response<'a> {
    pub code: ErrorCode,
    pub message: &'a str,
    pub data: Option<ResponseData<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ResponseData<'a> {
    pub domain: &'a str,
    pub valid: bool,
    #[serde(flatten)]
    pub summary: &'a ValidSummary,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary() -> ValidSummary {
        ValidSummary {
            expires_at: "2030-01-01T00:00:00.000Z".into(),
            subject: BTreeMap::from([("CN".to_string(), "example.com".to_string())]),
            issuer: BTreeMap::from([("CN".to_string(), "Example CA".to_string())]),
            fingerprint: "AB:CD".into(),
            chain_length: 2,
        }
    }

    #[test]
    fn codes_are_stable() {
        let table = [
            (ErrorCode::Success, 0),
            (ErrorCode::InvalidParameter, 400),
            (ErrorCode::NoCertificate, 401),
            (ErrorCode::MissingIntermediate, 402),
            (ErrorCode::ValidationFailed, 403),
            (ErrorCode::Expired, 404),
            (ErrorCode::ConnectionFailed, 405),
            (ErrorCode::Timeout, 406),
            (ErrorCode::InternalError, 500),
        ];
        for (code, n) in table {
            assert_eq!(code.as_u16(), n);
        }
    }

    #[test]
    fn probe_outcomes_exclude_caller_and_internal_failures() {
        assert!(ErrorCode::Success.is_probe_outcome());
        assert!(ErrorCode::Expired.is_probe_outcome());
        assert!(ErrorCode::Timeout.is_probe_outcome());
        assert!(!ErrorCode::InvalidParameter.is_probe_outcome());
        assert!(!ErrorCode::InternalError.is_probe_outcome());
    }

    #[test]
    fn success_envelope_shape() {
        let verdict = Verdict::Valid(summary());
        let value = serde_json::to_value(verdict.to_response("example.com")).unwrap();
        assert_eq!(
            value,
            json!({
                "code": 0,
                "message": "ok",
                "data": {
                    "domain": "example.com",
                    "valid": true,
                    "expiresAt": "2030-01-01T00:00:00.000Z",
                    "subject": {"CN": "example.com"},
                    "issuer": {"CN": "Example CA"},
                    "fingerprint": "AB:CD",
                    "chainLength": 2
                }
            })
        );
    }

    #[test]
    fn failure_envelope_has_null_data() {
        let verdict = Verdict::from(ProbeError::ChainIncomplete);
        let value = serde_json::to_value(verdict.to_response("example.com")).unwrap();
        assert_eq!(
            value,
            json!({
                "code": 402,
                "message": "Certificate chain is incomplete: missing intermediate certificate(s)",
                "data": null
            })
        );
    }

    #[test]
    fn display_is_one_line() {
        assert_eq!(
            Verdict::Valid(summary()).to_string(),
            "OK (example.com, expires 2030-01-01T00:00:00.000Z, chain length 2)"
        );
        let failed = Verdict::from(ProbeError::NoCertificate);
        assert_eq!(
            failed.to_string(),
            "FAIL [401] No certificate presented by server"
        );
    }
}
