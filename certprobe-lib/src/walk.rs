//! Chain linearization.
//!
//! A server sends its certificates as a flat list, in whatever order it was
//! configured with. [`PresentedChain`] records, for each certificate, which
//! other presented certificate issued it. [`PresentedChain::walk`] follows
//! those references from the leaf and produces a leaf-to-root [`Chain`],
//! after which the index relation is dropped.

use crate::fields::{dn_equal, Certificate};

/// Maximum number of certificates a walk collects before giving up.
pub const MAX_CHAIN_HOPS: usize = 16;

/// Certificates exactly as presented, with resolved issuer references.
#[derive(Debug, Clone, Default)]
pub struct PresentedChain {
    certs: Vec<Certificate>,
    issuers: Vec<Option<usize>>,
}

impl PresentedChain {
    /// Resolve issuer references among `certs` by name.
    ///
    /// A self-issued certificate references itself. Otherwise the first other
    /// certificate whose subject equals this certificate's issuer is chosen.
    pub fn link(certs: Vec<Certificate>) -> Self {
        let issuers = certs
            .iter()
            .enumerate()
            .map(|(i, cert)| {
                if cert.is_self_issued() {
                    return Some(i);
                }
                certs
                    .iter()
                    .enumerate()
                    .find(|(j, candidate)| *j != i && dn_equal(&candidate.subject, &cert.issuer))
                    .map(|(j, _)| j)
            })
            .collect();
        Self { certs, issuers }
    }

    /// Build from an explicit issuer relation. Missing entries mean "no issuer".
    pub fn from_parts(certs: Vec<Certificate>, mut issuers: Vec<Option<usize>>) -> Self {
        issuers.resize(certs.len(), None);
        Self { certs, issuers }
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certs
    }

    /// The resolved issuer of certificate `index`.
    pub fn issuer_of(&self, index: usize) -> Option<usize> {
        self.issuers.get(index).copied().flatten()
    }

    /// Follow issuer references from the leaf (index 0).
    ///
    /// Stops at a certificate that references itself or nothing. If
    /// `max_hops` certificates have been collected and another issuer is
    /// still pending, the result is marked truncated.
    pub fn walk(&self, max_hops: usize) -> Chain {
        let max_hops = max_hops.max(1);
        let mut certs = Vec::new();
        let mut truncated = false;
        let mut current = if self.certs.is_empty() { None } else { Some(0) };

        while let Some(idx) = current {
            if certs.len() >= max_hops {
                truncated = true;
                break;
            }
            let Some(cert) = self.certs.get(idx) else {
                break;
            };
            tracing::trace!(
                depth = certs.len(),
                subject = %cert.subject,
                issuer = %cert.issuer,
                "chain hop"
            );
            certs.push(cert.clone());
            current = match self.issuer_of(idx) {
                Some(next) if next != idx => Some(next),
                _ => None,
            };
        }

        if truncated {
            tracing::debug!(max_hops, "chain walk hit the hop cap");
        }
        Chain { certs, truncated }
    }
}

/// Leaf-first ordered certificate chain.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    certs: Vec<Certificate>,
    truncated: bool,
}

impl Chain {
    /// A chain taken as already ordered leaf to root.
    pub fn new(certs: Vec<Certificate>) -> Self {
        Self {
            certs,
            truncated: false,
        }
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// True when the walk stopped at the hop cap rather than at a root.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn leaf(&self) -> Option<&Certificate> {
        self.certs.first()
    }

    pub fn root(&self) -> Option<&Certificate> {
        self.certs.last()
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certs
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
pub(crate) mod tests {
    use super::*;
    use crate::fields::{DateTime, DistinguishedName};

    pub(crate) fn cert(subject_cn: &str, issuer_cn: &str) -> Certificate {
        Certificate {
            subject: DistinguishedName::new([("CN", subject_cn)]),
            issuer: DistinguishedName::new([("CN", issuer_cn)]),
            not_after: DateTime::from_timestamp(4_102_444_800),
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            fingerprint: String::new(),
            raw_der: vec![0x30],
        }
    }

    fn subjects(chain: &Chain) -> Vec<&str> {
        chain
            .certificates()
            .iter()
            .filter_map(|c| c.subject.get("CN"))
            .collect()
    }

    #[test]
    fn link_orders_shuffled_chain() {
        let presented = PresentedChain::link(vec![
            cert("leaf", "inter"),
            cert("root", "root"),
            cert("inter", "root"),
        ]);
        assert_eq!(presented.issuer_of(0), Some(2));
        assert_eq!(presented.issuer_of(1), Some(1));
        assert_eq!(presented.issuer_of(2), Some(1));

        let chain = presented.walk(MAX_CHAIN_HOPS);
        assert_eq!(subjects(&chain), vec!["leaf", "inter", "root"]);
        assert!(!chain.is_truncated());
    }

    #[test]
    fn walk_stops_when_issuer_is_absent() {
        let presented = PresentedChain::link(vec![cert("leaf", "inter")]);
        assert_eq!(presented.issuer_of(0), None);
        let chain = presented.walk(MAX_CHAIN_HOPS);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn unrelated_certificates_are_left_out() {
        let presented = PresentedChain::link(vec![
            cert("leaf", "inter"),
            cert("inter", "missing-root"),
            cert("stray", "stray-ca"),
        ]);
        let chain = presented.walk(MAX_CHAIN_HOPS);
        assert_eq!(subjects(&chain), vec!["leaf", "inter"]);
    }

    #[test]
    fn walk_is_bounded_on_cycles() {
        let presented = PresentedChain::link(vec![cert("a", "b"), cert("b", "a")]);
        let chain = presented.walk(MAX_CHAIN_HOPS);
        assert_eq!(chain.len(), MAX_CHAIN_HOPS);
        assert!(chain.is_truncated());
    }

    #[test]
    fn walk_is_bounded_on_arbitrary_relations() {
        let certs: Vec<_> = (0..5).map(|i| cert(&format!("c{i}"), "x")).collect();
        for cap in 1..8 {
            let presented =
                PresentedChain::from_parts(certs.clone(), vec![Some(3), Some(0), None, Some(1)]);
            let chain = presented.walk(cap);
            assert!(chain.len() <= cap);
        }
    }

    #[test]
    fn chain_exactly_at_cap_is_not_truncated() {
        let presented = PresentedChain::from_parts(
            vec![cert("a", "b"), cert("b", "c"), cert("c", "c")],
            vec![Some(1), Some(2), Some(2)],
        );
        let chain = presented.walk(3);
        assert_eq!(chain.len(), 3);
        assert!(!chain.is_truncated());
    }

    #[test]
    fn out_of_range_issuer_ends_walk() {
        let presented = PresentedChain::from_parts(vec![cert("a", "b")], vec![Some(7)]);
        assert_eq!(presented.walk(MAX_CHAIN_HOPS).len(), 1);
    }

    #[test]
    fn empty_presentation_walks_to_empty_chain() {
        let chain = PresentedChain::default().walk(MAX_CHAIN_HOPS);
        assert!(chain.is_empty());
        assert!(chain.leaf().is_none());
    }
}
