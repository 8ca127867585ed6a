//! Signing identity model and certificate classification
//!
//! An identity is a certificate paired with a usable private key, as held by
//! a trust store. This module carries the derived attributes the caller
//! needs (subject, issuer, validity window, issuer class) and the fixed
//! classification filter that decides which trust-store entries count as
//! code-signing identities at all.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use crate::error::{Result, SignError};

/// Subject-label markers identifying code-signing identities. An identity
/// whose subject contains none of these is not surfaced.
pub const SIGNING_SUBJECT_MARKERS: [&str; 9] = [
    "Apple Development:",
    "Apple Distribution:",
    "Developer ID Application:",
    "Developer ID Installer:",
    "Mac Developer:",
    "iPhone Developer:",
    "iPhone Distribution:",
    "iOS Developer:",
    "iOS Distribution:",
];

/// OID for the Common Name attribute (2.5.4.3).
pub const OID_COMMON_NAME: &str = "2.5.4.3";
/// OID for the Organization attribute (2.5.4.10).
pub const OID_ORGANIZATION: &str = "2.5.4.10";

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z, the reference
/// epoch some trust stores use for certificate validity values.
const REFERENCE_EPOCH_OFFSET_SECS: u64 = 978_307_200;

/// Returns true when the subject string identifies a code-signing identity.
pub fn matches_signing_marker(subject: &str) -> bool {
    SIGNING_SUBJECT_MARKERS
        .iter()
        .any(|marker| subject.contains(marker))
}

/// Issuer class of a signing certificate, derived from its subject string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateType {
    AppleDevelopment,
    AppleDistribution,
    DeveloperIdApplication,
    DeveloperIdInstaller,
    MacDeveloper,
    IosDevelopment,
    IosDistribution,
    /// Matched the signing filter but none of the narrower classes.
    Apple,
}

impl CertificateType {
    /// Classify a certificate subject string.
    pub fn from_subject(subject: &str) -> Self {
        if subject.contains("Apple Development") {
            CertificateType::AppleDevelopment
        } else if subject.contains("Apple Distribution") {
            CertificateType::AppleDistribution
        } else if subject.contains("Developer ID Application") {
            CertificateType::DeveloperIdApplication
        } else if subject.contains("Developer ID Installer") {
            CertificateType::DeveloperIdInstaller
        } else if subject.contains("Mac Developer") {
            CertificateType::MacDeveloper
        } else if subject.contains("iPhone Developer") || subject.contains("iOS Developer") {
            CertificateType::IosDevelopment
        } else if subject.contains("iPhone Distribution") || subject.contains("iOS Distribution") {
            CertificateType::IosDistribution
        } else {
            CertificateType::Apple
        }
    }
}

impl std::fmt::Display for CertificateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CertificateType::AppleDevelopment => "Apple Development Certificate",
            CertificateType::AppleDistribution => "Apple Distribution Certificate",
            CertificateType::DeveloperIdApplication => "Developer ID Application Certificate",
            CertificateType::DeveloperIdInstaller => "Developer ID Installer Certificate",
            CertificateType::MacDeveloper => "Mac Development Certificate",
            CertificateType::IosDevelopment => "iOS Development Certificate",
            CertificateType::IosDistribution => "iOS Distribution Certificate",
            CertificateType::Apple => "Apple Certificate",
        };
        write!(f, "{label}")
    }
}

/// A certificate validity instant as a trust store reports it: either a
/// native timestamp or a floating-point offset from the 2001-01-01
/// reference epoch. Both decode to [`SystemTime`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CertStamp {
    At(SystemTime),
    SinceReferenceEpoch(f64),
}

impl CertStamp {
    pub fn resolve(&self) -> SystemTime {
        match *self {
            CertStamp::At(t) => t,
            CertStamp::SinceReferenceEpoch(secs) => {
                let epoch = UNIX_EPOCH + Duration::from_secs(REFERENCE_EPOCH_OFFSET_SECS);
                // NaN and out-of-range offsets clamp to the reference
                // epoch itself rather than aborting enumeration.
                if secs >= 0.0 {
                    Duration::try_from_secs_f64(secs)
                        .ok()
                        .and_then(|d| epoch.checked_add(d))
                        .unwrap_or(epoch)
                } else {
                    Duration::try_from_secs_f64(-secs)
                        .ok()
                        .and_then(|d| epoch.checked_sub(d))
                        .unwrap_or(epoch)
                }
            }
        }
    }
}

/// One issuer RDN attribute, in certificate order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerAttr {
    /// Dotted-decimal OID, e.g. "2.5.4.3".
    pub oid: String,
    pub value: String,
}

/// Raw identity record as yielded by a [`crate::store::TrustStoreProvider`],
/// before classification and attribute derivation.
#[derive(Debug, Clone)]
pub struct IdentityCandidate {
    /// Human-readable subject summary; serves as the stable lookup key.
    pub subject: String,
    pub common_name: Option<String>,
    pub issuer_attrs: Vec<IssuerAttr>,
    pub not_before: Option<CertStamp>,
    pub not_after: Option<CertStamp>,
    /// Whether the store holds a usable private key for this certificate.
    pub has_private_key: bool,
    /// SHA-256 fingerprint of the certificate (hex), when known.
    pub fingerprint: String,
}

/// Build a candidate from a DER-encoded certificate.
pub fn candidate_from_der(der: &[u8], has_private_key: bool) -> Result<IdentityCandidate> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| SignError::SigningFailed(format!("failed to parse certificate: {e}")))?;

    let subject = cert.subject().to_string();

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(|s| s.to_string());

    let mut issuer_attrs = Vec::new();
    for rdn in cert.issuer().iter() {
        for attr in rdn.iter() {
            if let Ok(value) = attr.as_str() {
                issuer_attrs.push(IssuerAttr {
                    oid: attr.attr_type().to_id_string(),
                    value: value.to_string(),
                });
            }
        }
    }

    let validity = cert.validity();
    let not_before: SystemTime = validity.not_before.to_datetime().into();
    let not_after: SystemTime = validity.not_after.to_datetime().into();

    Ok(IdentityCandidate {
        subject,
        common_name,
        issuer_attrs,
        not_before: Some(CertStamp::At(not_before)),
        not_after: Some(CertStamp::At(not_after)),
        has_private_key,
        fingerprint: hex::encode(Sha256::digest(der)),
    })
}

/// Pick the display name for an issuer: Common Name, then Organization,
/// then whatever attribute comes first.
pub fn issuer_display_name(attrs: &[IssuerAttr]) -> String {
    attrs
        .iter()
        .find(|a| a.oid == OID_COMMON_NAME)
        .or_else(|| attrs.iter().find(|a| a.oid == OID_ORGANIZATION))
        .or_else(|| attrs.first())
        .map(|a| a.value.clone())
        .unwrap_or_else(|| "Unknown Issuer".to_string())
}

/// A code-signing identity with its derived attributes.
///
/// Constructed fresh on every enumeration; never cached or persisted by the
/// core. The `name` field is stable across enumerations and serves as the
/// lookup key for material resolution.
#[derive(Debug, Clone)]
pub struct SigningIdentity {
    /// Subject summary, human readable.
    pub name: String,
    pub common_name: String,
    pub issuer_name: String,
    pub not_before: Option<SystemTime>,
    pub not_after: Option<SystemTime>,
    pub certificate_type: CertificateType,
    /// SHA-256 certificate fingerprint (hex), when known.
    pub fingerprint: String,
}

impl SigningIdentity {
    /// Derive an identity from a raw candidate. Classification filtering is
    /// the store's job; this only shapes attributes.
    pub fn from_candidate(candidate: &IdentityCandidate) -> Self {
        let common_name = candidate
            .common_name
            .clone()
            .unwrap_or_else(|| candidate.subject.clone());

        SigningIdentity {
            name: candidate.subject.clone(),
            common_name,
            issuer_name: issuer_display_name(&candidate.issuer_attrs),
            not_before: candidate.not_before.map(|s| s.resolve()),
            not_after: candidate.not_after.map(|s| s.resolve()),
            certificate_type: CertificateType::from_subject(&candidate.subject),
            fingerprint: candidate.fingerprint.clone(),
        }
    }

    /// True when `notAfter` is known and in the past. Unknown expiry is
    /// treated as not expired.
    pub fn is_expired(&self) -> bool {
        match self.not_after {
            Some(not_after) => SystemTime::now() > not_after,
            None => false,
        }
    }

    /// Whole days until expiration. `None` when expired or when the expiry
    /// is unknown.
    pub fn days_until_expiration(&self) -> Option<u64> {
        let not_after = self.not_after?;
        let remaining = not_after.duration_since(SystemTime::now()).ok()?;
        Some(remaining.as_secs() / 86_400)
    }
}
