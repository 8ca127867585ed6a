//! In-memory trust store with synthetic identities
//!
//! The test backend: holds real certificate/key pairs generated on the fly,
//! so the native signing path can be exercised end to end without touching
//! a platform store. Raw candidates without material can also be injected
//! to shape enumeration edge cases.

use std::time::{SystemTime, UNIX_EPOCH};

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509Builder, X509NameBuilder, X509};

use super::{SigningMaterial, TrustStoreProvider};
use crate::error::{Result, SignError};
use crate::identity::{candidate_from_der, IdentityCandidate};

struct Entry {
    candidate: IdentityCandidate,
    material: Option<SigningMaterial>,
}

/// Trust-store fake holding a fixed list of identities.
#[derive(Default)]
pub struct MemoryTrustStore {
    entries: Vec<Entry>,
}

impl MemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a self-signed certificate with the given common name and
    /// validity window, and register it together with its private key.
    pub fn add_identity(
        &mut self,
        common_name: &str,
        not_before: SystemTime,
        not_after: SystemTime,
    ) -> Result<()> {
        let (certificate, private_key) = generate_identity(common_name, not_before, not_after)?;
        let der = certificate
            .to_der()
            .map_err(|e| SignError::EncodingFailed(e.to_string()))?;
        let candidate = candidate_from_der(&der, true)?;

        self.entries.push(Entry {
            candidate,
            material: Some(SigningMaterial {
                certificate,
                private_key,
            }),
        });
        Ok(())
    }

    /// Register a raw candidate with no backing material.
    pub fn add_candidate(&mut self, candidate: IdentityCandidate) {
        self.entries.push(Entry {
            candidate,
            material: None,
        });
    }

    /// Register a raw candidate backed by the given material.
    pub fn add_candidate_with_material(
        &mut self,
        candidate: IdentityCandidate,
        material: SigningMaterial,
    ) {
        self.entries.push(Entry {
            candidate,
            material: Some(material),
        });
    }
}

impl TrustStoreProvider for MemoryTrustStore {
    fn candidates(&self) -> Vec<IdentityCandidate> {
        self.entries.iter().map(|e| e.candidate.clone()).collect()
    }

    fn signing_material(&self, name: &str) -> Result<Option<SigningMaterial>> {
        Ok(self
            .entries
            .iter()
            .find(|e| e.candidate.subject == name)
            .and_then(|e| e.material.clone()))
    }
}

/// Generate an EC P-256 key pair and a self-signed certificate carrying
/// the given common name and validity window.
pub fn generate_identity(
    common_name: &str,
    not_before: SystemTime,
    not_after: SystemTime,
) -> Result<(X509, PKey<Private>)> {
    let map_err = |e: openssl::error::ErrorStack| SignError::SigningFailed(e.to_string());

    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).map_err(map_err)?;
    let ec_key = EcKey::generate(&group).map_err(map_err)?;
    let private_key = PKey::from_ec_key(ec_key).map_err(map_err)?;

    let mut name_builder = X509NameBuilder::new().map_err(map_err)?;
    name_builder
        .append_entry_by_nid(Nid::COMMONNAME, common_name)
        .map_err(map_err)?;
    name_builder
        .append_entry_by_nid(Nid::ORGANIZATIONNAME, "Profile Signer Tests")
        .map_err(map_err)?;
    let name = name_builder.build();

    let mut builder = X509Builder::new().map_err(map_err)?;
    builder.set_version(2).map_err(map_err)?;
    builder.set_subject_name(&name).map_err(map_err)?;
    builder.set_issuer_name(&name).map_err(map_err)?;
    builder.set_pubkey(&private_key).map_err(map_err)?;

    let serial = {
        let mut bn = BigNum::new().map_err(map_err)?;
        bn.rand(64, MsbOption::MAYBE_ZERO, false).map_err(map_err)?;
        bn.to_asn1_integer().map_err(map_err)?
    };
    builder.set_serial_number(&serial).map_err(map_err)?;

    let not_before = Asn1Time::from_unix(unix_secs(not_before)).map_err(map_err)?;
    let not_after = Asn1Time::from_unix(unix_secs(not_after)).map_err(map_err)?;
    builder.set_not_before(&not_before).map_err(map_err)?;
    builder.set_not_after(&not_after).map_err(map_err)?;

    builder
        .sign(&private_key, MessageDigest::sha256())
        .map_err(map_err)?;

    Ok((builder.build(), private_key))
}

fn unix_secs(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}
