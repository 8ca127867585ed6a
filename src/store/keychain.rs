//! macOS Keychain trust store (feature `keychain`)
//!
//! Enumerates identity items (certificate + private key pairs) from the
//! user's keychains via the Security framework. Key material is only
//! recoverable for exportable keys; identities whose keys cannot be
//! exported are enumerable but resolve to no signing material, which the
//! service surfaces as not signable on the native path. The subprocess
//! backend remains available for those.

use log::warn;
use security_framework::identity::SecIdentity;
use security_framework::item::{ItemClass, ItemSearchOptions, Limit, Reference, SearchResult};

use openssl::pkey::PKey;
use openssl::x509::X509;

use super::{SigningMaterial, TrustStoreProvider};
use crate::error::Result;
use crate::identity::{candidate_from_der, IdentityCandidate};

pub struct KeychainTrustStore;

impl KeychainTrustStore {
    pub fn new() -> Self {
        KeychainTrustStore
    }

    fn identities(&self) -> Vec<SecIdentity> {
        let results = match ItemSearchOptions::new()
            .class(ItemClass::identity())
            .load_refs(true)
            .limit(Limit::All)
            .search()
        {
            Ok(results) => results,
            Err(e) => {
                warn!("keychain identity query failed: {e}");
                return Vec::new();
            }
        };

        results
            .into_iter()
            .filter_map(|r| match r {
                SearchResult::Ref(Reference::Identity(identity)) => Some(identity),
                _ => None,
            })
            .collect()
    }
}

impl Default for KeychainTrustStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustStoreProvider for KeychainTrustStore {
    fn candidates(&self) -> Vec<IdentityCandidate> {
        let mut out = Vec::new();
        for identity in self.identities() {
            let cert = match identity.certificate() {
                Ok(cert) => cert,
                Err(_) => continue,
            };
            let has_private_key = identity.private_key().is_ok();
            match candidate_from_der(&cert.to_der(), has_private_key) {
                Ok(candidate) => out.push(candidate),
                Err(e) => warn!("skipping unparseable keychain certificate: {e}"),
            }
        }
        out
    }

    fn signing_material(&self, name: &str) -> Result<Option<SigningMaterial>> {
        for identity in self.identities() {
            let cert = match identity.certificate() {
                Ok(cert) => cert,
                Err(_) => continue,
            };
            let der = cert.to_der();
            let candidate = match candidate_from_der(&der, true) {
                Ok(candidate) => candidate,
                Err(_) => continue,
            };
            if candidate.subject != name {
                continue;
            }

            let key = match identity.private_key() {
                Ok(key) => key,
                Err(_) => return Ok(None),
            };
            // Only exportable keys can feed the in-process backend.
            let raw = match key.external_representation() {
                Some(raw) => raw,
                None => return Ok(None),
            };
            let private_key = match PKey::private_key_from_der(raw.bytes())
                .or_else(|_| PKey::private_key_from_pem(raw.bytes()))
            {
                Ok(key) => key,
                Err(_) => return Ok(None),
            };

            let certificate = match X509::from_der(&der) {
                Ok(cert) => cert,
                Err(_) => return Ok(None),
            };

            return Ok(Some(SigningMaterial {
                certificate,
                private_key,
            }));
        }
        Ok(None)
    }
}
