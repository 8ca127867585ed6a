//! PEM directory trust store
//!
//! Portable production backend: scans a directory for `<name>.pem`
//! certificate files with sibling `<name>.key` private keys. Entries that
//! fail to load or whose key does not match the certificate are skipped
//! with a warning, never errored; a missing or unreadable directory yields
//! an empty list.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;

use super::{SigningMaterial, TrustStoreProvider};
use crate::error::Result;
use crate::identity::{candidate_from_der, IdentityCandidate};

pub struct PemDirectoryStore {
    dir: PathBuf,
}

impl PemDirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        PemDirectoryStore { dir: dir.into() }
    }

    fn entries(&self) -> Vec<(IdentityCandidate, SigningMaterial)> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(_) => return Vec::new(),
        };

        let mut out = Vec::new();
        for entry in read_dir.flatten() {
            let cert_path = entry.path();
            if cert_path.extension().and_then(|e| e.to_str()) != Some("pem") {
                continue;
            }
            let key_path = cert_path.with_extension("key");

            match load_pair(&cert_path, &key_path) {
                Ok(Some(pair)) => out.push(pair),
                Ok(None) => {}
                Err(reason) => warn!("skipping {}: {reason}", cert_path.display()),
            }
        }
        out
    }
}

impl TrustStoreProvider for PemDirectoryStore {
    fn candidates(&self) -> Vec<IdentityCandidate> {
        self.entries().into_iter().map(|(c, _)| c).collect()
    }

    fn signing_material(&self, name: &str) -> Result<Option<SigningMaterial>> {
        Ok(self
            .entries()
            .into_iter()
            .find(|(c, _)| c.subject == name)
            .map(|(_, m)| m))
    }
}

fn load_pair(
    cert_path: &Path,
    key_path: &Path,
) -> std::result::Result<Option<(IdentityCandidate, SigningMaterial)>, String> {
    let cert_data = fs::read(cert_path).map_err(|e| e.to_string())?;
    let certificate = X509::from_pem(&cert_data)
        .or_else(|_| X509::from_der(&cert_data))
        .map_err(|e| format!("failed to load certificate: {e}"))?;

    if !key_path.is_file() {
        // Certificate without a key is not an identity.
        return Ok(None);
    }

    let key_data = fs::read(key_path).map_err(|e| e.to_string())?;
    let private_key: PKey<Private> = PKey::private_key_from_pem(&key_data)
        .or_else(|_| PKey::private_key_from_der(&key_data))
        .map_err(|e| format!("failed to load private key: {e}"))?;

    let cert_public_key = certificate
        .public_key()
        .map_err(|e| format!("failed to extract public key: {e}"))?;
    if !private_key.public_eq(&cert_public_key) {
        return Err("private key does not match certificate".to_string());
    }

    let der = certificate
        .to_der()
        .map_err(|e| format!("failed to re-encode certificate: {e}"))?;
    let candidate = candidate_from_der(&der, true).map_err(|e| e.to_string())?;

    Ok(Some((
        candidate,
        SigningMaterial {
            certificate,
            private_key,
        },
    )))
}
