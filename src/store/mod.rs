//! Trust-store abstraction and identity enumeration
//!
//! Providers:
//! - in-memory fake with synthetic identities for tests,
//! - PEM directory scanner as the portable production backend,
//! - macOS Keychain when the `keychain` feature is enabled.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use openssl::pkey::{PKey, Private};
use openssl::x509::X509;

use crate::error::Result;
use crate::identity::{matches_signing_marker, IdentityCandidate, SigningIdentity};

pub mod memory;
pub mod pem_dir;

#[cfg(all(target_os = "macos", feature = "keychain"))]
pub mod keychain;

/// Certificate plus private key, resolved for one signing attempt.
#[derive(Clone)]
pub struct SigningMaterial {
    pub certificate: X509,
    pub private_key: PKey<Private>,
}

/// Read-only access to a store of certificate/private-key pairs.
///
/// Enumeration is best-effort: a store failure yields an empty candidate
/// list, never an error. Material resolution is a separate probe because
/// "has an identity" and "has a usable key" can diverge between enumeration
/// time and signing time.
pub trait TrustStoreProvider: Send + Sync {
    fn candidates(&self) -> Vec<IdentityCandidate>;

    /// Resolve usable signing material for the identity with the given
    /// name. `Ok(None)` means the identity exists without a recoverable
    /// key, or no longer exists.
    fn signing_material(&self, name: &str) -> Result<Option<SigningMaterial>>;
}

/// Enumerates, classifies and ranks the signing identities of a provider.
#[derive(Clone)]
pub struct IdentityStore {
    provider: Arc<dyn TrustStoreProvider>,
}

impl IdentityStore {
    pub fn new(provider: Arc<dyn TrustStoreProvider>) -> Self {
        IdentityStore { provider }
    }

    pub fn provider(&self) -> &Arc<dyn TrustStoreProvider> {
        &self.provider
    }

    /// List the usable code-signing identities, freshly derived on every
    /// call.
    ///
    /// Candidates without a private key and candidates whose subject does
    /// not match any code-signing marker are silently dropped. Duplicate
    /// (subject, commonName) pairs are suppressed. Ordering: identities
    /// that are still valid come first; within each group, ascending by
    /// `notAfter` when the dates are known, falling back to subject name
    /// as soon as any date in the group is not.
    pub fn list_signing_identities(&self) -> Vec<SigningIdentity> {
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut identities: Vec<SigningIdentity> = Vec::new();

        for candidate in self.provider.candidates() {
            if !candidate.has_private_key {
                continue;
            }
            if !matches_signing_marker(&candidate.subject) {
                continue;
            }

            let identity = SigningIdentity::from_candidate(&candidate);
            if !seen.insert((identity.name.clone(), identity.common_name.clone())) {
                continue;
            }
            identities.push(identity);
        }

        let (mut valid, mut expired): (Vec<_>, Vec<_>) =
            identities.into_iter().partition(|id| !id.is_expired());
        rank_group(&mut valid);
        rank_group(&mut expired);
        valid.append(&mut expired);
        valid
    }
}

/// Order one validity group. Expiry dates drive the order only when every
/// member has one; mixing a by-date rule for known pairs with a by-name
/// rule for unknown pairs would not be a total order, so a single unknown
/// date sends the whole group to the name fallback.
fn rank_group(group: &mut [SigningIdentity]) {
    if group.iter().all(|id| id.not_after.is_some()) {
        group.sort_by_key(|id| (expiry_secs(id), id.name.clone()));
    } else {
        group.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

fn expiry_secs(id: &SigningIdentity) -> u64 {
    id.not_after
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
