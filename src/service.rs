//! Signing orchestration
//!
//! The only component a caller needs: resolves identities from the trust
//! store, validates the request, dispatches to one of the two backends,
//! and normalizes failures into the [`SignError`] taxonomy. Output bytes
//! come back from the backend untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use secrecy::SecretString;

use crate::backend::native;
use crate::backend::{NativeCmsBackend, OpensslCliBackend};
use crate::error::{Result, SignError};
use crate::identity::SigningIdentity;
use crate::store::{IdentityStore, TrustStoreProvider};
use crate::workspace;

/// Which signing strategy to use, with the inputs that strategy needs.
pub enum SigningRequest {
    /// In-process CMS signing with a trust-store identity.
    Identity(SigningIdentity),
    /// Subprocess signing from a PKCS#12 container.
    Pkcs12 {
        path: PathBuf,
        password: SecretString,
    },
}

pub struct SigningService {
    store: IdentityStore,
    native: NativeCmsBackend,
    subprocess: OpensslCliBackend,
}

impl SigningService {
    /// Build a service over the given trust-store provider.
    ///
    /// Also kicks off a best-effort sweep of scratch directories orphaned
    /// by an earlier crash, on a detached thread.
    pub fn new(provider: Arc<dyn TrustStoreProvider>) -> Self {
        let service = SigningService {
            store: IdentityStore::new(provider),
            native: NativeCmsBackend::new(),
            subprocess: OpensslCliBackend::new(),
        };
        spawn_sweep(service.subprocess.scratch_root().to_path_buf());
        service
    }

    /// Place subprocess scratch workspaces under the given root.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.subprocess = self.subprocess.with_scratch_root(root);
        spawn_sweep(self.subprocess.scratch_root().to_path_buf());
        self
    }

    /// Use a specific openssl binary for the subprocess backend.
    pub fn with_tool(mut self, tool: impl Into<PathBuf>) -> Self {
        self.subprocess = self.subprocess.with_tool(tool);
        self
    }

    /// Freshly enumerated, classified and ranked signing identities.
    pub fn list_signing_identities(&self) -> Vec<SigningIdentity> {
        self.store.list_signing_identities()
    }

    /// Sign `profile` according to the request tag.
    pub fn sign(&self, profile: &[u8], request: SigningRequest) -> Result<Vec<u8>> {
        match request {
            SigningRequest::Identity(identity) => self.sign_with_identity(profile, &identity),
            SigningRequest::Pkcs12 { path, password } => {
                self.sign_with_pkcs12(profile, &path, &password)
            }
        }
    }

    /// In-process signing path.
    ///
    /// Validation order: empty input, known-expired identity, private-key
    /// re-probe. The key is probed again here because enumeration-time
    /// availability can diverge from signing-time availability.
    pub fn sign_with_identity(&self, profile: &[u8], identity: &SigningIdentity) -> Result<Vec<u8>> {
        if profile.is_empty() {
            return Err(SignError::EmptyInput);
        }
        if identity.is_expired() {
            warn!("refusing expired identity '{}'", identity.name);
            return Err(SignError::IdentityExpired(identity.name.clone()));
        }

        let material = self
            .store
            .provider()
            .signing_material(&identity.name)?
            .ok_or_else(|| SignError::IdentityNotSignable(identity.name.clone()))?;

        info!("signing {} bytes with identity '{}'", profile.len(), identity.name);
        let signed = self.native.sign(profile, &material)?;
        info!("native backend produced {} signed bytes", signed.len());
        Ok(signed)
    }

    /// Subprocess signing path from a PKCS#12 container.
    pub fn sign_with_pkcs12(
        &self,
        profile: &[u8],
        pkcs12_path: &Path,
        password: &SecretString,
    ) -> Result<Vec<u8>> {
        if profile.is_empty() {
            return Err(SignError::EmptyInput);
        }
        self.subprocess.sign(profile, pkcs12_path, password)
    }

    /// True when `signed` is a CMS structure with a valid embedded
    /// signature.
    pub fn verify(&self, signed: &[u8]) -> bool {
        native::verify_signature(signed)
    }

    /// Run a signing request off the caller's thread, returning a task
    /// handle the caller awaits however it likes. Requires a tokio runtime.
    pub fn sign_task(
        self: &Arc<Self>,
        profile: Vec<u8>,
        request: SigningRequest,
    ) -> tokio::task::JoinHandle<Result<Vec<u8>>> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.sign(&profile, request))
    }
}

fn spawn_sweep(root: PathBuf) {
    std::thread::spawn(move || {
        workspace::sweep_stale(&root, workspace::STALE_RETENTION);
    });
}
