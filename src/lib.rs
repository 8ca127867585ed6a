//! profile-signer – certificate discovery and CMS signing for device
//! configuration profiles.
//!
//! The crate takes opaque unsigned profile bytes and wraps them in a
//! DER-encoded CMS `SignedData` structure, either in process with an
//! identity resolved from a trust store, or by driving the external
//! `openssl` tool from a PKCS#12 container. [`SigningService`] is the one
//! entry point callers need.

pub mod backend;
pub mod error;
pub mod identity;
pub mod service;
pub mod store;
pub mod workspace;

pub use error::{ExtractionTarget, Result, SignError};

pub use identity::{
    CertStamp, CertificateType, IdentityCandidate, IssuerAttr, SigningIdentity,
    SIGNING_SUBJECT_MARKERS,
};

pub use store::{IdentityStore, SigningMaterial, TrustStoreProvider};

pub use backend::{NativeCmsBackend, OpensslCliBackend};

pub use service::{SigningRequest, SigningService};

pub use workspace::Workspace;
