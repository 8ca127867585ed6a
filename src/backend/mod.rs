//! Signing backends
//!
//! Two interchangeable strategies produce the same DER-encoded CMS
//! `SignedData` envelope: an in-process backend over resolved key material,
//! and a subprocess backend that drives the external `openssl` tool from a
//! PKCS#12 container. The service dispatches between them on the
//! [`crate::service::SigningRequest`] tag.

pub mod native;
pub mod openssl_cli;

pub use native::NativeCmsBackend;
pub use openssl_cli::OpensslCliBackend;
