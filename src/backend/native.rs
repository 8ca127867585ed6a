//! In-process CMS signing
//!
//! Builds a binary, non-detached CMS `SignedData` envelope over the profile
//! bytes with the resolved identity as sole signer. Atomic single call, no
//! filesystem use, no shared mutable state; safe to invoke from any number
//! of workers concurrently.

use openssl::cms::{CMSOptions, CmsContentInfo};

use crate::error::{Result, SignError};
use crate::store::SigningMaterial;

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCmsBackend;

impl NativeCmsBackend {
    pub fn new() -> Self {
        NativeCmsBackend
    }

    /// Sign `data`, returning the DER-encoded `SignedData` bytes.
    ///
    /// The envelope embeds the content (non-detached) and only the
    /// certificate the material already carries; no additional chain.
    pub fn sign(&self, data: &[u8], material: &SigningMaterial) -> Result<Vec<u8>> {
        let cms = CmsContentInfo::sign(
            Some(&material.certificate),
            Some(&material.private_key),
            None,
            Some(data),
            CMSOptions::BINARY,
        )
    .map_err(|e| SignError::EncoderCreationFailed(e.to_string()))?;

        let der = cms
            .to_der()
            .map_err(|e| SignError::EncodingFailed(e.to_string()))?;

        if der.is_empty() {
            return Err(SignError::EncodingFailed(
                "CMS encoding produced no output".to_string(),
            ));
        }
        Ok(der)
    }
}

/// Check that `signed_der` is a CMS structure whose embedded signature
/// verifies against its embedded content. Certificate chain trust is not
/// evaluated; any parse or verification failure is simply `false`.
pub fn verify_signature(signed_der: &[u8]) -> bool {
    let mut cms = match CmsContentInfo::from_der(signed_der) {
        Ok(cms) => cms,
        Err(_) => return false,
    };
    let mut content = Vec::new();
    cms.verify(
        None,
        None,
        None,
        Some(&mut content),
        CMSOptions::NOVERIFY | CMSOptions::BINARY,
    )
    .is_ok()
}

/// Extract the wrapped content bytes from a non-detached `SignedData`
/// structure, verifying the signature along the way.
pub fn extract_content(signed_der: &[u8]) -> Result<Vec<u8>> {
    let mut cms = CmsContentInfo::from_der(signed_der)
        .map_err(|e| SignError::EncodingFailed(format!("not a CMS structure: {e}")))?;
    let mut content = Vec::new();
    cms.verify(
        None,
        None,
        None,
        Some(&mut content),
        CMSOptions::NOVERIFY | CMSOptions::BINARY,
    )
    .map_err(|e| SignError::SigningFailed(format!("signature verification failed: {e}")))?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::generate_identity;
    use std::time::{Duration, SystemTime};

    fn material() -> SigningMaterial {
        let now = SystemTime::now();
        let (certificate, private_key) = generate_identity(
            "Apple Development: Native Backend Test",
            now - Duration::from_secs(60),
            now + Duration::from_secs(365 * 86_400),
        )
        .unwrap();
        SigningMaterial {
            certificate,
            private_key,
        }
    }

    #[test]
    fn sign_produces_verifiable_der() {
        let backend = NativeCmsBackend::new();
        let material = material();
        let payload = vec![0x42u8; 1024];

        let signed = backend.sign(&payload, &material).unwrap();
        assert!(!signed.is_empty());
        // DER SEQUENCE tag.
        assert_eq!(signed[0], 0x30);
        assert!(verify_signature(&signed));
        assert_eq!(extract_content(&signed).unwrap(), payload);
    }

    #[test]
    fn two_signatures_both_verify_independently() {
        let backend = NativeCmsBackend::new();
        let material = material();
        let payload = b"profile bytes";

        let first = backend.sign(payload, &material).unwrap();
        let second = backend.sign(payload, &material).unwrap();
        assert!(verify_signature(&first));
        assert!(verify_signature(&second));
    }

    #[test]
    fn garbage_does_not_verify() {
        assert!(!verify_signature(b"not a cms structure"));
        assert!(!verify_signature(&[]));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let backend = NativeCmsBackend::new();
        let signed = backend.sign(b"authentic content", &material()).unwrap();

        let mut tampered = signed.clone();
        // Flip a byte near the middle, inside the embedded content.
        let mid = tampered.len() / 2;
        tampered[mid] ^= 0xff;
        assert!(!verify_signature(&tampered));
    }
}
