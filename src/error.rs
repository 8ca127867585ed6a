use std::path::PathBuf;

use thiserror::Error;

/// Which PKCS#12 component an extraction step was producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionTarget {
    Certificate,
    PrivateKey,
}

impl std::fmt::Display for ExtractionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionTarget::Certificate => write!(f, "certificate"),
            ExtractionTarget::PrivateKey => write!(f, "private key"),
        }
    }
}

/// Error types for profile signing operations.
///
/// Every failure a caller can act on differently gets its own variant, so
/// the UI layer can map variants to messages without parsing strings. No
/// variant ever carries the PKCS#12 password.
#[derive(Error, Debug)]
pub enum SignError {
    #[error("profile data is empty")]
    EmptyInput,

    #[error("signing identity '{0}' has expired")]
    IdentityExpired(String),

    #[error("signing identity '{0}' has no usable private key")]
    IdentityNotSignable(String),

    #[error("openssl tool not found on PATH")]
    ToolUnavailable,

    #[error("failed to create scratch directory: {0}")]
    TempDirCreationFailed(String),

    #[error("scratch directory is not writable: {}", .0.display())]
    DirectoryAccessDenied(PathBuf),

    #[error("certificate file could not be loaded: {}", .0.display())]
    CertificateLoadFailed(PathBuf),

    #[error("incorrect password for the certificate container")]
    WrongPassword,

    #[error("failed to extract {target} from PKCS#12 container (exit code {code})")]
    ExtractionFailed { target: ExtractionTarget, code: i32 },

    #[error("openssl command failed (exit code {code}): {stderr}")]
    ToolCommandFailed { code: i32, stderr: String },

    #[error("failed to construct CMS envelope: {0}")]
    EncoderCreationFailed(String),

    #[error("failed to encode CMS structure: {0}")]
    EncodingFailed(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for profile signing operations.
pub type Result<T> = std::result::Result<T, SignError>;
