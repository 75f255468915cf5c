// src/errors.rs
//! Error taxonomy for the credential issuance pipeline.
//!
//! Every collaborator failure is folded into [`VcError`] at the call site so
//! the send operation fails with exactly one typed error. Validation and key
//! resolution problems are client errors; transport failures are server
//! errors unless explicitly tolerated by the proof-of-existence mode.

use axum::http::StatusCode;
use thiserror::Error;

/// Typed failures surfaced by the issuance, proof and delivery pipeline.
#[derive(Debug, Error)]
pub enum VcError {
    /// Malformed or missing DDCC fields, undecodable DIDs, bad bundles.
    #[error("{0}")]
    Validation(String),

    /// No usable assertion/authentication key exists, even after provisioning.
    #[error("Verification method was not found: {0}")]
    VerificationMethodNotFound(String),

    /// The DID document carries no X25519 key agreement entry.
    #[error("Key agreement was not found {0}")]
    KeyAgreementNotFound(String),

    /// The signing backend holds no private key for the requested public key.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Any other signing backend failure.
    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("An error occurred while trying to canonicalize message: {0}")]
    Canonicalization(String),

    #[error("The chain id extracted from the passed DID is not supported: expected {expected}, found {found}")]
    ChainIdFromDidNotSupported { expected: String, found: String },

    #[error("There was an error while attempting to register a Proof of existence: {0}")]
    ProofOfExistenceFailed(String),

    #[error("An error occurred while trying to send message through secure relay message deliverer: {0}")]
    SecureRelayMessageDelivery(String),

    /// Uncategorized collaborator failure.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl VcError {
    /// HTTP status class used by the API layer.
    pub fn status_code(&self) -> StatusCode {
        match self {
            VcError::Validation(_)
            | VcError::VerificationMethodNotFound(_)
            | VcError::KeyAgreementNotFound(_)
            | VcError::Canonicalization(_)
            | VcError::ChainIdFromDidNotSupported { .. } => StatusCode::BAD_REQUEST,
            VcError::KeyNotFound(_)
            | VcError::Signing(_)
            | VcError::ProofOfExistenceFailed(_)
            | VcError::SecureRelayMessageDelivery(_)
            | VcError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for VcError {
    fn from(err: reqwest::Error) -> Self {
        VcError::Unexpected(err.to_string())
    }
}

impl From<serde_json::Error> for VcError {
    fn from(err: serde_json::Error) -> Self {
        VcError::Unexpected(err.to_string())
    }
}

/// Convenience alias used across the crate.
pub type VcResult<T> = Result<T, VcError>;
