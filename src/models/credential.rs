// src/models/credential.rs
//! Verifiable Credential data model for DDCC vaccination certificates.
//!
//! Follows the [W3C Verifiable Credentials Data Model](https://www.w3.org/TR/vc-data-model/)
//! in both of its generations: v1 documents carry `issuanceDate` /
//! `expirationDate`, v2 documents carry `validFrom` / `validUntil`.
//!
//! Two proof formats can be attached:
//! - `EcdsaSecp256k1Signature2019`, the legacy hex signature proof
//! - `DataIntegrityProof` with the `ecdsa-jcs-2019` cryptosuite

use crate::models::did::Curve;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
pub const CREDENTIALS_V2_CONTEXT: &str = "https://www.w3.org/ns/credentials/v2";
pub const VACCINATION_CONTEXT: &str = "https://credentials-library.lacchain.net/credentials/health/vaccination/v3";

pub const ASSERTION_METHOD: &str = "assertionMethod";
pub const LEGACY_PROOF_TYPE: &str = "EcdsaSecp256k1Signature2019";
pub const DATA_INTEGRITY_PROOF_TYPE: &str = "DataIntegrityProof";
pub const ECDSA_JCS_2019: &str = "ecdsa-jcs-2019";

/// Credential schema generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialGeneration {
    V1,
    V2,
}

impl CredentialGeneration {
    /// Base W3C context of this generation.
    pub fn base_context(&self) -> &'static str {
        match self {
            CredentialGeneration::V1 => CREDENTIALS_V1_CONTEXT,
            CredentialGeneration::V2 => CREDENTIALS_V2_CONTEXT,
        }
    }
}

/// Proof suite attached to an issued credential.
///
/// Selected by caller intent, independent of the credential generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofSuite {
    #[serde(rename = "EcdsaSecp256k1Signature2019")]
    Legacy,
    #[serde(rename = "DataIntegrityProof")]
    DataIntegrity,
}

impl ProofSuite {
    /// Curve of the assertion key the suite signs with.
    pub fn curve(&self) -> Curve {
        match self {
            ProofSuite::Legacy => Curve::Secp256k1,
            ProofSuite::DataIntegrity => Curve::P256,
        }
    }
}

/// Validity window, named per credential generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Validity {
    V1 {
        #[serde(rename = "issuanceDate")]
        issuance_date: String,
        #[serde(rename = "expirationDate", default, skip_serializing_if = "Option::is_none")]
        expiration_date: Option<String>,
    },
    V2 {
        #[serde(rename = "validFrom")]
        valid_from: String,
        #[serde(rename = "validUntil", default, skip_serializing_if = "Option::is_none")]
        valid_until: Option<String>,
    },
}

impl Validity {
    pub fn new(generation: CredentialGeneration, start: String, end: Option<String>) -> Self {
        match generation {
            CredentialGeneration::V1 => Validity::V1 {
                issuance_date: start,
                expiration_date: end,
            },
            CredentialGeneration::V2 => Validity::V2 {
                valid_from: start,
                valid_until: end,
            },
        }
    }

    pub fn end(&self) -> Option<&str> {
        match self {
            Validity::V1 { expiration_date, .. } => expiration_date.as_deref(),
            Validity::V2 { valid_until, .. } => valid_until.as_deref(),
        }
    }

    /// End of validity as unix seconds, `0` when the credential never expires.
    pub fn expiration_timestamp(&self) -> u64 {
        self.end()
            .and_then(|end| DateTime::parse_from_rfc3339(end).ok())
            .map(|end| end.timestamp().max(0) as u64)
            .unwrap_or(0)
    }
}

/// Formats a timestamp the way JavaScript `Date.toJSON` does: `YYYY-MM-DDTHH:MM:SS.sssZ`.
pub fn to_json_date(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Person who received the vaccine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaccineRecipient {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: String,
    pub name: String,
    pub birth_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub gender: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vaccine {
    #[serde(rename = "type")]
    pub type_: String,
    pub atc_code: String,
    pub medicinal_product_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketing_authorization_holder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disease: Option<String>,
}

/// The QR code image shipped with the certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageObject {
    #[serde(rename = "type")]
    pub type_: String,
    pub name: String,
    pub alternate_name: String,
    pub description: String,
    pub encoding_format: String,
    pub content_url: String,
}

/// Credential subject of a DDCC credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaccinationEvent {
    #[serde(rename = "type")]
    pub type_: String,
    pub batch_number: String,
    pub country_of_vaccination: String,
    pub date_of_vaccination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administering_centre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_vaccination_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_doses: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_professional: Option<String>,
    pub order: String,
    pub recipient: VaccineRecipient,
    pub vaccine: Vaccine,
    pub image: ImageObject,
}

/// An unsigned DDCC credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DdccCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    #[serde(rename = "type")]
    pub type_: Vec<String>,
    pub issuer: String,
    pub name: String,
    pub identifier: String,
    #[serde(flatten)]
    pub validity: Validity,
    pub credential_subject: VaccinationEvent,
}

/// Legacy hex signature proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Type1Proof {
    /// Issuer DID.
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub proof_purpose: String,
    pub verification_method: String,
    pub domain: String,
    /// `0x` prefixed hex signature.
    pub proof_value: String,
}

/// Data Integrity proof options, hashed before signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofConfig {
    #[serde(rename = "type")]
    pub type_: String,
    pub cryptosuite: String,
    pub created: String,
    pub proof_purpose: String,
    pub verification_method: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataIntegrityProof {
    #[serde(flatten)]
    pub config: ProofConfig,
    /// Base58 encoded signature.
    pub proof_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Proof {
    Type1(Type1Proof),
    DataIntegrity(DataIntegrityProof),
}

/// A DDCC credential with its proof attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiableCredential {
    #[serde(flatten)]
    pub credential: DdccCredential,
    pub proof: Proof,
}
