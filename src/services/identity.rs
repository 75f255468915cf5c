// src/services/identity.rs
//! Identity manager client for `did:lac1` identifiers.
//!
//! The identity manager owns DID creation, DID decoding, controller lookup and
//! the on-chain registration of new key attributes. This service only talks
//! to it over HTTP.

use crate::config::{parse_chain_id, Settings};
use crate::errors::{VcError, VcResult};
use crate::models::did::EcJwk;
use async_trait::async_trait;
use ethers_core::types::{Address, U256};
use log::debug;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Validity of provisioned key attributes.
pub const ATTRIBUTE_VALID_DAYS: u32 = 365;

/// Relation codes understood by the identity manager.
pub const RELATION_AUTHENTICATION: &str = "auth";
pub const RELATION_KEY_AGREEMENT: &str = "keya";
pub const RELATION_ASSERTION: &str = "asse";

/// Addresses encoded in a `did:lac1` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedDid {
    pub address: Address,
    pub did_registry_address: Address,
    /// Hex chain id as encoded in the DID.
    pub chain_id: String,
}

impl DecodedDid {
    pub fn chain_id_value(&self) -> Option<U256> {
        parse_chain_id(&self.chain_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttribute {
    pub did: String,
    pub valid_days: u32,
    pub relation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJwkAttribute {
    pub did: String,
    pub valid_days: u32,
    pub relation: String,
    pub jwk_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttributeResponse {
    /// Hex public key, with or without `0x`.
    pub public_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewJwkAttributeResponse {
    pub jwk: EcJwk,
}

/// Response of the DID creation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedDid {
    pub did: String,
}

#[derive(Debug, Deserialize)]
struct ControllerResponse {
    controller: Address,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Creates a new `did:lac1` controlled by the identity manager.
    async fn create_did(&self) -> VcResult<CreatedDid>;

    async fn decode_did(&self, did: &str) -> VcResult<DecodedDid>;

    /// Current on-chain controller of `did`.
    async fn get_controller(&self, did: &str) -> VcResult<Address>;

    async fn add_new_secp256k1_attribute(&self, attribute: &NewAttribute) -> VcResult<NewAttributeResponse>;

    async fn add_new_ed25519_attribute(&self, attribute: &NewAttribute) -> VcResult<NewAttributeResponse>;

    async fn add_new_jwk_attribute(&self, attribute: &NewJwkAttribute) -> VcResult<NewJwkAttributeResponse>;
}

#[derive(Debug, Clone)]
pub struct IdentityEndpoints {
    pub base_url: String,
    pub did_lac1: String,
    pub controller: String,
    pub decode_did: String,
    pub add_new_secp256k1_attribute: String,
    pub add_new_ed25519_attribute: String,
    pub add_new_jwk_attribute: String,
}

impl IdentityEndpoints {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base_url: settings.identity_manager_base_url.trim_end_matches('/').to_string(),
            did_lac1: settings.did_lac1.clone(),
            controller: settings.did_lac1_controller.clone(),
            decode_did: settings.did_lac1_decode_did.clone(),
            add_new_secp256k1_attribute: settings.did_lac1_add_new_secp256k1_attribute.clone(),
            add_new_ed25519_attribute: settings.did_lac1_add_new_ed25519_attribute.clone(),
            add_new_jwk_attribute: settings.did_lac1_add_new_jwk_attribute.clone(),
        }
    }
}

pub struct HttpIdentityService {
    client: Client,
    endpoints: IdentityEndpoints,
}

impl HttpIdentityService {
    pub fn new(endpoints: IdentityEndpoints) -> Self {
        Self {
            client: Client::new(),
            endpoints,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoints.base_url, path)
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, failure: &str) -> VcResult<T> {
        let response = request.send().await?;
        let status = response.status();
        debug!("identity manager responded with status {}", status);
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            return Err(VcError::Unexpected(format!("{}: {}", failure, text)));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl IdentityService for HttpIdentityService {
    async fn create_did(&self) -> VcResult<CreatedDid> {
        let request = self.client.post(self.url(&self.endpoints.did_lac1));
        self.execute(request, "An internal server error occurred while trying to create a new did")
            .await
    }

    async fn decode_did(&self, did: &str) -> VcResult<DecodedDid> {
        let request = self
            .client
            .get(format!("{}/{}", self.url(&self.endpoints.decode_did), did));
        self.execute(request, "Error while decoding did").await
    }

    async fn get_controller(&self, did: &str) -> VcResult<Address> {
        let request = self
            .client
            .get(format!("{}/{}", self.url(&self.endpoints.controller), did));
        let response: ControllerResponse = self
            .execute(request, "Error while trying to get did controller")
            .await?;
        Ok(response.controller)
    }

    async fn add_new_secp256k1_attribute(&self, attribute: &NewAttribute) -> VcResult<NewAttributeResponse> {
        let request = self
            .client
            .post(self.url(&self.endpoints.add_new_secp256k1_attribute))
            .json(attribute);
        self.execute(request, "Error while associating attribute to did").await
    }

    async fn add_new_ed25519_attribute(&self, attribute: &NewAttribute) -> VcResult<NewAttributeResponse> {
        let request = self
            .client
            .post(self.url(&self.endpoints.add_new_ed25519_attribute))
            .json(attribute);
        self.execute(request, "Error while associating attribute to did").await
    }

    async fn add_new_jwk_attribute(&self, attribute: &NewJwkAttribute) -> VcResult<NewJwkAttributeResponse> {
        let request = self
            .client
            .post(self.url(&self.endpoints.add_new_jwk_attribute))
            .json(attribute);
        self.execute(request, "Error while associating attribute to did").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_settings;
    use mockito::{mock, Matcher};

    fn service() -> HttpIdentityService {
        HttpIdentityService::new(IdentityEndpoints::from_settings(&test_settings(&mockito::server_url())))
    }

    #[tokio::test]
    async fn test_decode_did() {
        let _m = mock("GET", "/api/v1/did/lac1/decode/did:lac1:decodable")
            .with_status(200)
            .with_body(
                r#"{"address":"0x1111111111111111111111111111111111111111",
                    "didRegistryAddress":"0x2222222222222222222222222222222222222222",
                    "chainId":"0x9e55c"}"#,
            )
            .create();
        let decoded = service().decode_did("did:lac1:decodable").await.unwrap();
        assert_eq!(decoded.address, Address::repeat_byte(0x11));
        assert_eq!(decoded.did_registry_address, Address::repeat_byte(0x22));
        assert_eq!(decoded.chain_id_value(), Some(U256::from(0x9e55c_u64)));
    }

    #[tokio::test]
    async fn test_add_jwk_attribute_sends_relation() {
        let _m = mock("POST", "/api/v1/did/lac1/attribute/add/jwk")
            .match_body(Matcher::Json(serde_json::json!({
                "did": "did:lac1:holder",
                "validDays": 365,
                "relation": "asse",
                "jwkType": "P-256"
            })))
            .with_status(200)
            .with_body(r#"{"jwk":{"kty":"EC","crv":"P-256","x":"AAAA","y":"BBBB"}}"#)
            .create();
        let response = service()
            .add_new_jwk_attribute(&NewJwkAttribute {
                did: "did:lac1:holder".into(),
                valid_days: ATTRIBUTE_VALID_DAYS,
                relation: RELATION_ASSERTION.into(),
                jwk_type: "P-256".into(),
            })
            .await
            .unwrap();
        assert_eq!(response.jwk.crv, "P-256");
    }

    #[tokio::test]
    async fn test_controller_failure() {
        let _m = mock("GET", "/api/v1/did/lac1/controller/did:lac1:broken")
            .with_status(500)
            .create();
        assert!(matches!(
            service().get_controller("did:lac1:broken").await,
            Err(VcError::Unexpected(_))
        ));
    }

    #[tokio::test]
    async fn test_create_did() {
        let _m = mock("POST", "/api/v1/did/lac1")
            .with_status(200)
            .with_body(r#"{"did":"did:lac1:fresh"}"#)
            .create();
        assert_eq!(service().create_did().await.unwrap().did, "did:lac1:fresh");
    }
}
