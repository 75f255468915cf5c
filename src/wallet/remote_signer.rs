// src/wallet/remote_signer.rs
//! Key manager reached over HTTP.
//!
//! Each operation is a JSON `POST` to `KEY_MANAGER_BASE_URL` + its endpoint
//! path. Any status other than `200` is a failure; a body mentioning
//! `Key not found` is reported as [`VcError::KeyNotFound`] so capability
//! probes can tell a missing key from a broken backend.

use crate::config::Settings;
use crate::errors::{VcError, VcResult};
use crate::utils::crypto::decode_hex;
use crate::wallet::key_management::{
    DidCommEncryptRequest, DidJwtRequest, KeySigner, LacchainTransactionRequest, SignPlainMessageByAddress,
    SignPlainMessageByCompressedPublicKey,
};
use async_trait::async_trait;
use ethers_core::types::Bytes;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const KEY_NOT_FOUND: &str = "Key not found";

#[derive(Debug, Deserialize)]
struct SignatureResponse {
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedTransactionResponse {
    signed_transaction: String,
}

#[derive(Debug, Clone)]
pub struct KeyManagerEndpoints {
    pub base_url: String,
    pub secp256k1_plain_message_sign: String,
    pub p256_plain_message_sign: String,
    pub did_jwt: String,
    pub did_comm_encrypt: String,
    pub secp256k1_sign_lacchain_transaction: String,
}

impl KeyManagerEndpoints {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base_url: settings.key_manager_base_url.trim_end_matches('/').to_string(),
            secp256k1_plain_message_sign: settings.key_manager_secp256k1_plain_message_sign.clone(),
            p256_plain_message_sign: settings.key_manager_p256_plain_message_sign.clone(),
            did_jwt: settings.key_manager_did_jwt.clone(),
            did_comm_encrypt: settings.key_manager_did_comm_encrypt.clone(),
            secp256k1_sign_lacchain_transaction: settings.key_manager_secp256k1_sign_lacchain_transaction.clone(),
        }
    }
}

pub struct HttpKeySigner {
    client: Client,
    endpoints: KeyManagerEndpoints,
}

impl HttpKeySigner {
    pub fn new(endpoints: KeyManagerEndpoints) -> Self {
        Self {
            client: Client::new(),
            endpoints,
        }
    }

    async fn post<Req, Res>(&self, path: &str, body: &Req) -> VcResult<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let url = format!("{}{}", self.endpoints.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| VcError::Signing(e.to_string()))?;
        let status = response.status();
        debug!("key manager {} responded with status {}", path, status);
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            if text.contains(KEY_NOT_FOUND) {
                return Err(VcError::KeyNotFound(text));
            }
            return Err(VcError::Signing(format!("key manager {} returned {}: {}", path, status, text)));
        }
        response
            .json::<Res>()
            .await
            .map_err(|e| VcError::Signing(format!("unexpected key manager response: {}", e)))
    }
}

#[async_trait]
impl KeySigner for HttpKeySigner {
    async fn sign_secp256k1(&self, request: &SignPlainMessageByAddress) -> VcResult<Vec<u8>> {
        let response: SignatureResponse = self
            .post(&self.endpoints.secp256k1_plain_message_sign, request)
            .await?;
        decode_hex(&response.signature)
    }

    async fn sign_p256(&self, request: &SignPlainMessageByCompressedPublicKey) -> VcResult<Vec<u8>> {
        let response: SignatureResponse = self.post(&self.endpoints.p256_plain_message_sign, request).await?;
        decode_hex(&response.signature)
    }

    async fn create_did_jwt(&self, request: &DidJwtRequest) -> VcResult<String> {
        self.post(&self.endpoints.did_jwt, request).await
    }

    async fn did_comm_encrypt(&self, request: &DidCommEncryptRequest) -> VcResult<Value> {
        self.post(&self.endpoints.did_comm_encrypt, request).await
    }

    async fn sign_lacchain_transaction(&self, request: &LacchainTransactionRequest) -> VcResult<Bytes> {
        let response: SignedTransactionResponse = self
            .post(&self.endpoints.secp256k1_sign_lacchain_transaction, request)
            .await?;
        Ok(Bytes::from(decode_hex(&response.signed_transaction)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_settings;
    use ethers_core::types::Address;
    use mockito::{mock, Matcher};

    fn signer() -> HttpKeySigner {
        HttpKeySigner::new(KeyManagerEndpoints::from_settings(&test_settings(&mockito::server_url())))
    }

    #[tokio::test]
    async fn test_sign_secp256k1_decodes_signature() {
        let _m = mock("POST", "/api/v1/secp256k1/sign/plain-message")
            .match_body(Matcher::PartialJsonString(r#"{"messageHash":"0x01"}"#.into()))
            .with_status(200)
            .with_body(r#"{"signature":"0x0a0b"}"#)
            .create();
        let signature = signer()
            .sign_secp256k1(&SignPlainMessageByAddress {
                address: Address::repeat_byte(1),
                message_hash: "0x01".into(),
            })
            .await
            .unwrap();
        assert_eq!(signature, vec![0x0a, 0x0b]);
    }

    #[tokio::test]
    async fn test_key_not_found_makes_probe_false() {
        let _m = mock("POST", "/api/v1/p256/sign/plain-message")
            .with_status(400)
            .with_body(r#"{"message":"Key not found"}"#)
            .create();
        assert!(!signer().can_sign_p256(&[2u8; 33]).await.unwrap());
    }

    #[tokio::test]
    async fn test_other_failures_propagate() {
        let _m = mock("POST", "/api/v1/did-jwt/generate")
            .with_status(500)
            .with_body("boom")
            .create();
        let err = signer()
            .create_did_jwt(&DidJwtRequest {
                sub_did: "did:lac1:a".into(),
                aud: "did:lac1:b".into(),
                exp: 1,
                alg: "ES256K".into(),
                signer_address: Address::zero(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VcError::Signing(_)));
    }
}
