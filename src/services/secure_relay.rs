// src/services/secure_relay.rs
//! Delivery of credentials through the secure relay message deliverer.
//!
//! The plaintext is encrypted to the final recipient, wrapped in a DIDComm
//! routing `forward` envelope addressed to the relay, and encrypted a second
//! time to the relay. The relay is authorised with a short-lived ES256K
//! DID-JWT carried in the `token` header.

use crate::config::Settings;
use crate::errors::{VcError, VcResult};
use crate::wallet::key_management::{DidCommEncryptRequest, DidJwtRequest, KeySigner, DID_JWT_ALGORITHM};
use crate::wallet::key_resolution::KeyResolutionCache;
use chrono::Utc;
use ethers_core::types::Address;
use log::{debug, info};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub const FORWARD_MESSAGE_TYPE: &str = "https://didcomm.org/routing/2.0/forward";
/// Lifetime of the relay authorisation token.
pub const DID_JWT_VALIDITY_SECS: i64 = 3600 * 24;
/// Lifetime of a forward envelope at the relay.
pub const ENVELOPE_VALIDITY_SECS: i64 = 3600 * 24 * 60;

/// DIDComm routing `forward` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardEnvelope {
    #[serde(rename = "type")]
    pub type_: String,
    pub to: Vec<String>,
    pub expires_time: i64,
    pub body: ForwardBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardBody {
    pub next: String,
    #[serde(rename = "payloads~attach")]
    pub payloads_attach: Vec<Value>,
}

/// Receipt returned by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub delivery_id: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DeliveryResponse {
    Plain(String),
    Wrapped(Delivery),
}

/// Sender identity of a relay delivery.
#[derive(Debug, Clone)]
pub struct Sender<'a> {
    pub did: &'a str,
    /// Address of the sender's authentication key, signs the DID-JWT.
    pub auth_address: Address,
    /// Hex X25519 key of the sender.
    pub key_exchange_public_key: &'a str,
}

pub struct SecureRelayTransport {
    client: Client,
    keys: Arc<KeyResolutionCache>,
    signer: Arc<dyn KeySigner>,
    relay_did: String,
    send_url: String,
}

impl SecureRelayTransport {
    pub fn new(keys: Arc<KeyResolutionCache>, signer: Arc<dyn KeySigner>, settings: &Settings) -> Self {
        Self {
            client: Client::new(),
            keys,
            signer,
            relay_did: settings.secure_relay_service_did.clone(),
            send_url: format!(
                "{}{}",
                settings.secure_relay_message_deliverer_base_url.trim_end_matches('/'),
                settings.secure_relay_message_deliverer_send
            ),
        }
    }

    /// Encrypts `message` for `recipient_did` and hands it to the relay.
    ///
    /// # Errors
    /// - `VcError::KeyAgreementNotFound` if recipient or relay has no X25519 key
    /// - `VcError::SecureRelayMessageDelivery` if the relay does not answer `200`
    /// - signer errors while creating the token or encrypting
    pub async fn send_data(&self, sender: &Sender<'_>, recipient_did: &str, message: &str) -> VcResult<Delivery> {
        let now = Utc::now().timestamp();
        let token = self
            .signer
            .create_did_jwt(&DidJwtRequest {
                sub_did: sender.did.to_string(),
                aud: self.relay_did.clone(),
                exp: now + DID_JWT_VALIDITY_SECS,
                alg: DID_JWT_ALGORITHM.to_string(),
                signer_address: sender.auth_address,
            })
            .await?;

        let recipient_key = self
            .keys
            .peer_key_exchange_key(recipient_did, "final recipient")
            .await?;
        let encrypted_message = self
            .signer
            .did_comm_encrypt(&DidCommEncryptRequest {
                message: message.to_string(),
                sender_public_key: sender.key_exchange_public_key.to_string(),
                recipient_public_key: recipient_key,
                non_repudiable: false,
            })
            .await?;

        let envelope = ForwardEnvelope {
            type_: FORWARD_MESSAGE_TYPE.to_string(),
            to: vec![self.relay_did.clone()],
            expires_time: now + ENVELOPE_VALIDITY_SECS,
            body: ForwardBody {
                next: recipient_did.to_string(),
                payloads_attach: vec![encrypted_message],
            },
        };

        let relay_key = self
            .keys
            .peer_key_exchange_key(&self.relay_did, "secure relay message deliverer")
            .await?;
        let encrypted_envelope = self
            .signer
            .did_comm_encrypt(&DidCommEncryptRequest {
                message: serde_json::to_string(&envelope)?,
                sender_public_key: sender.key_exchange_public_key.to_string(),
                recipient_public_key: relay_key,
                non_repudiable: false,
            })
            .await?;

        self.deliver(&token, &encrypted_envelope).await
    }

    async fn deliver(&self, token: &str, payload: &Value) -> VcResult<Delivery> {
        let response = self
            .client
            .post(&self.send_url)
            .header("token", token)
            .json(payload)
            .send()
            .await
            .map_err(|e| VcError::SecureRelayMessageDelivery(e.to_string()))?;
        let status = response.status();
        info!("secure relay message deliverer responded with status {}", status);
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            debug!("secure relay message deliverer error body: {}", text);
            return Err(VcError::SecureRelayMessageDelivery(format!("status {}", status)));
        }
        let delivery = response
            .json::<DeliveryResponse>()
            .await
            .map_err(|e| VcError::SecureRelayMessageDelivery(format!("unreadable delivery receipt: {}", e)))?;
        Ok(match delivery {
            DeliveryResponse::Plain(delivery_id) => Delivery { delivery_id },
            DeliveryResponse::Wrapped(delivery) => delivery,
        })
    }
}
