// src/services/did_resolver.rs
//! DID resolution over HTTP.

use crate::errors::{VcError, VcResult};
use crate::models::did::DidDocument;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde_json::Value;

/// Resolves a DID to its current DID document.
#[async_trait]
pub trait DidResolver: Send + Sync {
    async fn resolve(&self, did: &str) -> VcResult<DidDocument>;
}

/// Universal-resolver style client: `GET {DID_RESOLVER_URL}/{did}`.
pub struct HttpDidResolver {
    client: Client,
    resolver_url: String,
}

impl HttpDidResolver {
    pub fn new(resolver_url: &str) -> Self {
        Self {
            client: Client::new(),
            resolver_url: resolver_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DidResolver for HttpDidResolver {
    /// # Errors
    /// `VcError::Unexpected` on transport failures or a non-200 status,
    /// `VcError::Validation` when the body is not a DID document.
    async fn resolve(&self, did: &str) -> VcResult<DidDocument> {
        let response = self
            .client
            .get(format!("{}/{}", self.resolver_url, did))
            .send()
            .await?;
        let status = response.status();
        debug!("resolver responded with status {} for {}", status, did);
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            return Err(VcError::Unexpected(format!("Unable to resolve did {}: {}", did, text)));
        }
        let mut body: Value = response.json().await?;
        // Resolution results wrap the document; plain resolvers return it directly.
        if let Some(document) = body.get_mut("didDocument") {
            body = document.take();
        }
        serde_json::from_value(body)
            .map_err(|e| VcError::Validation(format!("Unable to parse did document for {}: {}", did, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::mock;

    #[tokio::test]
    async fn test_resolves_wrapped_and_plain_documents() {
        let _wrapped = mock("GET", "/resolver/did:lac1:wrapped")
            .with_status(200)
            .with_body(r#"{"didDocument":{"id":"did:lac1:wrapped"},"didResolutionMetadata":{}}"#)
            .create();
        let _plain = mock("GET", "/resolver/did:lac1:plain")
            .with_status(200)
            .with_body(r#"{"id":"did:lac1:plain"}"#)
            .create();
        let resolver = HttpDidResolver::new(&format!("{}/resolver/", mockito::server_url()));
        assert_eq!(resolver.resolve("did:lac1:wrapped").await.unwrap().id, "did:lac1:wrapped");
        assert_eq!(resolver.resolve("did:lac1:plain").await.unwrap().id, "did:lac1:plain");
    }

    #[tokio::test]
    async fn test_non_200_is_an_error() {
        let _m = mock("GET", "/resolver/did:lac1:missing").with_status(404).create();
        let resolver = HttpDidResolver::new(&format!("{}/resolver", mockito::server_url()));
        assert!(matches!(
            resolver.resolve("did:lac1:missing").await,
            Err(VcError::Unexpected(_))
        ));
    }
}
