pub mod api_server;
pub mod credential_issuer;
pub mod did_resolver;
pub mod domain_encoder;
pub mod identity;
pub mod proof_engine;
pub mod secure_relay;
pub mod vc_service;
pub mod verification_registry;
