// src/services/api_server.rs
//! REST surface of the DDCC issuer.
//!
//! Endpoints:
//! - `POST /did/lac1`: create a new `did:lac1` for an issuer
//! - `POST /verifiable-credential/ddcc/send`: transform a DDCC bundle into a
//!   verifiable credential, anchor it and deliver it to the receiver
//!
//! Failures are answered with the status class of the [`VcError`] and a
//! `{"message": ...}` body.

use crate::errors::VcError;
use crate::models::ddcc::DdccToVcRequest;
use crate::services::identity::CreatedDid;
use crate::services::vc_service::{DeliveryReceipt, VcService};
use axum::{
    extract::{Json, State},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use log::{error, info};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub const DDCC_SEND_PATH: &str = "/verifiable-credential/ddcc/send";
pub const DID_LAC1_PATH: &str = "/did/lac1";

/// Error body returned by every endpoint.
#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

impl IntoResponse for VcError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// HTTP server exposing the issuance pipeline.
#[derive(Clone)]
pub struct ApiServer {
    service: Arc<VcService>,
}

impl ApiServer {
    pub fn new(service: Arc<VcService>) -> Self {
        Self { service }
    }

    /// The application router, shared state attached.
    pub fn router(&self) -> Router {
        Router::new()
            .route(DID_LAC1_PATH, post(Self::create_did_handler))
            .route(DDCC_SEND_PATH, post(Self::send_ddcc_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::new(self.clone()))
    }

    /// Binds `addr` and serves until the process stops.
    ///
    /// # Errors
    /// I/O errors while binding or serving.
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server running at http://{}", listener.local_addr()?);
        info!("- POST {}", DID_LAC1_PATH);
        info!("- POST {}", DDCC_SEND_PATH);
        axum::serve(listener, self.router()).await
    }

    async fn create_did_handler(State(state): State<Arc<ApiServer>>) -> Result<Json<CreatedDid>, VcError> {
        state.service.create_did().await.map(Json)
    }

    async fn send_ddcc_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<DdccToVcRequest>,
    ) -> Result<Json<DeliveryReceipt>, VcError> {
        state.service.transform_and_send(payload).await.map(Json)
    }
}
