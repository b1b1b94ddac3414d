//! Crypto engine sidecar: proto definitions and service implementation.
//!
//! The binary in this crate is spawned by the node as a child
//! process and serves [`proto::crypto_engine_server::CryptoEngine`]
//! on loopback. The node links this crate as a library for the
//! generated client stubs used by its health prober.

use chrono::Utc;
use tonic::{Request, Response, Status};

use proto::crypto_engine_server::CryptoEngine;
use proto::{
    ExportIdentityRequest, ExportIdentityResponse, GenerateIdentityRequest,
    GenerateIdentityResponse, ImportIdentityRequest, ImportIdentityResponse, PingRequest,
    PingResponse,
};

/// Generated protobuf/gRPC code from `proto/engine.proto`.
pub mod proto {
    tonic::include_proto!("veilchat.engine");
}

pub use proto::crypto_engine_client::CryptoEngineClient;
pub use proto::crypto_engine_server::CryptoEngineServer;

/// The [`CryptoEngine`] service implementation.
///
/// Only `Ping` is live today; the MLS identity operations answer
/// `UNIMPLEMENTED` until the MLS layer lands.
#[derive(Debug, Default)]
pub struct EngineService;

#[tonic::async_trait]
impl CryptoEngine for EngineService {
    async fn ping(
        &self,
        _request: Request<PingRequest>,
    ) -> Result<Response<PingResponse>, Status> {
        tracing::debug!("received ping");
        Ok(Response::new(PingResponse {
            message: "pong from veilchat-engine".to_string(),
            timestamp: Utc::now().timestamp(),
        }))
    }

    async fn generate_identity(
        &self,
        _request: Request<GenerateIdentityRequest>,
    ) -> Result<Response<GenerateIdentityResponse>, Status> {
        Err(Status::unimplemented("GenerateIdentity is not yet implemented"))
    }

    async fn export_identity(
        &self,
        _request: Request<ExportIdentityRequest>,
    ) -> Result<Response<ExportIdentityResponse>, Status> {
        Err(Status::unimplemented("ExportIdentity is not yet implemented"))
    }

    async fn import_identity(
        &self,
        _request: Request<ImportIdentityRequest>,
    ) -> Result<Response<ImportIdentityResponse>, Status> {
        Err(Status::unimplemented("ImportIdentity is not yet implemented"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ping_answers_with_message_and_timestamp() {
        let service = EngineService;
        let response = service
            .ping(Request::new(PingRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert!(response.message.contains("pong"));
        assert!(response.timestamp > 0);
    }

    #[tokio::test]
    async fn identity_rpcs_are_unimplemented() {
        let service = EngineService;
        let status = service
            .generate_identity(Request::new(GenerateIdentityRequest {
                user_name: "alice".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unimplemented);

        let status = service
            .export_identity(Request::new(ExportIdentityRequest {}))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unimplemented);

        let status = service
            .import_identity(Request::new(ImportIdentityRequest { identity: vec![] }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unimplemented);
    }
}
