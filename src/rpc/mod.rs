//! gRPC service implementation: wires [`crate::dispatcher::Dispatcher`] and
//! [`crate::validator::ValidProxyMap`] to the `FetchProxyService` RPCs.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::validator::ValidProxyMap;
use crate::FetchError;

pub mod proto {
    tonic::include_proto!("fetchproxy");
}

use proto::fetch_proxy_service_server::{FetchProxyService, FetchProxyServiceServer};
use proto::{
    FetchContentRequest, FetchContentResponse, GetProxyStatsRequest, GetProxyStatsResponse,
    GetRandomProxyRequest, GetRandomProxyResponse,
};

/// The service implementation backing `FetchProxyService`.
pub struct Service {
    dispatcher: Arc<Dispatcher>,
    valid_proxies: Arc<ValidProxyMap>,
}

impl Service {
    pub fn new(dispatcher: Arc<Dispatcher>, valid_proxies: Arc<ValidProxyMap>) -> Self {
        Self {
            dispatcher,
            valid_proxies,
        }
    }

    /// Wraps this service in a tonic server with the 64 MiB message-size
    /// limits the original `GRPC_OPTIONS` configured.
    pub fn into_server(self) -> FetchProxyServiceServer<Self> {
        FetchProxyServiceServer::new(self)
            .max_decoding_message_size(crate::config::MAX_MESSAGE_SIZE)
            .max_encoding_message_size(crate::config::MAX_MESSAGE_SIZE)
    }
}

/// Maps internal fetch failures onto gRPC status codes. Only
/// caller-facing conditions (bad/missing session name) become
/// `InvalidArgument`; everything else the dispatcher couldn't recover from
/// is `Internal`, without leaking which fallback step failed.
fn to_status(err: FetchError) -> Status {
    match err {
        FetchError::EmptySession => {
            Status::invalid_argument("La sesión no puede estar vacía")
        }
        FetchError::UnknownSession(name) => {
            Status::invalid_argument(format!("sesión '{}' no encontrada", name))
        }
        other => Status::internal(other.to_string()),
    }
}

#[tonic::async_trait]
impl FetchProxyService for Service {
    async fn fetch_content(
        &self,
        request: Request<FetchContentRequest>,
    ) -> Result<Response<FetchContentResponse>, Status> {
        let req = request.into_inner();
        info!(session = %req.session, "FetchContent called");

        let content = self
            .dispatcher
            .fetch_content(&req.session, &req.url, req.proxy)
            .await
            .map_err(to_status)?;

        Ok(Response::new(FetchContentResponse { content }))
    }

    async fn get_random_proxy(
        &self,
        request: Request<GetRandomProxyRequest>,
    ) -> Result<Response<GetRandomProxyResponse>, Status> {
        let req = request.into_inner();

        if req.session.trim().is_empty() {
            return Err(Status::invalid_argument("La sesión no puede estar vacía"));
        }

        if !crate::sessions::contains(&req.session) {
            return Ok(Response::new(GetRandomProxyResponse {
                success: false,
                message: format!("sesión '{}' no encontrada en configuración", req.session),
                proxy: String::new(),
            }));
        }

        match self.dispatcher.random_proxy(&req.session).await {
            Some(endpoint) => Ok(Response::new(GetRandomProxyResponse {
                success: true,
                message: String::new(),
                proxy: format!("{}:{}", endpoint.host, endpoint.port),
            })),
            None => Ok(Response::new(GetRandomProxyResponse {
                success: false,
                message: "No hay proxies válidos disponibles para esta sesión".to_string(),
                proxy: String::new(),
            })),
        }
    }

    async fn get_proxy_stats(
        &self,
        _request: Request<GetProxyStatsRequest>,
    ) -> Result<Response<GetProxyStatsResponse>, Status> {
        let (counts, total) = self.valid_proxies.stats().await;
        let counts = counts.into_iter().map(|(k, v)| (k, v as u32)).collect();
        Ok(Response::new(GetProxyStatsResponse {
            counts,
            total: total as u32,
        }))
    }
}

/// Binds and serves `FetchProxyService` on [`crate::config::LISTEN_ADDR`]
/// until `shutdown` resolves.
pub async fn serve(
    service: Service,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), tonic::transport::Error> {
    let addr = crate::config::LISTEN_ADDR
        .parse()
        .expect("LISTEN_ADDR is a valid socket address");

    info!(%addr, "starting gRPC server");

    tonic::transport::Server::builder()
        .add_service(service.into_server())
        .serve_with_shutdown(addr, shutdown)
        .await
        .map_err(|e| {
            warn!("gRPC server exited with error: {}", e);
            e
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_session_maps_to_invalid_argument() {
        let status = to_status(FetchError::EmptySession);
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn test_unknown_session_maps_to_invalid_argument() {
        let status = to_status(FetchError::UnknownSession("x".to_string()));
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn test_all_strategies_failed_maps_to_internal() {
        let status = to_status(FetchError::AllStrategiesFailed("x".to_string()));
        assert_eq!(status.code(), tonic::Code::Internal);
    }
}
