//! gRPC transport layer for the dashboard.
//!
//! Only the dashboard-side calls are exposed: list connections, recent events
//! and the live subscription. Adapter-side commands (publish, register,
//! status updates) stay in-process. Payloads travel as JSON bytes using the
//! same serde representation as the library types.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

use crate::error::{AajiError, ExecutionError};
use crate::event::EventId;
use crate::feed::LiveFeed;
use crate::registry::ConnectionRegistry;

#[allow(missing_docs, clippy::pedantic)]
pub mod proto {
    tonic::include_proto!("aaji");
}

use proto::dashboard_service_server::{DashboardService, DashboardServiceServer};

// ----------------------------------------------------------------------------
// Limits (DoS protection)
// ----------------------------------------------------------------------------

/// Maximum size of a list/history response payload.
const MAX_RESPONSE_JSON_BYTES: usize = 4 * 1024 * 1024; // 4 MiB

/// Maximum size of a single streamed event payload.
const MAX_EVENT_JSON_BYTES: usize = 64 * 1024; // 64 KiB

/// Outbound gRPC stream buffer per subscriber.
const STREAM_BUFFER: usize = 128;

/// How often a blocked subscription checks for client disconnect.
const DISCONNECT_POLL: Duration = Duration::from_secs(5);

/// gRPC service implementation for the dashboard surface.
pub struct DashboardServiceImpl {
    registry: Arc<ConnectionRegistry>,
    feed: Arc<LiveFeed>,
}

impl DashboardServiceImpl {
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, feed: Arc<LiveFeed>) -> Self {
        Self { registry, feed }
    }

    #[must_use]
    pub fn into_server(self) -> DashboardServiceServer<Self> {
        DashboardServiceServer::new(self)
    }
}

fn encode_json<T: Serialize>(value: &T, max: usize) -> Result<Vec<u8>, Status> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| Status::internal(format!("failed to serialize response JSON: {e}")))?;
    if bytes.len() > max {
        return Err(Status::resource_exhausted("serialized JSON exceeds size limit"));
    }
    Ok(bytes)
}

/// Map a domain error to a gRPC status.
#[must_use]
pub fn status_from_error(err: AajiError) -> Status {
    match err {
        AajiError::Validation(v) => Status::invalid_argument(v.to_string()),
        AajiError::Config { message } | AajiError::Internal { message } => Status::internal(message),
        AajiError::Execution(e) => match e {
            ExecutionError::UnknownChannel { .. } => Status::not_found(e.to_string()),
            ExecutionError::DuplicateChannel { .. } => Status::already_exists(e.to_string()),
            ExecutionError::ReplayGap { .. } => Status::out_of_range(e.to_string()),
            ExecutionError::SubscriberOverflow { .. } => Status::resource_exhausted(e.to_string()),
            ExecutionError::FeedClosed | ExecutionError::Disconnected { .. } => Status::unavailable(e.to_string()),
            ExecutionError::Timeout { .. } => Status::deadline_exceeded(e.to_string()),
        },
    }
}

#[tonic::async_trait]
impl DashboardService for DashboardServiceImpl {
    async fn list_connections(
        &self,
        _request: Request<proto::ListConnectionsRequest>,
    ) -> Result<Response<proto::ListConnectionsResponse>, Status> {
        let connections = self.registry.list().map_err(status_from_error)?;
        let connections_json = encode_json(&connections, MAX_RESPONSE_JSON_BYTES)?;
        Ok(Response::new(proto::ListConnectionsResponse { connections_json }))
    }

    async fn recent_events(
        &self,
        request: Request<proto::RecentEventsRequest>,
    ) -> Result<Response<proto::RecentEventsResponse>, Status> {
        let req = request.into_inner();
        // 0 means "everything retained".
        let limit = match usize::try_from(req.limit) {
            Ok(0) | Err(_) => self.feed.capacity(),
            Ok(n) => n,
        };
        let events = self.feed.history(limit).map_err(status_from_error)?;
        let events_json = encode_json(&events, MAX_RESPONSE_JSON_BYTES)?;
        Ok(Response::new(proto::RecentEventsResponse { events_json }))
    }

    type SubscribeStream = ReceiverStream<Result<proto::FeedEvent, Status>>;

    async fn subscribe(
        &self,
        request: Request<proto::SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let req = request.into_inner();
        let subscription = self
            .feed
            .subscribe(req.since.map(EventId::new))
            .map_err(status_from_error)?;
        debug!(subscription = %subscription.id(), since = ?req.since, "grpc subscribe");

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<proto::FeedEvent, Status>>(STREAM_BUFFER);
        tokio::task::spawn_blocking(move || loop {
            match subscription.recv_timeout(DISCONNECT_POLL) {
                Ok(event) => {
                    let encoded = match encode_json(&event, MAX_EVENT_JSON_BYTES) {
                        Ok(v) => v,
                        Err(status) => {
                            warn!(event = %event.id, "dropping subscription: event not encodable");
                            let _ = tx.blocking_send(Err(status));
                            break;
                        }
                    };

                    if tx.blocking_send(Ok(proto::FeedEvent { event_json: encoded })).is_err() {
                        break;
                    }
                }
                Err(AajiError::Execution(ExecutionError::Timeout { .. })) => {
                    if tx.is_closed() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx.blocking_send(Err(status_from_error(err)));
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

pub use proto::dashboard_service_client::DashboardServiceClient;
