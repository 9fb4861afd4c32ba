//! Request transport.
//!
//! A small JSON/HTTP front-end that turns client requests into service
//! requests for the run-loop. Handlers never touch the address space
//! themselves: each request is queued on the run-loop channel and the handler
//! waits for the answer.
//!
//! | Method | Path | Service |
//! |--------|------|---------|
//! | GET | `/` | server info |
//! | GET | `/nodes` | browse the Objects folder |
//! | GET | `/nodes/{node_id}/children` | browse a node |
//! | GET | `/nodes/{node_id}` | read (`attribute`, `index_range`, `timestamps` query) |
//! | PUT | `/nodes/{node_id}` | write (`{"value": <number>}`) |

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode as HttpStatus;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use crate::access::SessionId;
use crate::lifecycle::RunningFlag;
use crate::server::ServerInfo;
use crate::service::{BrowseResponse, ReadRequest, ReadResponse, WriteRequest, WriteResponse};
use crate::types::{AttributeId, NodeId, TimestampsToReturn, Variant};

/// Request queued for the run-loop, with the channel to answer on.
#[derive(Debug)]
pub(crate) enum ServiceRequest {
    Info {
        reply: oneshot::Sender<ServerInfo>,
    },
    Read {
        session: SessionId,
        request: ReadRequest,
        reply: oneshot::Sender<ReadResponse>,
    },
    Write {
        session: SessionId,
        request: WriteRequest,
        reply: oneshot::Sender<WriteResponse>,
    },
    Browse {
        node_id: NodeId,
        reply: oneshot::Sender<BrowseResponse>,
    },
}

/// Transport-level failures. Service-level failures travel as status codes
/// inside successful responses.
#[derive(Debug, thiserror::Error)]
pub(crate) enum TransportError {
    #[error("{0}")]
    InvalidNodeId(String),

    #[error("Server is shutting down")]
    Unavailable,
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        let status = match self {
            TransportError::InvalidNodeId(_) => HttpStatus::NOT_FOUND,
            TransportError::Unavailable => HttpStatus::SERVICE_UNAVAILABLE,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[derive(Clone)]
struct TransportState {
    requests: mpsc::Sender<ServiceRequest>,
}

impl TransportState {
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ServiceRequest,
    ) -> Result<T, TransportError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| TransportError::Unavailable)?;
        response.await.map_err(|_| TransportError::Unavailable)
    }
}

#[derive(Debug, Deserialize)]
struct ReadQuery {
    #[serde(default)]
    attribute: AttributeId,
    index_range: Option<String>,
    #[serde(default)]
    timestamps: TimestampsToReturn,
}

#[derive(Debug, Deserialize)]
struct WriteBody {
    value: f64,
}

fn session_of(peer: Option<ConnectInfo<SocketAddr>>) -> SessionId {
    peer.map(|ConnectInfo(addr)| SessionId::from_peer(addr))
        .unwrap_or_else(SessionId::anonymous)
}

fn parse_node_id(raw: &str) -> Result<NodeId, TransportError> {
    raw.parse::<NodeId>()
        .map_err(|e| TransportError::InvalidNodeId(e.to_string()))
}

/// Build the router. `requests` feeds the run-loop.
pub(crate) fn router(requests: mpsc::Sender<ServiceRequest>) -> Router {
    Router::new()
        .route("/", get(server_info))
        .route("/nodes", get(browse_objects))
        .route("/nodes/:node_id", get(read_node).put(write_node))
        .route("/nodes/:node_id/children", get(browse_node))
        .with_state(TransportState { requests })
}

async fn server_info(State(state): State<TransportState>) -> Result<Json<ServerInfo>, TransportError> {
    let info = state.call(|reply| ServiceRequest::Info { reply }).await?;
    Ok(Json(info))
}

async fn browse_objects(
    State(state): State<TransportState>,
) -> Result<Json<BrowseResponse>, TransportError> {
    let node_id = NodeId::objects_folder();
    let response = state
        .call(|reply| ServiceRequest::Browse { node_id, reply })
        .await?;
    Ok(Json(response))
}

async fn browse_node(
    State(state): State<TransportState>,
    Path(node_id): Path<String>,
) -> Result<Json<BrowseResponse>, TransportError> {
    let node_id = parse_node_id(&node_id)?;
    let response = state
        .call(|reply| ServiceRequest::Browse { node_id, reply })
        .await?;
    Ok(Json(response))
}

async fn read_node(
    State(state): State<TransportState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Path(node_id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<ReadResponse>, TransportError> {
    let request = ReadRequest {
        node_id: parse_node_id(&node_id)?,
        attribute: query.attribute,
        index_range: query.index_range,
        timestamps: query.timestamps,
    };
    let session = session_of(peer);
    let response = state
        .call(|reply| ServiceRequest::Read {
            session,
            request,
            reply,
        })
        .await?;
    Ok(Json(response))
}

async fn write_node(
    State(state): State<TransportState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Path(node_id): Path<String>,
    Json(body): Json<WriteBody>,
) -> Result<Json<WriteResponse>, TransportError> {
    let request = WriteRequest {
        node_id: parse_node_id(&node_id)?,
        value: Variant::Double(body.value),
    };
    let session = session_of(peer);
    let response = state
        .call(|reply| ServiceRequest::Write {
            session,
            request,
            reply,
        })
        .await?;
    Ok(Json(response))
}

/// Serve plain HTTP until `running` is cleared.
pub(crate) async fn serve_plain(
    listener: TcpListener,
    app: Router,
    running: RunningFlag,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { running.stopped().await })
    .await
}

/// Serve HTTPS until `running` is cleared.
#[cfg(feature = "encryption")]
pub(crate) async fn serve_tls(
    listener: TcpListener,
    acceptor: tokio_rustls::TlsAcceptor,
    app: Router,
    running: RunningFlag,
) -> std::io::Result<()> {
    use axum::extract::Request;
    use axum::Extension;
    use hyper::body::Incoming;
    use hyper_util::rt::{TokioExecutor, TokioIo};
    use tower::Service;

    loop {
        let (stream, peer) = tokio::select! {
            _ = running.stopped() => return Ok(()),
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
        };

        let acceptor = acceptor.clone();
        let tower_service = app.clone().layer(Extension(ConnectInfo(peer)));
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::debug!("TLS handshake with {} failed: {}", peer, e);
                    return;
                }
            };

            let hyper_service = hyper::service::service_fn(move |request: Request<Incoming>| {
                tower_service.clone().call(request)
            });

            if let Err(e) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), hyper_service)
                .await
            {
                tracing::debug!("Connection with {} closed: {}", peer, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn test_invalid_node_id_is_not_found() {
        let (tx, _rx) = mpsc::channel(1);
        let app = router(tx);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/nodes/not-a-node-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), HttpStatus::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stopped_run_loop_is_unavailable() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let app = router(tx);

        let response = app
            .oneshot(Request::builder().uri("/nodes").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), HttpStatus::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_read_query_is_forwarded() {
        let (tx, mut rx) = mpsc::channel(1);
        let app = router(tx);

        let responder = tokio::spawn(async move {
            match rx.recv().await {
                Some(ServiceRequest::Read {
                    session,
                    request,
                    reply,
                }) => {
                    assert_eq!(session, SessionId::anonymous());
                    assert_eq!(request.node_id, NodeId::string(1, "chip_temp1_input"));
                    assert_eq!(request.attribute, AttributeId::Value);
                    assert_eq!(request.index_range.as_deref(), Some("1"));
                    assert_eq!(request.timestamps, TimestampsToReturn::Source);
                    let _ = reply.send(ReadResponse {
                        node_id: request.node_id,
                        attribute: request.attribute,
                        status: crate::types::StatusCode::GOOD,
                        data_value: None,
                    });
                }
                other => panic!("unexpected request: {:?}", other),
            }
        });

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/nodes/ns=1;s=chip_temp1_input?index_range=1&timestamps=source")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), HttpStatus::OK);
        responder.await.unwrap();
    }
}
