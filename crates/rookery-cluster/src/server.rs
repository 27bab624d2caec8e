//! Inter-node transport server: the `/route` endpoint.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use futures::future::BoxFuture;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rookery_core::Stanza;

use crate::error::ClusterError;

/// Path peers POST serialized stanzas to.
pub const ROUTE_PATH: &str = "/route";

const XML_APP_MIME_TYPE: &str = "application/xml";
const XML_TEXT_MIME_TYPE: &str = "text/xml";

/// Error type returned by stanza handlers. Handler failures are logged by the
/// server and never propagated on the wire.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Callback invoked with every stanza received from a peer node.
pub type StanzaHandler =
    Arc<dyn Fn(Stanza) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

#[derive(Clone)]
struct ServerState {
    handler: Arc<RwLock<Option<StanzaHandler>>>,
}

/// HTTP/2 cleartext server accepting stanzas from peer nodes.
///
/// Exposes exactly one route, `POST /route`. Serving over h2c lets a single
/// TCP connection from each peer multiplex concurrent deliveries.
pub struct ClusterServer {
    port: u16,
    state: ServerState,
    started: AtomicBool,
    bound_addr: Mutex<Option<SocketAddr>>,
    serve_task: Mutex<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
}

impl ClusterServer {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            state: ServerState {
                handler: Arc::new(RwLock::new(None)),
            },
            started: AtomicBool::new(false),
            bound_addr: Mutex::new(None),
            serve_task: Mutex::new(None),
        }
    }

    /// Install the callback that receives inbound stanzas. Replaces any
    /// previous handler.
    pub fn register_stanza_handler(&self, handler: StanzaHandler) {
        *self.state.handler.write().unwrap() = Some(handler);
    }

    /// The axum application serving the transport routes.
    pub fn app(&self) -> Router {
        Router::new()
            .route(ROUTE_PATH, post(route_stanza))
            .with_state(self.state.clone())
    }

    /// Bind the listener and serve in a background task. Idempotent; returns
    /// the bound address, which is authoritative when the configured port is
    /// `0`.
    pub async fn start(&self) -> Result<SocketAddr, ClusterError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let bound = *self.bound_addr.lock().unwrap();
            return bound.ok_or_else(|| {
                ClusterError::Io(std::io::Error::other("cluster server is starting"))
            });
        }

        let listener = TcpListener::bind(addr).await?;
        let bound = listener.local_addr()?;
        *self.bound_addr.lock().unwrap() = Some(bound);
        info!(addr = %bound, "cluster transport listening");

        let app = self.app();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                warn!(error = %e, "cluster transport server terminated");
            }
        });
        *self.serve_task.lock().unwrap() = Some((shutdown_tx, handle));
        Ok(bound)
    }

    /// Stop accepting peer deliveries. Idempotent.
    pub async fn shutdown(&self) {
        let task = self.serve_task.lock().unwrap().take();
        if let Some((shutdown_tx, handle)) = task {
            let _ = shutdown_tx.send(());
            let _ = handle.await;
        }
        self.started.store(false, Ordering::SeqCst);
    }
}

async fn route_stanza(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    if mime != XML_APP_MIME_TYPE && mime != XML_TEXT_MIME_TYPE {
        return StatusCode::BAD_REQUEST;
    }

    let xml = match std::str::from_utf8(&body) {
        Ok(xml) => xml,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    let stanza = match Stanza::from_xml(xml) {
        Ok(stanza) => stanza,
        Err(e) => {
            warn!(error = %e, "dropping malformed peer stanza");
            return StatusCode::BAD_REQUEST;
        }
    };

    let handler = state.handler.read().unwrap().clone();
    match handler {
        Some(handler) => {
            if let Err(e) = handler(stanza).await {
                warn!(error = %e, "peer stanza handler failed");
            }
        }
        None => debug!("no stanza handler registered, dropping peer stanza"),
    }
    StatusCode::OK
}
