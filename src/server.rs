//! HTTP front end.
//!
//! Accepts connections, turns each request into a [`RequestFilter`], routes
//! `/gozzmock/*` to the admin endpoints and everything else to the
//! dispatcher, then writes the result back.

use crate::admin::{self, AdminRoute};
use crate::config::{Headers, RequestFilter};
use crate::dispatcher::{DispatchResult, Dispatcher};
use crate::transport::join_header_values;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Response headers that are owned by the connection, not the mock.
const SKIPPED_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
];

/// The mock HTTP server.
pub struct MockServer {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
}

impl MockServer {
    /// Bind to `addr`. Port 0 picks a free port; see [`MockServer::local_addr`].
    pub async fn bind(addr: SocketAddr, dispatcher: Arc<Dispatcher>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, dispatcher))
    }

    /// Serve on an already bound listener.
    pub fn from_listener(listener: TcpListener, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            listener,
            dispatcher,
        }
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Connections already being served are left to finish on their own.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        info!("gozzmock listening on http://{}", self.listener.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => accepted?,
                _ = &mut shutdown => {
                    info!("Shutting down");
                    return Ok(());
                }
            };

            let io = TokioIo::new(stream);
            let dispatcher = Arc::clone(&self.dispatcher);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let dispatcher = Arc::clone(&dispatcher);
                    async move { handle_request(req, dispatcher).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(%peer, "Connection error: {}", e);
                }
            });
        }
    }
}

/// Serve one request.
pub async fn handle_request(
    req: Request<Incoming>,
    dispatcher: Arc<Dispatcher>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            return Ok(build_response(DispatchResult::internal_error()));
        }
    };

    if let Some(route) = AdminRoute::parse(parts.uri.path()) {
        let result = admin::handle(route, parts.method.as_str(), &body, dispatcher.store()).await;
        return Ok(build_response(result));
    }

    let incoming = request_filter(&parts.method, &parts.uri, &parts.headers, body);
    debug!(
        method = %incoming.method,
        path = %incoming.path,
        headers = ?incoming.headers,
        body = %incoming.body,
        "Incoming request"
    );

    let outcome = dispatcher.apply(&incoming).await;
    Ok(build_response(outcome.into_result()))
}

/// Normalize a live request into the shape filters are written against.
///
/// Header values sharing a name are joined with `,`; a request without
/// headers gets `None`. The body is decoded lossily as UTF-8 for matching,
/// and the received bytes are kept for forwarding.
pub fn request_filter(method: &Method, uri: &Uri, headers: &HeaderMap, body: Bytes) -> RequestFilter {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.to_string());

    let headers: Option<Headers> = if headers.is_empty() {
        None
    } else {
        Some(join_header_values(headers))
    };

    RequestFilter {
        method: method.as_str().to_string(),
        path,
        body: String::from_utf8_lossy(&body).into_owned(),
        headers,
        raw_body: Some(body),
    }
}

/// Wait for a shutdown signal.
///
/// If the signal cannot be watched the error is logged and this never
/// resolves, so the server keeps running.
pub async fn wait_for_signal<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Turn a dispatch result into an HTTP response.
pub fn build_response(result: DispatchResult) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(result.status).unwrap_or_else(|_| {
        error!(status = result.status, "Invalid status code");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut response = Response::new(Full::new(result.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in &result.headers {
        if SKIPPED_RESPONSE_HEADERS
            .iter()
            .any(|skipped| name.eq_ignore_ascii_case(skipped))
        {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid response header"),
        }
    }

    response
}
