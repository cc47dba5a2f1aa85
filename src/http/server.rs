//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the forwarding handler
//! - Wire up middleware (timeout, tracing)
//! - Fetch the response from the upstream with the hyper client
//! - Hand the upstream response to the forwarding engine
//! - Bind server to listener and shut down gracefully

use std::future::Future;
use std::io;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use axum::http::uri::{Authority, InvalidUri, PathAndQuery, Scheme};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{ForwardConfig, ForwardingConfig};
use crate::forward::ProxyResponse;
use crate::http::adapter::{abortable_upload, channel_sink, origin_from_hyper, ClientExchange};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub upstream: Authority,
    pub forwarding: ForwardingConfig,
}

/// HTTP server forwarding every request to one upstream.
pub struct ForwardServer {
    router: Router,
    config: ForwardConfig,
}

impl ForwardServer {
    /// Create a server. Fails when the upstream address is not an authority.
    pub fn new(config: ForwardConfig) -> Result<Self, InvalidUri> {
        let upstream: Authority = config.upstream.address.parse()?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(
            config.upstream.connect_timeout_secs,
        )));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let state = AppState {
            client,
            upstream,
            forwarding: config.forwarding.clone(),
        };

        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ForwardConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(forward_handler))
            .route("/", any(forward_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server on `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            "Forwarding server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Forwarding server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }
}

/// Fetch the upstream response and forward it through the engine.
///
/// The engine runs on its own task; the handler returns once the response
/// head has been committed. A transfer that fails before that point is
/// answered with 502.
async fn forward_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let version = request.version();
    let method = request.method().clone();
    let (parts, body) = request.into_parts();

    let mut uri_parts = parts.uri.into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(state.upstream.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    let uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(err) => {
            tracing::warn!(error = %err, "Cannot build upstream URI");
            return (StatusCode::BAD_REQUEST, "Invalid request target").into_response();
        }
    };

    tracing::debug!(method = %method, uri = %uri, ?version, "Forwarding request");

    let mut builder = Request::builder().method(method.clone()).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            if name != header::HOST {
                headers.append(name.clone(), value.clone());
            }
        }
    }
    let (upload, upload_abort) = abortable_upload(body);
    let upstream_request = match builder.body(upload) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(error = %err, "Cannot build upstream request");
            return (StatusCode::BAD_REQUEST, "Invalid request").into_response();
        }
    };

    let upstream_response = match state.client.request(upstream_request).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(upstream = %state.upstream, error = %err, "Upstream error");
            metrics::record_upstream_error();
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };
    let status = upstream_response.status();

    let (sink, head_rx, body) = channel_sink(state.forwarding.channel_capacity);
    let exchange = ClientExchange::new(version, state.upstream.to_string(), upload_abort);
    let mut response = ProxyResponse::from_origin(
        Box::new(exchange),
        Box::new(sink),
        origin_from_hyper(upstream_response),
    );
    response.set_buffer_limit(state.forwarding.http10_buffer_limit);
    if is_bodiless(&method, status) {
        response.suppress_entity();
    }

    tokio::spawn(async move {
        if let Err(err) = response.send().await {
            tracing::debug!(error = %err, "Forwarding ended early");
        }
    });

    match head_rx.await {
        Ok(head) => head.into_response(body),
        Err(_) => (
            StatusCode::BAD_GATEWAY,
            "Upstream response could not be forwarded",
        )
            .into_response(),
    }
}

/// Exchanges whose response never carries an entity.
fn is_bodiless(method: &Method, status: StatusCode) -> bool {
    method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}
