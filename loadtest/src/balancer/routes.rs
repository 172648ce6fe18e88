//! HTTP handlers for the balancer
//!
//! `/register` and `/unregister` manage the pool; every other request is
//! forwarded to the next healthy backend.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::any,
};
use metrics::counter;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use super::pool::{Backend, BackendPool};
use crate::error::BalancerError;

/// Largest request body forwarded upstream
const MAX_FORWARD_BODY: usize = 16 * 1024 * 1024;

/// Shared state for balancer routes
#[derive(Clone)]
pub struct BalancerState {
    pub pool: Arc<BackendPool>,
    pub client: Client,
}

/// Body of `/register` and `/unregister`
#[derive(Debug, Deserialize)]
pub struct ServerRequest {
    pub url: String,
}

impl IntoResponse for BalancerError {
    fn into_response(self) -> Response {
        let status = match &self {
            BalancerError::NoHealthyBackend => StatusCode::SERVICE_UNAVAILABLE,
            BalancerError::InvalidBackend(_) => StatusCode::BAD_REQUEST,
            BalancerError::Upstream(_) | BalancerError::Body(_) => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}

/// Build the balancer router
pub fn balancer_routes(state: BalancerState) -> Router {
    Router::new()
        .route("/register", any(register))
        .route("/unregister", any(unregister))
        .fallback(forward)
        .with_state(state)
}

fn invalid_request() -> Response {
    (StatusCode::BAD_REQUEST, "Invalid Request").into_response()
}

/// /register - add a backend; any method, the JSON body decides
async fn register(State(state): State<BalancerState>, body: Bytes) -> Response {
    let Ok(req) = serde_json::from_slice::<ServerRequest>(&body) else {
        return invalid_request();
    };

    match state.pool.register(&req.url).await {
        Ok(_) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            warn!("Failed to register server: {}", e);
            invalid_request()
        }
    }
}

/// /unregister - remove a backend; unknown backends are not an error
async fn unregister(State(state): State<BalancerState>, body: Bytes) -> Response {
    let Ok(req) = serde_json::from_slice::<ServerRequest>(&body) else {
        return invalid_request();
    };

    state.pool.unregister(&req.url).await;
    (StatusCode::OK, "OK").into_response()
}

/// Fallback - proxy to the next healthy backend
async fn forward(State(state): State<BalancerState>, req: Request) -> Response {
    let Some(backend) = state.pool.next_healthy().await else {
        counter!("balancer_requests_rejected_total").increment(1);
        return BalancerError::NoHealthyBackend.into_response();
    };

    info!("Forwarding request to {}", backend.address());
    counter!("balancer_requests_forwarded_total", "backend" => backend.address().to_string())
        .increment(1);

    match proxy(&state.client, &backend, req).await {
        Ok(resp) => resp,
        Err(e) => {
            warn!("Forwarding to {} failed: {}", backend.address(), e);
            e.into_response()
        }
    }
}

/// Drop headers that describe a single connection
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in [
        header::CONNECTION,
        header::HOST,
        header::CONTENT_LENGTH,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ] {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

async fn proxy(client: &Client, backend: &Backend, req: Request) -> Result<Response, BalancerError> {
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = backend.target(path_and_query);

    let body = axum::body::to_bytes(body, MAX_FORWARD_BODY)
        .await
        .map_err(|e| BalancerError::Body(e.to_string()))?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);

    let upstream = client
        .request(parts.method, target)
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);
    let bytes = upstream.bytes().await?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
