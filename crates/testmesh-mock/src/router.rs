//! The HTTP transport for the fabric: one axum router multiplexing every
//! registered mock server by id, plus a supplemental endpoint for
//! inspecting a server's request log. Grounded on the teacher's
//! `proxy_server::ProxyServer::router` — a catch-all `.fallback` handler
//! reading the raw request rather than per-route extractors, since the set
//! of paths is only known at request time.

use crate::registry::MockFabric;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::BTreeMap;
use std::sync::Arc;
use testmesh_domain::MockServerId;
use testmesh_foundation::Error;

pub fn router(fabric: Arc<MockFabric>) -> Router {
    Router::new()
        .route("/__testmesh/requests/{server_id}", get(list_requests))
        .fallback(dispatch)
        .with_state(fabric)
}

async fn dispatch(
    State(fabric): State<Arc<MockFabric>>,
    request: axum::http::Request<axum::body::Body>,
) -> Response {
    let uri_path = request.uri().path().to_string();
    let Some(rest) = uri_path.strip_prefix("/mocks/") else {
        return (StatusCode::NOT_FOUND, "unknown route").into_response();
    };
    let mut segments = rest.splitn(2, '/');
    let Some(server_id_str) = segments.next() else {
        return (StatusCode::NOT_FOUND, "missing server id").into_response();
    };
    let path = format!("/{}", segments.next().unwrap_or(""));

    let Ok(server_id) = server_id_str.parse::<MockServerId>() else {
        return (StatusCode::NOT_FOUND, "invalid server id").into_response();
    };

    let method = request.method().to_string();
    let headers = header_map(request.headers());
    let query = query_map(request.uri().query());

    let body_bytes = match axum::body::to_bytes(request.into_body(), 10 * 1024 * 1024).await {
        Ok(bytes) => bytes,
        Err(_) => return (StatusCode::BAD_REQUEST, "failed to read request body").into_response(),
    };
    let raw_body = (!body_bytes.is_empty())
        .then(|| String::from_utf8_lossy(&body_bytes).into_owned());

    match fabric
        .handle_request(server_id, &method, &path, headers, query, raw_body)
        .await
    {
        Ok(rendered) => {
            let status = StatusCode::from_u16(rendered.status).unwrap_or(StatusCode::OK);
            let body = rendered
                .body
                .map(|b| serde_json::to_vec(&b.to_json()).unwrap_or_default())
                .unwrap_or_default();
            let mut response = Response::builder().status(status);
            for (k, v) in rendered.headers {
                response = response.header(k, v);
            }
            response
                .body(axum::body::Body::from(body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(Error::MockNotFound) => (StatusCode::NOT_FOUND, "mock server not found or stopped").into_response(),
        Err(Error::MockNoMatch) => (StatusCode::NOT_FOUND, "No matching endpoint found").into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn list_requests(
    State(fabric): State<Arc<MockFabric>>,
    Path(server_id): Path<String>,
) -> Response {
    let Ok(server_id) = server_id.parse::<MockServerId>() else {
        return (StatusCode::NOT_FOUND, "invalid server id").into_response();
    };
    if fabric.get(server_id).await.is_none() {
        return (StatusCode::NOT_FOUND, "unknown mock server").into_response();
    }
    match fabric.list_requests(server_id).await {
        Ok(requests) => {
            let body: Vec<_> = requests
                .into_iter()
                .map(|r| {
                    serde_json::json!({
                        "id": r.id.to_string(),
                        "method": r.method,
                        "path": r.path,
                        "received_at": r.received_at.to_rfc3339(),
                        "matched_endpoint_id": r.matched_endpoint_id,
                    })
                })
                .collect();
            Json(body).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect()
}

fn query_map(query: Option<&str>) -> BTreeMap<String, String> {
    match query {
        Some(q) => url::form_urlencoded::parse(q.as_bytes())
            .into_owned()
            .collect(),
        None => BTreeMap::new(),
    }
}
