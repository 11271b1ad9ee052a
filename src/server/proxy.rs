//! Reverse proxy to an upstream site (a local WordPress install).

use super::ServerError;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use reqwest::Url;
use tracing::{debug, warn};

/// Headers that describe one connection and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// The proxied origin and the client used to reach it.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: reqwest::Client,
    base: Url,
    origin: String,
}

impl Upstream {
    /// Parse the upstream URL and build a client that leaves redirects to
    /// the browser.
    pub fn new(url: &str) -> Result<Self, ServerError> {
        let base = Url::parse(url).map_err(|e| ServerError::Upstream(url.to_string(), e.to_string()))?;
        if !base.has_host() {
            return Err(ServerError::Upstream(url.to_string(), "missing host".to_string()));
        }
        let origin = base.origin().ascii_serialization();
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(ServerError::Client)?;
        Ok(Self { client, base, origin })
    }

    /// Upstream URL for a request path and query.
    ///
    /// `/` maps to the configured base URL. Any other path is forwarded
    /// verbatim to the upstream origin, matching the links left in pages by
    /// [`Upstream::rewrite_origin`].
    pub fn target(&self, path_and_query: &str) -> Result<Url, ServerError> {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };
        if path.is_empty() || path == "/" {
            let mut url = self.base.clone();
            url.set_query(query);
            return Ok(url);
        }
        self.base
            .join(&format!("/{}", path_and_query.trim_start_matches('/')))
            .map_err(|e| ServerError::Upstream(path_and_query.to_string(), e.to_string()))
    }

    /// Turn absolute upstream URLs into server-relative ones.
    pub fn rewrite_origin(&self, text: &str) -> String {
        text.replace(&self.origin, "")
    }
}

/// Fallback handler: relay the request upstream and the answer back.
pub async fn forward(State(upstream): State<Upstream>, request: Request) -> Response {
    match relay(&upstream, request).await {
        Ok(response) => response,
        Err(e) => {
            warn!("proxy error: {}", e);
            (StatusCode::BAD_GATEWAY, format!("assetflow proxy error: {}", e)).into_response()
        }
    }
}

async fn relay(upstream: &Upstream, request: Request) -> Result<Response, ServerError> {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let url = upstream.target(path)?;
    debug!(method = %parts.method, %url, "proxying");

    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| ServerError::Body(e.to_string()))?;

    let mut headers = forwardable(&parts.headers);
    headers.remove(header::HOST);
    headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    let reply = upstream
        .client
        .request(parts.method, url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(ServerError::Client)?;

    let status = reply.status();
    let mut headers = forwardable(reply.headers());
    let location = headers.get(header::LOCATION).and_then(|v| v.to_str().ok()).map(str::to_string);
    if let Some(location) = location {
        let rewritten = upstream.rewrite_origin(&location);
        let rewritten = if rewritten.is_empty() { "/".to_string() } else { rewritten };
        if let Ok(value) = HeaderValue::from_str(&rewritten) {
            headers.insert(header::LOCATION, value);
        }
    }

    let rewrite_body = is_rewritable(&headers);
    let bytes = reply.bytes().await.map_err(ServerError::Client)?;
    let body = if rewrite_body {
        match std::str::from_utf8(&bytes) {
            Ok(text) => Body::from(upstream.rewrite_origin(text)),
            Err(_) => Body::from(bytes),
        }
    } else {
        Body::from(bytes)
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Copy headers minus hop-by-hop ones and the length, which may change.
fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let lower = name.as_str();
        if HOP_BY_HOP.contains(&lower) || name == header::CONTENT_LENGTH {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn is_rewritable(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("text/html") || ct.starts_with("text/css"))
        .unwrap_or(false)
}
