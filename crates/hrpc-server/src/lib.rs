//! Component-invocation and naming HTTP servers: routing, the cancellation
//! table, and the dispatcher traits a host implements.
//!
//! A host mounts [`make_router`] under the target's own prefix (the same
//! prefix a client builds its URLs against), e.g.
//! `Router::new().nest("/app1", hrpc_server::make_router(ejb_state, naming_state))`,
//! and serves it with `into_make_service_with_connect_info::<SocketAddr>()`
//! so the invoke handler can stamp the peer address into attachments.

pub mod cancel;
pub mod dispatch;
pub mod error;
pub mod ejb;
pub mod naming;

pub use dispatch::{CancelHandle, EjbDispatcher, InvokeOutcome, NamingDispatcher, NamingLookupOutcome};
pub use ejb::EjbState;
pub use error::ServerError;
pub use naming::NamingState;

use axum::Router;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use hrpc_core::headers::{INTENDED_HOST_HEADER, STICKINESS_RESULT_HEADER};

/// Composes the bean-invocation and naming routers under their service
/// prefixes. Gzip'd request bodies are decompressed before any handler
/// parses them.
pub fn make_router<S>(ejb_state: EjbState, naming_state: NamingState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .nest("/ejb", ejb::make_router(ejb_state))
        .nest("/naming", naming::make_router(naming_state))
        .layer(tower_http::decompression::RequestDecompressionLayer::new())
}

/// The node name this process answers strict-stickiness checks with.
/// Overridable per state; defaults to the host's own name.
pub(crate) fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_owned())
}

/// From protocol version 2 on, a request naming its intended backend gets
/// told whether it landed there, so a load balancer drift is visible to the
/// caller instead of silently serving from the wrong node.
pub(crate) fn apply_stickiness(response: &mut Response, version: u32, node_name: &str, request_headers: &HeaderMap) {
    if version < 2 {
        return;
    }
    let Some(intended) = request_headers.get(INTENDED_HOST_HEADER).and_then(|v| v.to_str().ok()) else {
        return;
    };
    let result = if intended.eq_ignore_ascii_case(node_name) { "match" } else { "no-match" };
    response
        .headers_mut()
        .insert(HeaderName::from_static(STICKINESS_RESULT_HEADER), HeaderValue::from_static(result));
}

/// Parses the `v{N}` path parameter; an unparseable version is treated as 1
/// so version-gated behavior simply stays off.
pub(crate) fn parse_version(raw: &str) -> u32 {
    raw.parse().unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::*;

    fn headers_with_intended_host(host: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(INTENDED_HOST_HEADER, host.parse().unwrap());
        headers
    }

    #[test]
    fn stickiness_asserts_match_on_the_intended_node() {
        let mut response = StatusCode::OK.into_response();
        apply_stickiness(&mut response, 2, "node-a", &headers_with_intended_host("node-a"));
        assert_eq!(response.headers().get(STICKINESS_RESULT_HEADER).unwrap(), "match");
    }

    #[test]
    fn stickiness_reports_non_match_so_the_caller_can_reroute() {
        let mut response = StatusCode::OK.into_response();
        apply_stickiness(&mut response, 2, "node-a", &headers_with_intended_host("node-b"));
        assert_eq!(response.headers().get(STICKINESS_RESULT_HEADER).unwrap(), "no-match");
    }

    #[test]
    fn stickiness_is_silent_below_version_two_and_without_the_header() {
        let mut response = StatusCode::OK.into_response();
        apply_stickiness(&mut response, 1, "node-a", &headers_with_intended_host("node-a"));
        assert!(response.headers().get(STICKINESS_RESULT_HEADER).is_none());

        let mut response = StatusCode::OK.into_response();
        apply_stickiness(&mut response, 2, "node-a", &HeaderMap::new());
        assert!(response.headers().get(STICKINESS_RESULT_HEADER).is_none());
    }
}
