//! The component-invocation server: routing, path and content-type
//! validation, and the four handlers (invoke/open/discover/cancel).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{ConnectInfo, OriginalUri, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use bytes::{Bytes, BytesMut};
use hrpc_codec::{ClassFilter, WireValue, decode_attachments_filtered, decode_tx, decode_value_filtered, encode_attachments, encode_value};
use hrpc_core::headers::{AFFINITY_COOKIE_NAME, INVOCATION_ID_HEADER, SESSION_ID_HEADER, SOURCE_ADDRESS_KEY};
use hrpc_core::{BeanId, BeanKind, BeanLocator, content_type, url as url_builder};
use rand::RngCore as _;
use tracing::instrument;

use crate::cancel::CancelTable;
use crate::dispatch::{EjbDispatcher, InvokeOutcome};
use crate::error::ServerError;
use crate::{apply_stickiness, default_node_name, parse_version};

/// Shared state for the bean-invocation router: the host's dispatcher,
/// the class filter applied to request bodies, and this server's
/// cancellation table.
#[derive(Clone)]
pub struct EjbState {
    dispatcher: Arc<dyn EjbDispatcher>,
    class_filter: ClassFilter,
    cancellations: CancelTable,
    node_name: Arc<str>,
}

impl EjbState {
    pub fn new(dispatcher: Arc<dyn EjbDispatcher>, class_filter: ClassFilter) -> Self {
        Self {
            dispatcher,
            class_filter,
            cancellations: CancelTable::new(),
            node_name: default_node_name().into(),
        }
    }

    /// Overrides the node name answered to strict-stickiness checks.
    pub fn with_node_name(mut self, node_name: impl Into<Arc<str>>) -> Self {
        self.node_name = node_name.into();
        self
    }

    /// Removes `(invocation_id, session_affinity)` from the cancellation
    /// table. A host dispatcher that accepted a call asynchronously calls
    /// this once the deferred work actually finishes, so the table never
    /// retains a handle for a call that is no longer cancellable.
    pub fn complete_invocation(&self, invocation_id: u64, session_affinity: &str) {
        self.cancellations.remove(invocation_id, session_affinity);
    }
}

pub fn make_router<S>(state: EjbState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/v{version}/invoke/{*rest}", post(invoke))
        .route("/v{version}/open/{app}/{module}/{distinct}/{bean}", post(open))
        .route("/v{version}/discover", get(discover))
        .route("/v{version}/cancel/{app}/{module}/{distinct}/{bean}/{invocation_id}/{cancel_running}", delete(cancel))
        .with_state(state)
}

fn affinity_cookie(jar: &CookieJar) -> Option<String> {
    jar.get(AFFINITY_COOKIE_NAME).map(|cookie| cookie.value().to_owned())
}

#[instrument(skip(state, headers, jar, body))]
async fn invoke(
    State(state): State<EjbState>,
    Path((version, rest)): Path<(String, String)>,
    headers: HeaderMap,
    jar: CookieJar,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Response {
    let version = parse_version(&version);
    let content_type_header = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or_default();
    if !content_type::EJB_INVOCATION.matches(content_type_header) {
        return ServerError(hrpc_core::HrpcError::bad_content_type().msg("expected ejb-jbmar-invocation body")).into_response();
    }

    let components: Vec<&str> = rest.split('/').collect();
    if components.len() < 7 {
        return StatusCode::NOT_FOUND.into_response();
    }

    let bean_id = BeanId::new(
        url_builder::decode_segment(components[0]),
        url_builder::decode_segment(components[1]),
        url_builder::decode_segment(components[2]),
        url_builder::decode_segment(components[3]),
    );
    let session_bytes = match components[4] {
        "-" => None,
        encoded => match hrpc_core::session::decode_session_id(&url_builder::decode_segment(encoded)) {
            Ok(bytes) => Some(bytes),
            Err(_) => return StatusCode::NOT_FOUND.into_response(),
        },
    };
    let view = url_builder::decode_segment(components[5]);
    let method = url_builder::decode_segment(components[6]);
    let param_types: Vec<String> = components[7..].iter().map(|seg| url_builder::decode_segment(seg)).collect();

    let locator = BeanLocator {
        id: bean_id,
        kind: session_bytes.map_or(BeanKind::Stateless, BeanKind::Stateful),
    };

    let cookie = affinity_cookie(&jar);
    let invocation_id: Option<u64> = headers
        .get(INVOCATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    let cancellation_key = match (invocation_id, &cookie) {
        (Some(id), Some(affinity)) => Some((id, affinity.clone())),
        _ => None,
    };

    let mut cursor = body;
    let tx = match decode_tx(&mut cursor) {
        Ok(tx) => tx,
        Err(err) => return ServerError(err.into()).into_response(),
    };
    let mut args = Vec::with_capacity(param_types.len());
    for _ in 0..param_types.len() {
        match decode_value_filtered(&mut cursor, &state.class_filter) {
            Ok(value) => args.push(value),
            Err(err) => return ServerError(err.into()).into_response(),
        }
    }
    let mut attachments = match decode_attachments_filtered(&mut cursor, &state.class_filter) {
        Ok(attachments) => attachments,
        Err(err) => return ServerError(err.into()).into_response(),
    };
    attachments.push((SOURCE_ADDRESS_KEY.to_owned(), WireValue::Str(peer_addr.to_string())));

    let outcome = state.dispatcher.invoke(&locator, &view, &method, &param_types, tx, args, attachments).await;

    let mut response = match outcome {
        Ok(InvokeOutcome::Accepted { cancel_handle }) => {
            if let (Some((id, affinity)), Some(handle)) = (&cancellation_key, cancel_handle) {
                state.cancellations.insert(*id, affinity.clone(), handle);
            }
            StatusCode::ACCEPTED.into_response()
        }
        Ok(InvokeOutcome::Completed { result, attachments }) => {
            if let Some((id, affinity)) = &cancellation_key {
                state.cancellations.remove(*id, affinity);
            }
            let mut out = BytesMut::new();
            encode_value(&mut out, &result);
            encode_attachments(&mut out, &attachments);
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type::EJB_INVOCATION_RESPONSE.to_string())], out.freeze()).into_response()
        }
        Err(err) => {
            if let Some((id, affinity)) = &cancellation_key {
                state.cancellations.remove(*id, affinity);
            }
            ServerError(err).into_response()
        }
    };
    apply_stickiness(&mut response, version, &state.node_name, &headers);
    response
}

#[instrument(skip(state, headers, jar, body))]
async fn open(
    State(state): State<EjbState>,
    Path((version, app, module, distinct, bean)): Path<(String, String, String, String, String)>,
    original_uri: OriginalUri,
    headers: HeaderMap,
    jar: CookieJar,
    body: Bytes,
) -> Response {
    let version = parse_version(&version);
    let content_type_header = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or_default();
    if !content_type::EJB_SESSION_OPEN.matches(content_type_header) {
        return ServerError(hrpc_core::HrpcError::bad_content_type().msg("expected jbmar-sess-open body")).into_response();
    }

    let bean_id = BeanId::new(
        url_builder::decode_segment(&app),
        url_builder::decode_segment(&module),
        url_builder::decode_segment(&distinct),
        url_builder::decode_segment(&bean),
    );
    let locator = BeanLocator::stateless(bean_id);

    let mut cursor = body;
    let tx = match decode_tx(&mut cursor) {
        Ok(tx) => tx,
        Err(err) => return ServerError(err.into()).into_response(),
    };

    if let Err(err) = state.dispatcher.open_session(&locator, tx).await {
        return ServerError(err).into_response();
    }

    let mut session_id = vec![0u8; 16];
    rand::thread_rng().fill_bytes(&mut session_id);
    let session_id_b64 = hrpc_core::session::encode_session_id(&session_id);

    // A caller that arrived without an affinity cookie gets one minted
    // here, scoped to the deployment prefix so every later request to this
    // target carries it.
    let jar = if affinity_cookie(&jar).is_none() {
        let path = original_uri.path().split("/ejb").next().unwrap_or("").to_owned();
        jar.add(Cookie::build((AFFINITY_COOKIE_NAME, session_id_b64.clone())).path(path))
    } else {
        jar
    };

    let mut response = (
        StatusCode::NO_CONTENT,
        jar,
        [
            (header::CONTENT_TYPE, content_type::EJB_NEW_SESSION.to_string()),
            (SESSION_ID_HEADER.parse().expect("static header name"), session_id_b64),
        ],
    )
        .into_response();
    apply_stickiness(&mut response, version, &state.node_name, &headers);
    response
}

#[instrument(skip(state))]
async fn discover(State(state): State<EjbState>, Path(_version): Path<String>) -> Response {
    let modules = state.dispatcher.discover().await;
    let mut out = BytesMut::new();
    out.extend_from_slice(&i32::try_from(modules.len()).unwrap_or(i32::MAX).to_be_bytes());
    for module in &modules {
        encode_value(&mut out, &WireValue::Str(module.app_name.clone()));
        encode_value(&mut out, &WireValue::Str(module.module_name.clone()));
        encode_value(&mut out, &WireValue::Str(module.distinct_name.clone()));
    }
    (StatusCode::OK, [(header::CONTENT_TYPE, content_type::EJB_DISCOVERY_RESPONSE.to_string())], out.freeze()).into_response()
}

#[allow(clippy::too_many_arguments)]
#[instrument(skip(state, headers, jar))]
async fn cancel(
    State(state): State<EjbState>,
    Path((version, _app, _module, _distinct, _bean, invocation_id, cancel_running)): Path<(String, String, String, String, String, String, String)>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let version = parse_version(&version);
    if headers.get(header::CONTENT_TYPE).is_some() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let Some(cookie) = affinity_cookie(&jar) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Ok(invocation_id) = invocation_id.parse::<u64>() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let cancel_running = cancel_running == "true";

    if let Some(handle) = state.cancellations.take(invocation_id, &cookie) {
        handle.cancel(cancel_running).await;
    }

    let mut response = StatusCode::NO_CONTENT.into_response();
    apply_stickiness(&mut response, version, &state.node_name, &headers);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jar_with_cookie(raw: &str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, raw.parse().unwrap());
        CookieJar::from_headers(&headers)
    }

    #[test]
    fn affinity_cookie_extracts_the_session_cookie_among_several() {
        let jar = jar_with_cookie("foo=bar; JSESSIONID=abc123; other=1");
        assert_eq!(affinity_cookie(&jar), Some("abc123".to_owned()));
    }

    #[test]
    fn affinity_cookie_is_none_when_absent() {
        let jar = jar_with_cookie("foo=bar; other=1");
        assert_eq!(affinity_cookie(&jar), None);
    }

    #[test]
    fn affinity_cookie_is_none_without_a_cookie_header() {
        assert_eq!(affinity_cookie(&CookieJar::new()), None);
    }
}
