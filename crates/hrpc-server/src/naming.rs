//! The naming/directory server: one route per (method, op), adapted onto
//! the host's [`NamingDispatcher`].

use std::sync::Arc;

use axum::Router;
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::{Bytes, BytesMut};
use hrpc_codec::{ClassFilter, TypedValue, WireValue, decode_typed_value, encode_typed_value};
use hrpc_core::url::NamingOp;
use hrpc_core::{Name, content_type};
use serde::Deserialize;
use tracing::instrument;

use crate::dispatch::{NamingDispatcher, NamingLookupOutcome};
use crate::error::ServerError;
use crate::{apply_stickiness, default_node_name, parse_version};

#[derive(Clone)]
pub struct NamingState {
    dispatcher: Arc<dyn NamingDispatcher>,
    class_filter: ClassFilter,
    node_name: Arc<str>,
}

impl NamingState {
    pub fn new(dispatcher: Arc<dyn NamingDispatcher>, class_filter: ClassFilter) -> Self {
        Self {
            dispatcher,
            class_filter,
            node_name: default_node_name().into(),
        }
    }

    /// Overrides the node name answered to strict-stickiness checks.
    pub fn with_node_name(mut self, node_name: impl Into<Arc<str>>) -> Self {
        self.node_name = node_name.into();
        self
    }
}

pub fn make_router<S>(state: NamingState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/v{version}/{op}/{name}",
            get(handle_get).post(handle_post).put(handle_put).delete(handle_delete).patch(handle_patch),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct RenameQuery {
    new: Option<String>,
}

/// Affinity derived from the request's own URI: the first path component of
/// the full original path, used as the rewrite target for `Affinity.LOCAL`
/// sentinels in returned values.
fn request_affinity(original_uri: &OriginalUri) -> String {
    original_uri.path().trim_start_matches('/').split('/').next().unwrap_or("").to_owned()
}

/// Replaces every `Affinity.LOCAL` sentinel string anywhere in `value` with
/// `request_affinity`, recursing through lists and maps, so returned
/// handles point back at this server's own base path rather than at an
/// unresolvable local marker.
fn rewrite_affinity(value: WireValue, request_affinity: &str) -> WireValue {
    match value {
        WireValue::Str(s) if s == "Affinity.LOCAL" => WireValue::Str(request_affinity.to_owned()),
        WireValue::List(items) => WireValue::List(items.into_iter().map(|item| rewrite_affinity(item, request_affinity)).collect()),
        WireValue::Map(entries) => WireValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (rewrite_affinity(k, request_affinity), rewrite_affinity(v, request_affinity)))
                .collect(),
        ),
        other => other,
    }
}

fn rewrite_typed_value(mut value: TypedValue, request_affinity: &str) -> TypedValue {
    value.fields = value
        .fields
        .into_iter()
        .map(|(name, field)| (name, rewrite_affinity(field, request_affinity)))
        .collect();
    value
}

fn value_response(value: TypedValue) -> Response {
    let mut body = BytesMut::new();
    encode_typed_value(&mut body, &value);
    (StatusCode::OK, [(header::CONTENT_TYPE, content_type::NAMING_VALUE.to_string())], body.freeze()).into_response()
}

fn lookup_outcome_response(outcome: NamingLookupOutcome, request_affinity: &str) -> Response {
    match outcome {
        NamingLookupOutcome::SubContext => StatusCode::NO_CONTENT.into_response(),
        NamingLookupOutcome::Value(value) => value_response(rewrite_typed_value(value, request_affinity)),
    }
}

async fn handle_get(
    State(state): State<NamingState>,
    Path((version, op, name)): Path<(String, String, String)>,
    original_uri: OriginalUri,
    headers: HeaderMap,
) -> Response {
    let Some(op) = NamingOp::from_path_segment(&op) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let name = Name::parse(&name);
    let affinity = request_affinity(&original_uri);

    let result = match op {
        NamingOp::List => state.dispatcher.list(&name).await,
        NamingOp::ListBindings => state.dispatcher.list_bindings(&name).await,
        _ => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
    };

    let mut response = match result {
        Ok(value) => value_response(rewrite_typed_value(value, &affinity)),
        Err(err) => ServerError(err).into_response(),
    };
    apply_stickiness(&mut response, parse_version(&version), &state.node_name, &headers);
    response
}

#[instrument(skip(state, headers))]
async fn handle_post(
    State(state): State<NamingState>,
    Path((version, op, name)): Path<(String, String, String)>,
    original_uri: OriginalUri,
    headers: HeaderMap,
) -> Response {
    let Some(op) = NamingOp::from_path_segment(&op) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let name = Name::parse(&name);
    let affinity = request_affinity(&original_uri);

    let result = match op {
        NamingOp::Lookup => state.dispatcher.lookup(&name).await,
        NamingOp::LookupLink => state.dispatcher.lookup_link(&name).await,
        _ => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
    };

    let mut response = match result {
        Ok(outcome) => lookup_outcome_response(outcome, &affinity),
        Err(err) => ServerError(err).into_response(),
    };
    apply_stickiness(&mut response, parse_version(&version), &state.node_name, &headers);
    response
}

async fn read_typed_value(headers: &HeaderMap, body: Bytes, class_filter: &ClassFilter) -> Result<TypedValue, Response> {
    let content_type_header = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or_default();
    if !content_type::NAMING_VALUE.matches(content_type_header) {
        return Err(ServerError(hrpc_core::HrpcError::bad_content_type().msg("expected jndi-jbmar-value body")).into_response());
    }
    let mut cursor = body;
    decode_typed_value(&mut cursor, class_filter).map_err(|err| ServerError(err.into()).into_response())
}

async fn handle_put(
    State(state): State<NamingState>,
    Path((version, op, name)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(op) = NamingOp::from_path_segment(&op) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let name = Name::parse(&name);

    let mut response = match op {
        NamingOp::CreateSubcontext => match state.dispatcher.create_subcontext(&name).await {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(err) => ServerError(err).into_response(),
        },
        NamingOp::Bind => {
            let value = match read_typed_value(&headers, body, &state.class_filter).await {
                Ok(value) => value,
                Err(response) => return response,
            };
            match state.dispatcher.bind(&name, value).await {
                Ok(()) => StatusCode::OK.into_response(),
                Err(err) => ServerError(err).into_response(),
            }
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    };
    apply_stickiness(&mut response, parse_version(&version), &state.node_name, &headers);
    response
}

async fn handle_delete(
    State(state): State<NamingState>,
    Path((version, op, name)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    let Some(op) = NamingOp::from_path_segment(&op) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let name = Name::parse(&name);

    let result = match op {
        NamingOp::Unbind => state.dispatcher.unbind(&name).await,
        NamingOp::DestroySubcontext => state.dispatcher.destroy_subcontext(&name).await,
        _ => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
    };

    let mut response = match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => ServerError(err).into_response(),
    };
    apply_stickiness(&mut response, parse_version(&version), &state.node_name, &headers);
    response
}

async fn handle_patch(
    State(state): State<NamingState>,
    Path((version, op, name)): Path<(String, String, String)>,
    Query(query): Query<RenameQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(op) = NamingOp::from_path_segment(&op) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let name = Name::parse(&name);

    let mut response = match op {
        NamingOp::Rebind => {
            let value = match read_typed_value(&headers, body, &state.class_filter).await {
                Ok(value) => value,
                Err(response) => return response,
            };
            match state.dispatcher.rebind(&name, value).await {
                Ok(()) => StatusCode::OK.into_response(),
                Err(err) => ServerError(err).into_response(),
            }
        }
        NamingOp::Rename => {
            let Some(new_name) = query.new else {
                return StatusCode::BAD_REQUEST.into_response();
            };
            let new_name = Name::parse(&new_name);
            match state.dispatcher.rename(&name, &new_name).await {
                Ok(()) => StatusCode::OK.into_response(),
                Err(err) => ServerError(err).into_response(),
            }
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    };
    apply_stickiness(&mut response, parse_version(&version), &state.node_name, &headers);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_affinity_replaces_the_sentinel_at_any_depth() {
        let value = WireValue::List(vec![
            WireValue::Str("Affinity.LOCAL".to_owned()),
            WireValue::Map(vec![(WireValue::Str("k".to_owned()), WireValue::Str("Affinity.LOCAL".to_owned()))]),
            WireValue::Str("untouched".to_owned()),
        ]);

        let rewritten = rewrite_affinity(value, "app1");

        match rewritten {
            WireValue::List(items) => {
                assert_eq!(items[0], WireValue::Str("app1".to_owned()));
                assert_eq!(items[2], WireValue::Str("untouched".to_owned()));
                match &items[1] {
                    WireValue::Map(entries) => assert_eq!(entries[0].1, WireValue::Str("app1".to_owned())),
                    other => panic!("expected a map, got {other:?}"),
                }
            }
            other => panic!("expected a list, got {other:?}"),
        }
    }

    #[test]
    fn rewrite_typed_value_rewrites_every_field() {
        let value = TypedValue {
            class_name: "java.lang.String".to_owned(),
            fields: vec![
                ("a".to_owned(), WireValue::Str("Affinity.LOCAL".to_owned())),
                ("b".to_owned(), WireValue::I32(7)),
            ],
        };

        let rewritten = rewrite_typed_value(value, "app1");

        assert_eq!(rewritten.fields[0].1, WireValue::Str("app1".to_owned()));
        assert_eq!(rewritten.fields[1].1, WireValue::I32(7));
    }
}
