//! Component-invocation client: `invoke`, `create_session`, `cancel`,
//! `discover`, and session-affinity acquisition.

use std::io::Write as _;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use hrpc_codec::{decode_attachments_filtered, decode_exception, decode_value, decode_value_filtered, encode_attachments, encode_tx, encode_value, ClassFilter, WireValue};
use hrpc_core::headers::{AFFINITY_COOKIE_NAME, INTENDED_HOST_HEADER, INVOCATION_ID_HEADER, SESSION_ID_HEADER, STICKINESS_RESULT_HEADER};
use hrpc_core::{content_type, url as url_builder, BeanId, BeanLocator, ModuleId, TargetUri, TransactionInfo};
use tracing::{debug, instrument, warn};

use crate::attachments::{self, ContextData};
use crate::registry::{TargetContext, TargetRegistry};
use crate::security::apply_auth;

/// A single bean invocation, fully resolved: the caller has already decided
/// the target, the locator, and the arguments.
pub struct InvokeCall {
    pub target: TargetUri,
    pub locator: BeanLocator,
    pub view: String,
    pub method: String,
    pub param_types: Vec<String>,
    pub args: Vec<WireValue>,
    pub tx: TransactionInfo,
    /// Whether the declared return type is `Future`; together with an
    /// established session this makes the call cancellable.
    pub returns_future: bool,
    /// Whether the declared return type is `void`. Only void methods are
    /// eligible for asynchronous completion.
    pub returns_void: bool,
    /// Whether the method is declared asynchronous. A void method completes
    /// asynchronously when this is set, or when a previous call to it was
    /// answered `202 Accepted`.
    pub declared_async: bool,
    /// Gzip the request body and advertise gzip on the response.
    pub compress: bool,
}

/// The outcome of a successful `invoke`: `None` when the call completed
/// asynchronously (202 Accepted, no body to deserialize).
#[derive(Debug)]
pub struct InvokeOutcome {
    pub result: Option<WireValue>,
}

#[derive(Clone)]
pub struct EjbClient {
    registry: Arc<TargetRegistry>,
    prefix: String,
    class_filter: ClassFilter,
}

impl EjbClient {
    pub fn new(registry: Arc<TargetRegistry>, prefix: impl Into<String>, class_filter: ClassFilter) -> Self {
        Self {
            registry,
            prefix: prefix.into(),
            class_filter,
        }
    }

    fn method_signature(call: &InvokeCall) -> String {
        format!("{}#{}({})", call.view, call.method, call.param_types.join(","))
    }

    #[instrument(skip(self, call, context), fields(target = %call.target, view = %call.view, method = %call.method))]
    pub async fn invoke(&self, call: InvokeCall, context: &mut ContextData) -> Result<InvokeOutcome, hrpc_core::HrpcError> {
        let ctx = self.registry.get_or_create(&call.target)?;
        let signature = Self::method_signature(&call);

        let session_id = call.locator.session_id().map(<[u8]>::to_vec);
        let path = url_builder::ejb_invoke_path(
            &self.prefix,
            ctx.state.version(),
            &call.locator.id,
            session_id.as_deref(),
            &call.view,
            &call.method,
            &call.param_types,
        );

        let cancellable = ctx.state.session_id().is_some() && call.returns_future;
        let invocation_id = cancellable.then(|| ctx.state.next_invocation_id());

        let mut body = BytesMut::new();
        encode_tx(&mut body, &call.tx);
        for arg in &call.args {
            encode_value(&mut body, arg);
        }
        let outgoing_attachments: Vec<(String, WireValue)> = context.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        encode_attachments(&mut body, &outgoing_attachments);
        let body = body.freeze();

        let url = format!("{}{}", call.target.base_url(), path);
        let mut request = ctx
            .client
            .post(&url)
            .header(http::header::CONTENT_TYPE, content_type::EJB_INVOCATION.to_string())
            .header(http::header::ACCEPT, content_type::EJB_INVOCATION_RESPONSE.to_string());

        if call.compress {
            let mut encoder = flate2::write::GzEncoder::new(Vec::with_capacity(body.len()), flate2::Compression::default());
            let compressed = encoder
                .write_all(&body)
                .and_then(|()| encoder.finish())
                .map_err(|err| hrpc_core::HrpcError::communication_failure().err("failed to gzip request body")(err))?;
            request = request
                .header(http::header::CONTENT_ENCODING, "gzip")
                .header(http::header::ACCEPT_ENCODING, "gzip")
                .body(chunked_body(Bytes::from(compressed)));
        } else {
            request = request.body(chunked_body(body));
        }

        if let Some(id) = invocation_id {
            request = request.header(INVOCATION_ID_HEADER, id.to_string());
        }
        request = apply_auth(request, ctx.auth.as_ref());
        request = attach_stickiness(request, &ctx, &call.target);

        // Void methods known (or declared) to complete asynchronously
        // release the caller as soon as the request is on the wire; the
        // response is drained in the background only to record cookies and
        // fresh 202 observations.
        let async_expected = call.returns_void && (call.declared_async || ctx.state.async_observed(&signature));
        if async_expected {
            let pending = request.send();
            let ctx_for_ack = Arc::clone(&ctx);
            let signature_for_ack = signature.clone();
            drop(tokio::spawn(async move {
                match pending.await {
                    Ok(response) => {
                        if let Some(cookie) = extract_set_cookie(&response) {
                            ctx_for_ack.state.set_affinity_cookie(cookie);
                        }
                        if response.status() == http::StatusCode::ACCEPTED {
                            ctx_for_ack.state.observe_async(&signature_for_ack);
                        }
                    }
                    Err(error) => {
                        ctx_for_ack.state.record_failure();
                        debug!(%error, "async invocation dispatch failed after release");
                    }
                }
            }));
            return Ok(InvokeOutcome { result: None });
        }

        let response = request
            .send()
            .await
            .map_err(|err| {
                ctx.state.record_failure();
                hrpc_core::HrpcError::communication_failure().err("invoke request failed")(err)
            })?;

        if let Some(cookie) = extract_set_cookie(&response) {
            ctx.state.set_affinity_cookie(cookie);
        }
        check_stickiness(&response, &ctx, &call.target);

        let status = response.status();
        if status == http::StatusCode::ACCEPTED {
            if call.returns_void {
                ctx.state.observe_async(&signature);
            }
            return Ok(InvokeOutcome { result: None });
        }

        let content_type_header = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let body_bytes = response
            .bytes()
            .await
            .map_err(|err| hrpc_core::HrpcError::communication_failure().err("failed to read invoke response body")(err))?;

        if !status.is_success() {
            return Err(decode_response_error(status, &content_type_header, body_bytes));
        }

        if !content_type::EJB_INVOCATION_RESPONSE.matches(&content_type_header) {
            return Err(hrpc_core::HrpcError::bad_content_type().msg(format!("unexpected invoke response content-type `{content_type_header}`")));
        }

        let mut cursor = body_bytes;
        let result = decode_value_filtered(&mut cursor, &self.class_filter).map_err(hrpc_core::HrpcError::from)?;
        let returned = decode_attachments_filtered(&mut cursor, &self.class_filter).map_err(hrpc_core::HrpcError::from)?;
        if cursor.has_remaining() {
            return Err(hrpc_core::HrpcError::unexpected_data_in_response().msg("trailing bytes after invoke response body"));
        }
        attachments::merge(context, returned);

        Ok(InvokeOutcome { result: Some(result) })
    }

    #[instrument(skip(self, tx), fields(target = %target, bean = %bean_id.bean))]
    pub async fn create_session(&self, target: &TargetUri, bean_id: &BeanId, tx: &TransactionInfo) -> Result<Vec<u8>, hrpc_core::HrpcError> {
        let ctx = self.registry.get_or_create(target)?;
        let path = url_builder::ejb_open_path(&self.prefix, ctx.state.version(), bean_id);

        let mut body = BytesMut::new();
        encode_tx(&mut body, tx);

        let url = format!("{}{}", target.base_url(), path);
        let request = ctx
            .client
            .post(&url)
            .header(http::header::CONTENT_TYPE, content_type::EJB_SESSION_OPEN.to_string())
            .body(body.freeze());
        let response = attach_stickiness(apply_auth(request, ctx.auth.as_ref()), &ctx, target)
            .send()
            .await
            .map_err(|err| {
                ctx.state.record_failure();
                hrpc_core::HrpcError::communication_failure().err("open-session request failed")(err)
            })?;

        if let Some(cookie) = extract_set_cookie(&response) {
            ctx.state.set_affinity_cookie(cookie);
        }
        check_stickiness(&response, &ctx, target);

        if response.status() != http::StatusCode::NO_CONTENT {
            let status = response.status();
            let content_type_header = response
                .headers()
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_owned();
            let body_bytes = response.bytes().await.unwrap_or_default();
            return Err(decode_response_error(status, &content_type_header, body_bytes));
        }

        let session_header = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| hrpc_core::HrpcError::no_session_id().msg("open-session response had no session-id header"))?;
        let session_id = hrpc_core::session::decode_session_id(session_header)
            .map_err(|err| hrpc_core::HrpcError::no_session_id().err("session-id header was not valid base64")(err))?;
        ctx.state.set_session_id_if_absent(session_id.clone());
        Ok(session_id)
    }

    /// The target's session affinity, or `None` when nothing is cached and
    /// `eager` is unset. An eager call with nothing cached performs one
    /// exchange whose only purpose is getting the affinity cookie minted,
    /// so later calls can be routed (and cancelled) against a fixed backend.
    #[instrument(skip(self), fields(target = %target))]
    pub async fn await_session_id(&self, target: &TargetUri, eager: bool) -> Result<Option<String>, hrpc_core::HrpcError> {
        let ctx = self.registry.get_or_create(target)?;
        if let Some(cookie) = ctx.state.affinity_cookie() {
            return Ok(Some(cookie));
        }
        if !eager {
            return Ok(None);
        }

        let path = url_builder::ejb_discover_path(&self.prefix, ctx.state.version());
        let url = format!("{}{}", target.base_url(), path);
        let request = ctx
            .client
            .get(&url)
            .header(http::header::ACCEPT, content_type::EJB_DISCOVERY_RESPONSE.to_string());
        let response = apply_auth(request, ctx.auth.as_ref())
            .send()
            .await
            .map_err(|err| hrpc_core::HrpcError::communication_failure().err("session-establishment request failed")(err))?;

        if let Some(cookie) = extract_set_cookie(&response) {
            ctx.state.set_affinity_cookie(cookie);
        }
        Ok(ctx.state.affinity_cookie())
    }

    /// Never returns an error: any transport failure is reported as `false`.
    #[instrument(skip(self), fields(target = %target))]
    pub async fn cancel(&self, target: &TargetUri, bean_id: &BeanId, invocation_id: u64, cancel_running: bool) -> bool {
        let Ok(ctx) = self.registry.get_or_create(target) else {
            return false;
        };
        let path = url_builder::ejb_cancel_path(&self.prefix, ctx.state.version(), bean_id, invocation_id, cancel_running);
        let url = format!("{}{}", target.base_url(), path);
        let mut request = apply_auth(ctx.client.delete(&url), ctx.auth.as_ref());
        if let Some(cookie) = ctx.state.affinity_cookie() {
            request = request.header(http::header::COOKIE, format!("{AFFINITY_COOKIE_NAME}={cookie}"));
        }
        matches!(request.send().await, Ok(response) if response.status().is_success())
    }

    #[instrument(skip(self), fields(target = %target))]
    pub async fn discover(&self, target: &TargetUri) -> Result<std::collections::HashSet<ModuleId>, hrpc_core::HrpcError> {
        let ctx = self.registry.get_or_create(target)?;
        let path = url_builder::ejb_discover_path(&self.prefix, ctx.state.version());
        let url = format!("{}{}", target.base_url(), path);
        let request = ctx
            .client
            .get(&url)
            .header(http::header::ACCEPT, content_type::EJB_DISCOVERY_RESPONSE.to_string());
        let response = apply_auth(request, ctx.auth.as_ref())
            .send()
            .await
            .map_err(|err| {
                ctx.state.record_failure();
                hrpc_core::HrpcError::communication_failure().err("discover request failed")(err)
            })?;

        let status = response.status();
        let content_type_header = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let body_bytes = response
            .bytes()
            .await
            .map_err(|err| hrpc_core::HrpcError::communication_failure().err("failed to read discover response body")(err))?;

        if !status.is_success() {
            return Err(decode_response_error(status, &content_type_header, body_bytes));
        }
        if !content_type::EJB_DISCOVERY_RESPONSE.matches(&content_type_header) {
            return Err(hrpc_core::HrpcError::bad_content_type().msg("unexpected discover response content-type"));
        }

        let mut cursor = body_bytes;
        if cursor.remaining() < 4 {
            return Err(hrpc_core::HrpcError::unexpected_data_in_response().msg("truncated discover response"));
        }
        let count = cursor.get_i32();
        let count = u32::try_from(count).map_err(|_| hrpc_core::HrpcError::unexpected_data_in_response().msg("negative discover count"))?;
        let mut modules = std::collections::HashSet::with_capacity(count as usize);
        for _ in 0..count {
            let app_name = read_module_component(&mut cursor)?;
            let module_name = read_module_component(&mut cursor)?;
            let distinct_name = read_module_component(&mut cursor)?;
            modules.insert(ModuleId { app_name, module_name, distinct_name });
        }
        Ok(modules)
    }
}

/// Streams the already-buffered body so the exchange goes out chunked
/// instead of with a Content-Length.
fn chunked_body(bytes: Bytes) -> reqwest::Body {
    reqwest::Body::wrap_stream(futures::stream::once(async move { Ok::<_, std::convert::Infallible>(bytes) }))
}

/// Mirrors the affinity cookie and, from protocol version 2 on, names the
/// backend this sticky request is intended for.
fn attach_stickiness(mut request: reqwest::RequestBuilder, ctx: &TargetContext, target: &TargetUri) -> reqwest::RequestBuilder {
    if let Some(cookie) = ctx.state.affinity_cookie() {
        request = request.header(http::header::COOKIE, format!("{AFFINITY_COOKIE_NAME}={cookie}"));
        if ctx.state.version() >= 2 {
            request = request.header(INTENDED_HOST_HEADER, target.host.clone());
        }
    }
    request
}

/// A v2+ server that is not the intended backend answers with a non-match
/// marker so the caller can re-route. The request itself was still served;
/// surfacing the drift is a routing concern, so it is logged and recorded
/// rather than failing a completed call.
fn check_stickiness(response: &reqwest::Response, ctx: &TargetContext, target: &TargetUri) {
    if let Some(result) = response.headers().get(STICKINESS_RESULT_HEADER).and_then(|v| v.to_str().ok())
        && result != "match"
    {
        warn!(%target, result, "sticky request landed on an unintended backend");
        ctx.state.record_failure();
    }
}

fn read_module_component(cursor: &mut bytes::Bytes) -> Result<String, hrpc_core::HrpcError> {
    match decode_value(cursor).map_err(hrpc_core::HrpcError::from)? {
        WireValue::Str(s) => Ok(s),
        _ => Err(hrpc_core::HrpcError::unexpected_data_in_response().msg("expected a string module-id component")),
    }
}

fn extract_set_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all(http::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookie| cookie.strip_prefix(&format!("{AFFINITY_COOKIE_NAME}=")))
        .map(|rest| rest.split(';').next().unwrap_or(rest).to_owned())
}

fn decode_response_error(status: http::StatusCode, content_type_header: &str, body: bytes::Bytes) -> hrpc_core::HrpcError {
    if content_type::EXCEPTION.matches(content_type_header) {
        let mut cursor = body;
        if let Ok(err) = decode_exception(&mut cursor) {
            return err;
        }
    }
    let kind = match status {
        http::StatusCode::BAD_REQUEST => hrpc_core::ErrorKind::ProtocolViolation,
        http::StatusCode::NOT_FOUND => hrpc_core::ErrorKind::NoSuchEjb,
        _ => hrpc_core::ErrorKind::GenericApplicationException,
    };
    hrpc_core::HrpcError::new_from_kind(kind, format!("server responded {status} with no parseable exception body"))
}
