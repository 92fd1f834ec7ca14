//! Naming client and its retry/failover engine.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use hrpc_codec::{decode_exception, decode_typed_value, encode_typed_value, ClassFilter, ObjectResolver, TypedValue};
use hrpc_core::headers::{AFFINITY_COOKIE_NAME, INTENDED_HOST_HEADER};
use hrpc_core::url::NamingOp;
use hrpc_core::{content_type, ErrorKind, HrpcError, Name, TargetUri};
use tracing::instrument;

use crate::registry::TargetRegistry;
use crate::security::apply_auth;

/// The caller's provider environment: the set of target URIs a naming
/// operation may be attempted against, plus the transient block-list.
pub struct NamingProvider {
    targets: Vec<TargetUri>,
    block_list: DashMap<TargetUri, Instant>,
}

impl NamingProvider {
    pub fn new(targets: Vec<TargetUri>) -> Self {
        Self {
            targets,
            block_list: DashMap::new(),
        }
    }

    pub fn is_block_listed(&self, target: &TargetUri) -> bool {
        self.block_list.contains_key(target)
    }

    pub fn block(&self, target: &TargetUri) {
        self.block_list.insert(target.clone(), Instant::now());
    }

    pub fn unblock(&self, target: &TargetUri) {
        self.block_list.remove(target);
    }
}

/// Runs `op` against the provider's targets until one succeeds or the
/// failure budget runs out. Single-target providers bypass retry entirely.
/// A communication failure block-lists its target; a not-found response
/// burns one unit of `budget` and moves on; any other error is a legitimate
/// application answer, un-block-lists its target, and propagates.
pub async fn perform_with_retry<Op, Fut, T>(provider: &NamingProvider, budget: u32, mut op: Op) -> Result<T, HrpcError>
where
    Op: FnMut(TargetUri) -> Fut,
    Fut: Future<Output = Result<T, HrpcError>>,
{
    if provider.targets.len() <= 1 {
        let target = provider
            .targets
            .first()
            .cloned()
            .ok_or_else(|| HrpcError::communication_failure().msg("no naming targets configured"))?;
        return op(target).await;
    }

    let mut not_found_count = 0u32;
    loop {
        let candidates: Vec<TargetUri> = provider.targets.iter().filter(|t| !provider.is_block_listed(t)).cloned().collect();
        if candidates.is_empty() {
            return Err(HrpcError::communication_failure().msg("all naming targets are block-listed"));
        }

        let mut pending_retry = false;
        for target in candidates {
            match op(target.clone()).await {
                Ok(value) => {
                    provider.unblock(&target);
                    return Ok(value);
                }
                Err(err) if err.kind() == ErrorKind::NameNotFound => {
                    not_found_count += 1;
                    if not_found_count > budget {
                        return Err(err);
                    }
                    pending_retry = true;
                }
                Err(err) if err.kind().drives_block_list() => {
                    provider.block(&target);
                    pending_retry = true;
                }
                Err(err) => {
                    provider.unblock(&target);
                    return Err(err);
                }
            }
        }
        debug_assert!(pending_retry, "a full pass with no success and no terminal error must have retried something");
    }
}

/// The outcome of a single naming request.
#[derive(Debug)]
pub enum LookupOutcome {
    /// 204 No Content: the named entry is a sub-context; `name` is the full
    /// path a following call should be composed against.
    SubContext(Name),
    /// 200 OK with a value body.
    Value(TypedValue),
}

pub struct NamingClient {
    registry: Arc<TargetRegistry>,
    prefix: String,
    class_filter: ClassFilter,
    resolver: ObjectResolver,
    retry_budget: u32,
}

impl NamingClient {
    pub fn new(registry: Arc<TargetRegistry>, prefix: impl Into<String>, class_filter: ClassFilter) -> Self {
        Self {
            registry,
            prefix: prefix.into(),
            class_filter,
            resolver: ObjectResolver::new(),
            retry_budget: hrpc_core::naming_max_retries(),
        }
    }

    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Installs host-supplied rewrite hooks applied around every naming
    /// value this client marshals or unmarshals.
    pub fn with_resolver(mut self, resolver: ObjectResolver) -> Self {
        self.resolver = resolver;
        self
    }

    #[instrument(skip(self), fields(target = %target, op = op.path_segment()))]
    async fn single_attempt(
        &self,
        target: &TargetUri,
        op: NamingOp,
        name: &Name,
        rename_to: Option<&Name>,
        payload: Option<&TypedValue>,
    ) -> Result<Option<TypedValue>, HrpcError> {
        let ctx = self.registry.get_or_create(target)?;
        let path = hrpc_core::url::naming_path(&self.prefix, ctx.state.version(), op, name, rename_to);
        let url = format!("{}{}", target.base_url(), path);

        let mut request = ctx
            .client
            .request(op.http_method(), &url)
            .header(http::header::ACCEPT, format!("{},{}", content_type::NAMING_VALUE, content_type::EXCEPTION));
        request = apply_auth(request, ctx.auth.as_ref());

        if let Some(cookie) = ctx.state.affinity_cookie() {
            request = request.header(http::header::COOKIE, format!("{AFFINITY_COOKIE_NAME}={cookie}"));
            if ctx.state.version() >= 2 {
                request = request.header(INTENDED_HOST_HEADER, target.host.clone());
            }
        }

        if let Some(value) = payload {
            let mut body = bytes::BytesMut::new();
            encode_typed_value(&mut body, &self.resolver.write_replace(value.clone()));
            request = request
                .header(http::header::CONTENT_TYPE, content_type::NAMING_VALUE.to_string())
                .body(body.freeze());
        }

        let response = request.send().await.map_err(|err| {
            ctx.state.record_failure();
            HrpcError::communication_failure().err("naming request failed")(err)
        })?;

        if let Some(cookie) = response
            .headers()
            .get_all(http::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|raw| raw.strip_prefix(&format!("{AFFINITY_COOKIE_NAME}=")))
            .map(|rest| rest.split(';').next().unwrap_or(rest).to_owned())
        {
            ctx.state.set_affinity_cookie(cookie);
        }

        let status = response.status();
        let content_type_header = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let body = response
            .bytes()
            .await
            .map_err(|err| HrpcError::communication_failure().err("failed to read naming response body")(err))?;

        if status == http::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            if content_type::EXCEPTION.matches(&content_type_header) {
                let mut cursor = body;
                return Err(decode_exception(&mut cursor).unwrap_or_else(|_| {
                    HrpcError::new_from_kind(ErrorKind::GenericApplicationException, format!("naming request failed with status {status}"))
                }));
            }
            let kind = if status == http::StatusCode::NOT_FOUND {
                ErrorKind::NameNotFound
            } else {
                ErrorKind::GenericApplicationException
            };
            return Err(HrpcError::new_from_kind(kind, format!("naming request failed with status {status}")));
        }

        if body.is_empty() {
            return Ok(None);
        }
        if !content_type::NAMING_VALUE.matches(&content_type_header) {
            return Err(HrpcError::bad_content_type().msg("unexpected naming response content-type"));
        }
        let mut cursor = body;
        let value = decode_typed_value(&mut cursor, &self.class_filter).map_err(HrpcError::from)?;
        if bytes::Buf::has_remaining(&cursor) {
            return Err(HrpcError::unexpected_data_in_response().msg("trailing bytes after naming response body"));
        }
        Ok(Some(self.resolver.read_resolve(value)))
    }

    async fn perform(&self, provider: &NamingProvider, op: NamingOp, name: Name, rename_to: Option<Name>, payload: Option<TypedValue>) -> Result<LookupOutcome, HrpcError> {
        perform_with_retry(provider, self.retry_budget, move |target| {
            let name = name.clone();
            let rename_to = rename_to.clone();
            let payload = payload.clone();
            async move {
                match self.single_attempt(&target, op, &name, rename_to.as_ref(), payload.as_ref()).await? {
                    None => Ok(LookupOutcome::SubContext(name)),
                    Some(value) => Ok(LookupOutcome::Value(value)),
                }
            }
        })
        .await
    }

    pub async fn lookup(&self, provider: &NamingProvider, name: Name) -> Result<LookupOutcome, HrpcError> {
        self.perform(provider, NamingOp::Lookup, name, None, None).await
    }

    pub async fn lookup_link(&self, provider: &NamingProvider, name: Name) -> Result<LookupOutcome, HrpcError> {
        self.perform(provider, NamingOp::LookupLink, name, None, None).await
    }

    pub async fn list(&self, provider: &NamingProvider, name: Name) -> Result<TypedValue, HrpcError> {
        match self.perform(provider, NamingOp::List, name, None, None).await? {
            LookupOutcome::Value(value) => Ok(value),
            LookupOutcome::SubContext(_) => Err(HrpcError::unexpected_data_in_response().msg("list returned 204 instead of a sequence")),
        }
    }

    pub async fn list_bindings(&self, provider: &NamingProvider, name: Name) -> Result<TypedValue, HrpcError> {
        match self.perform(provider, NamingOp::ListBindings, name, None, None).await? {
            LookupOutcome::Value(value) => Ok(value),
            LookupOutcome::SubContext(_) => Err(HrpcError::unexpected_data_in_response().msg("listBindings returned 204 instead of a sequence")),
        }
    }

    pub async fn bind(&self, provider: &NamingProvider, name: Name, value: TypedValue) -> Result<(), HrpcError> {
        self.perform(provider, NamingOp::Bind, name, None, Some(value)).await.map(drop)
    }

    pub async fn rebind(&self, provider: &NamingProvider, name: Name, value: TypedValue) -> Result<(), HrpcError> {
        self.perform(provider, NamingOp::Rebind, name, None, Some(value)).await.map(drop)
    }

    pub async fn unbind(&self, provider: &NamingProvider, name: Name) -> Result<(), HrpcError> {
        self.perform(provider, NamingOp::Unbind, name, None, None).await.map(drop)
    }

    pub async fn create_subcontext(&self, provider: &NamingProvider, name: Name) -> Result<LookupOutcome, HrpcError> {
        self.perform(provider, NamingOp::CreateSubcontext, name, None, None).await
    }

    pub async fn destroy_subcontext(&self, provider: &NamingProvider, name: Name) -> Result<(), HrpcError> {
        self.perform(provider, NamingOp::DestroySubcontext, name, None, None).await.map(drop)
    }

    pub async fn rename(&self, provider: &NamingProvider, name: Name, new_name: Name) -> Result<(), HrpcError> {
        self.perform(provider, NamingOp::Rename, name, Some(new_name), None).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use hrpc_core::Scheme;

    use super::*;

    fn target(port: u16) -> TargetUri {
        TargetUri {
            scheme: Scheme::Http,
            host: "127.0.0.1".to_owned(),
            port,
            prefix: "/app".to_owned(),
        }
    }

    #[tokio::test]
    async fn single_target_bypasses_the_retry_loop() {
        let provider = NamingProvider::new(vec![target(1)]);
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = perform_with_retry(&provider, 8, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(HrpcError::name_not_found().msg("missing")) }
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NameNotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_found_on_one_target_falls_through_to_the_next() {
        let a = target(1);
        let b = target(2);
        let provider = NamingProvider::new(vec![a.clone(), b.clone()]);
        let result = perform_with_retry(&provider, 8, |t| {
            let found = t == b;
            async move {
                if found {
                    Ok("value")
                } else {
                    Err(HrpcError::name_not_found().msg("not here"))
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "value");
        assert!(!provider.is_block_listed(&a));
        assert!(!provider.is_block_listed(&b));
    }

    #[tokio::test]
    async fn exceeding_the_not_found_budget_propagates() {
        let provider = NamingProvider::new(vec![target(1), target(2)]);
        let calls = AtomicU32::new(0);
        let budget = 3;
        let result: Result<u32, _> = perform_with_retry(&provider, budget, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(HrpcError::name_not_found().msg("never bound")) }
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NameNotFound);
        assert_eq!(calls.load(Ordering::SeqCst), budget + 1);
    }

    #[tokio::test]
    async fn communication_failures_block_list_until_every_target_is_out() {
        let provider = NamingProvider::new(vec![target(1), target(2)]);
        let result: Result<u32, _> = perform_with_retry(&provider, 8, |_| async {
            Err(HrpcError::communication_failure().msg("connection refused"))
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::CommunicationFailure);
        assert!(provider.is_block_listed(&target(1)));
        assert!(provider.is_block_listed(&target(2)));
    }

    #[tokio::test]
    async fn application_errors_are_terminal_and_unblock_their_target() {
        let a = target(1);
        let provider = NamingProvider::new(vec![a.clone(), target(2)]);
        let result: Result<u32, _> = perform_with_retry(&provider, 8, |_| async {
            Err(HrpcError::generic_application().msg("directory rejected the value"))
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::GenericApplicationException);
        assert!(!provider.is_block_listed(&a));
    }
}
