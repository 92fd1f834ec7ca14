//! Target context registry: one entry per remote endpoint, initialized
//! lazily and retained for the registry's lifetime.
//!
//! The connection half of a target context comes from an
//! [`hrpc_http_proxy::ClientPool`] owned by the registry, built with the
//! TLS material the caller's [`SslContextProvider`] resolves for the
//! target. The negotiated-version / session-id / attachment half is
//! [`hrpc_core::TargetState`], double-checked on insert.

use std::sync::Arc;

use hrpc_core::{Scheme, TargetUri};
use hrpc_http_proxy::{ClientPool, ProxyConfig, TlsMaterial};
use parking_lot::RwLock;

use crate::security::{AnonymousAuth, AuthConfig, AuthProvider, SslContextProvider, SystemSslContext};

/// A target context: the pooled `reqwest::Client`, the credentials
/// resolved for this target, and the negotiated protocol state.
#[derive(Debug)]
pub struct TargetContext {
    pub uri: TargetUri,
    pub client: reqwest::Client,
    pub auth: Option<AuthConfig>,
    pub state: hrpc_core::TargetState,
}

/// Registry of [`TargetContext`]s, keyed by [`TargetUri`]. An injectable
/// value rather than a process-global, so tests can run several independent
/// registries in one process; a binary that wants process-wide sharing
/// holds one `Arc<TargetRegistry>` for its lifetime.
pub struct TargetRegistry {
    contexts: RwLock<std::collections::HashMap<TargetUri, Arc<TargetContext>>>,
    pool: ClientPool,
    proxy_config: ProxyConfig,
    ssl_provider: Arc<dyn SslContextProvider>,
    auth_provider: Arc<dyn AuthProvider>,
}

impl TargetRegistry {
    pub fn new(proxy_config: ProxyConfig) -> Self {
        Self {
            contexts: RwLock::new(std::collections::HashMap::new()),
            pool: ClientPool::new(),
            proxy_config,
            ssl_provider: Arc::new(SystemSslContext),
            auth_provider: Arc::new(AnonymousAuth),
        }
    }

    /// Installs the caller's TLS context provider, consulted for every
    /// `https` target before its first connection.
    pub fn with_ssl_provider(mut self, provider: Arc<dyn SslContextProvider>) -> Self {
        self.ssl_provider = provider;
        self
    }

    /// Installs the caller's credential provider, consulted once per
    /// target context.
    pub fn with_auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth_provider = provider;
        self
    }

    /// Returns the context for `uri`, creating it on first use (double-checked).
    pub fn get_or_create(&self, uri: &TargetUri) -> Result<Arc<TargetContext>, hrpc_core::HrpcError> {
        if let Some(ctx) = self.contexts.read().get(uri) {
            return Ok(Arc::clone(ctx));
        }

        let mut contexts = self.contexts.write();
        if let Some(ctx) = contexts.get(uri) {
            return Ok(Arc::clone(ctx));
        }

        let base_url: url::Url = uri
            .base_url()
            .parse()
            .map_err(|err| hrpc_core::HrpcError::protocol_violation().err(format!("invalid target URI `{uri}`"))(err))?;

        // An https target with no resolvable TLS context must not connect
        // at all, so the provider's error is the caller's error.
        let tls = match uri.scheme {
            Scheme::Https => self.ssl_provider.ssl_context(uri)?,
            Scheme::Http => TlsMaterial::default(),
        };

        let client = self
            .pool
            .client_for(&base_url, &self.proxy_config, &tls)
            .map_err(|err| hrpc_core::HrpcError::communication_failure().err("failed to build HTTP client for target")(err))?;

        let ctx = Arc::new(TargetContext {
            uri: uri.clone(),
            client,
            auth: self.auth_provider.auth_config(uri),
            state: hrpc_core::TargetState::default(),
        });
        contexts.insert(uri.clone(), Arc::clone(&ctx));
        Ok(ctx)
    }

    /// Drops all per-target state for `uri`, forcing the next `get_or_create`
    /// to start over. Used alongside discovery invalidation when a target
    /// goes missing: after a prolonged outage the cached session id and
    /// negotiated version are stale anyway.
    pub fn forget(&self, uri: &TargetUri) {
        self.contexts.write().remove(uri);
    }
}

#[cfg(test)]
mod tests {
    use hrpc_core::{ErrorKind, HrpcError};

    use super::*;

    struct RefusesTls;

    impl SslContextProvider for RefusesTls {
        fn ssl_context(&self, target: &TargetUri) -> Result<TlsMaterial, HrpcError> {
            Err(HrpcError::communication_failure().msg(format!("no TLS context available for `{target}`")))
        }
    }

    struct StaticToken;

    impl AuthProvider for StaticToken {
        fn auth_config(&self, _target: &TargetUri) -> Option<AuthConfig> {
            Some(AuthConfig::Bearer { token: "t0k3n".to_owned() })
        }
    }

    fn target(scheme: Scheme) -> TargetUri {
        TargetUri {
            scheme,
            host: "node-a".to_owned(),
            port: scheme.default_port(),
            prefix: "/app".to_owned(),
        }
    }

    #[test]
    fn missing_tls_context_is_fatal_for_https_targets() {
        let registry = TargetRegistry::new(ProxyConfig::Off).with_ssl_provider(Arc::new(RefusesTls));
        let err = registry.get_or_create(&target(Scheme::Https)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommunicationFailure);
    }

    #[test]
    fn http_targets_never_consult_the_tls_provider() {
        let registry = TargetRegistry::new(ProxyConfig::Off).with_ssl_provider(Arc::new(RefusesTls));
        assert!(registry.get_or_create(&target(Scheme::Http)).is_ok());
    }

    #[test]
    fn resolved_credentials_ride_on_the_context() {
        let registry = TargetRegistry::new(ProxyConfig::Off).with_auth_provider(Arc::new(StaticToken));
        let ctx = registry.get_or_create(&target(Scheme::Http)).unwrap();
        assert!(matches!(&ctx.auth, Some(AuthConfig::Bearer { token }) if token == "t0k3n"));
    }
}
