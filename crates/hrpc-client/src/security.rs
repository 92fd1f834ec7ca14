//! Caller-supplied security collaborators.
//!
//! Identity acquisition and TLS context construction happen outside this
//! workspace; these traits are the injection points the transport consults
//! per target. The defaults ([`AnonymousAuth`], [`SystemSslContext`]) are
//! what a bare deployment gets: no credentials, system trust store.

use hrpc_core::{HrpcError, TargetUri};
use hrpc_http_proxy::TlsMaterial;

/// Credentials to present to one target.
#[derive(Clone, Debug)]
pub enum AuthConfig {
    Basic { username: String, password: String },
    Bearer { token: String },
}

/// Resolves the credentials for a target, if any. Consulted once per
/// target context; the answer rides along on every request to it.
pub trait AuthProvider: Send + Sync {
    fn auth_config(&self, target: &TargetUri) -> Option<AuthConfig>;
}

/// No credentials for any target.
pub struct AnonymousAuth;

impl AuthProvider for AnonymousAuth {
    fn auth_config(&self, _target: &TargetUri) -> Option<AuthConfig> {
        None
    }
}

/// Resolves the TLS material used to dial a target. An error for an
/// `https` target is fatal to every connection attempt against it: the
/// context cannot fall back to an unverified connection.
pub trait SslContextProvider: Send + Sync {
    fn ssl_context(&self, target: &TargetUri) -> Result<TlsMaterial, HrpcError>;
}

/// System trust store only, for every target.
pub struct SystemSslContext;

impl SslContextProvider for SystemSslContext {
    fn ssl_context(&self, _target: &TargetUri) -> Result<TlsMaterial, HrpcError> {
        Ok(TlsMaterial::default())
    }
}

/// Applies a resolved [`AuthConfig`] to an outgoing request.
pub(crate) fn apply_auth(request: reqwest::RequestBuilder, auth: Option<&AuthConfig>) -> reqwest::RequestBuilder {
    match auth {
        Some(AuthConfig::Basic { username, password }) => request.basic_auth(username, Some(password)),
        Some(AuthConfig::Bearer { token }) => request.bearer_auth(token),
        None => request,
    }
}

#[cfg(test)]
mod tests {
    use hrpc_core::Scheme;

    use super::*;

    fn target() -> TargetUri {
        TargetUri {
            scheme: Scheme::Https,
            host: "node-a".to_owned(),
            port: 443,
            prefix: "/app".to_owned(),
        }
    }

    #[test]
    fn defaults_resolve_to_anonymous_system_trust() {
        assert!(AnonymousAuth.auth_config(&target()).is_none());
        let material = SystemSslContext.ssl_context(&target()).unwrap();
        assert!(material.extra_root_certificates.is_empty());
        assert!(!material.accept_invalid_certs);
    }
}
