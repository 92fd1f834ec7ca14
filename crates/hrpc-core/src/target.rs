//! Target URI and the per-target state a client maintains against it.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;

/// A remote endpoint: scheme, host, port, and path prefix. Two `TargetUri`s
/// that normalize to the same `(scheme, host, port, prefix)` address the
/// same [`crate::TargetState`], so the affinity cookie, negotiated version,
/// and session id all key off this identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetUri {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Http => "http",
            Self::Https => "https",
        })
    }
}

impl TargetUri {
    pub fn parse(url: &url::Url, prefix: &str) -> Result<Self, crate::error::HrpcError> {
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(crate::error::HrpcError::protocol_violation()
                    .msg(format!("unsupported target scheme `{other}`, expected http or https")))
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| crate::error::HrpcError::protocol_violation().msg("target URI has no host"))?
            .to_owned();
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        Ok(Self {
            scheme,
            host,
            port,
            prefix: prefix.trim_end_matches('/').to_owned(),
        })
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl fmt::Display for TargetUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base_url(), self.prefix)
    }
}

/// Process-wide, per-target state: negotiated protocol version, cached
/// session id, and a small opaque attachment map. The connection pool
/// itself is owned by the caller (a cached `reqwest::Client`, kept outside
/// this crate so it stays free of an HTTP client dependency).
#[derive(Debug)]
pub struct TargetState {
    /// Starts at `LATEST` and never regresses.
    version: AtomicU32,
    session_id: RwLock<Option<Vec<u8>>>,
    attachments: DashMap<String, Vec<u8>>,
    last_failure: RwLock<Option<Instant>>,
    affinity_cookie: RwLock<Option<String>>,
    next_invocation_id: std::sync::atomic::AtomicU64,
    /// Per-method "observed a 202 Accepted" cache, keyed by a caller-chosen
    /// method signature string.
    async_observed: DashMap<String, bool>,
}

/// The version a client assumes before any exchange has negotiated one.
pub const LATEST_VERSION: u32 = 2;

impl Default for TargetState {
    fn default() -> Self {
        Self {
            version: AtomicU32::new(LATEST_VERSION),
            session_id: RwLock::new(None),
            attachments: DashMap::new(),
            last_failure: RwLock::new(None),
            affinity_cookie: RwLock::new(None),
            next_invocation_id: std::sync::atomic::AtomicU64::new(1),
            async_observed: DashMap::new(),
        }
    }
}

impl TargetState {
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    /// Record a server-advertised version. A version never regresses: a
    /// server that reports a lower version than already observed is ignored
    /// rather than trusted, since the higher version is itself evidence the
    /// server has already spoken it at least once.
    pub fn negotiate_version(&self, server_version: u32) {
        self.version.fetch_max(server_version, Ordering::AcqRel);
    }

    pub fn session_id(&self) -> Option<Vec<u8>> {
        self.session_id.read().clone()
    }

    /// Sets the session id exactly once; subsequent calls are no-ops so a
    /// session obtained from this target is never silently replaced. Callers
    /// own the complementary rule that an id minted by one target is never
    /// presented to another.
    pub fn set_session_id_if_absent(&self, session_id: Vec<u8>) {
        let mut guard = self.session_id.write();
        if guard.is_none() {
            *guard = Some(session_id);
        }
    }

    pub fn attachment(&self, key: &str) -> Option<Vec<u8>> {
        self.attachments.get(key).map(|v| v.clone())
    }

    pub fn set_attachment(&self, key: impl Into<String>, value: Vec<u8>) {
        self.attachments.insert(key.into(), value);
    }

    pub fn record_failure(&self) {
        *self.last_failure.write() = Some(Instant::now());
    }

    pub fn last_failure(&self) -> Option<Instant> {
        *self.last_failure.read()
    }

    pub fn affinity_cookie(&self) -> Option<String> {
        self.affinity_cookie.read().clone()
    }

    pub fn set_affinity_cookie(&self, value: String) {
        *self.affinity_cookie.write() = Some(value);
    }

    /// Allocates the next monotonically increasing invocation id for a
    /// cancellable call on this target.
    pub fn next_invocation_id(&self) -> u64 {
        self.next_invocation_id.fetch_add(1, Ordering::AcqRel)
    }

    pub fn async_observed(&self, method_signature: &str) -> bool {
        self.async_observed.get(method_signature).map(|v| *v).unwrap_or(false)
    }

    pub fn observe_async(&self, method_signature: &str) {
        self.async_observed.insert(method_signature.to_owned(), true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_set_at_most_once() {
        let state = TargetState::default();
        state.set_session_id_if_absent(vec![1, 2, 3]);
        state.set_session_id_if_absent(vec![9, 9, 9]);
        assert_eq!(state.session_id(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn version_never_regresses() {
        let state = TargetState::default();
        state.negotiate_version(1);
        assert_eq!(state.version(), LATEST_VERSION);
        state.negotiate_version(LATEST_VERSION + 1);
        assert_eq!(state.version(), LATEST_VERSION + 1);
    }

    #[test]
    fn attachments_cache_derived_state_per_target() {
        let state = TargetState::default();
        assert_eq!(state.attachment("token"), None);
        state.set_attachment("token", vec![0xAB]);
        assert_eq!(state.attachment("token"), Some(vec![0xAB]));
    }

    #[test]
    fn failures_are_timestamped() {
        let state = TargetState::default();
        assert!(state.last_failure().is_none());
        state.record_failure();
        assert!(state.last_failure().is_some());
    }
}
