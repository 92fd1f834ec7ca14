//! Wire-protocol constants, data model, URL builder, and error types shared
//! by the component-invocation and naming client/server crates.
//!
//! Nothing in this crate talks to a socket. It exists so the client and
//! server implement the same grammar from one source rather than by
//! convention: the only coupling between the two is the URL, header, and
//! body-stream vocabulary defined here.

pub mod content_type;
pub mod error;
pub mod headers;
pub mod ids;
pub mod session;
pub mod target;
pub mod url;

pub use error::{ErrorKind, HrpcError};
pub use ids::{BeanId, BeanKind, BeanLocator, InvocationIdentifier, ModuleId, Name, TransactionInfo, Xid};
pub use target::{LATEST_VERSION, Scheme, TargetState, TargetUri};
pub use url::{EjbOp, NamingOp};

/// Default discovery cache TTL in milliseconds.
pub const DEFAULT_DISCOVERY_TTL_MS: u64 = 300_000;

/// Default naming retry budget for not-found responses.
pub const DEFAULT_MAX_RETRIES: u32 = 8;

/// Environment variable overriding [`DEFAULT_DISCOVERY_TTL_MS`].
pub const DISCOVERY_TTL_ENV: &str = "org.wildfly.httpclient.ejb.discovery.cache-refresh-timeout";

/// Environment variable overriding [`DEFAULT_MAX_RETRIES`].
pub const MAX_RETRIES_ENV: &str = "org.wildfly.httpclient.naming.max-retries";

/// The discovery TTL in effect: the environment override when set and
/// parseable, the default otherwise.
pub fn discovery_ttl_ms() -> u64 {
    std::env::var(DISCOVERY_TTL_ENV)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_DISCOVERY_TTL_MS)
}

/// The naming retry budget in effect: the environment override when set and
/// parseable, the default otherwise.
pub fn naming_max_retries() -> u32 {
    std::env::var(MAX_RETRIES_ENV)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_MAX_RETRIES)
}
