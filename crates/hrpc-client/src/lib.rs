//! Target context registry, component-invocation client, naming client,
//! discovery cache, and the security collaborators a host injects.

pub mod attachments;
pub mod discovery;
pub mod ejb;
pub mod naming;
pub mod registry;
pub mod security;

pub use attachments::ContextData;
pub use discovery::{DiscoveryCache, DiscoveryRefreshTask};
pub use ejb::{EjbClient, InvokeCall, InvokeOutcome};
pub use naming::{LookupOutcome, NamingClient, NamingProvider};
pub use registry::{TargetContext, TargetRegistry};
pub use security::{AnonymousAuth, AuthConfig, AuthProvider, SslContextProvider, SystemSslContext};
