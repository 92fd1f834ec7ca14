//! Header names and well-known attachment keys.

/// Affinity cookie name; path equals the service prefix, derived on creation
/// and mirrored by clients on every subsequent request to the same target.
pub const AFFINITY_COOKIE_NAME: &str = "JSESSIONID";

/// Bean session id, url-safe base64, set by the server on a successful open.
pub const SESSION_ID_HEADER: &str = "x-wf-ejb-jbmar-session-id";

/// ASCII decimal invocation counter, set by the client when cancellation is
/// wanted for this call.
pub const INVOCATION_ID_HEADER: &str = "X-wf-invocation-id";

/// Strict stickiness headers, present only on protocol version 2 and above.
pub const INTENDED_HOST_HEADER: &str = "x-wf-intended-host";
pub const STICKINESS_RESULT_HEADER: &str = "x-wf-result";

/// The attachment key whose value, when present on a bean invoke response,
/// names the subset of keys the caller's context data should retain.
pub const RETURNED_CONTEXT_DATA_KEY: &str = "org.wildfly.httpclient.returnedKeys";

/// The attachment key the server stamps with the peer's socket address
/// before dispatching an invocation.
pub const SOURCE_ADDRESS_KEY: &str = "jboss.source.address";

/// Keys that survive the attachment merge regardless of whether they appear
/// in `returnedKeys`. A plain slice, not a runtime-built set: there is
/// exactly one entry and it never grows at runtime.
pub const WELL_KNOWN_KEYS: &[&str] = &[SOURCE_ADDRESS_KEY];
