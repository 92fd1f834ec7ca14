//! Media-type vocabulary: `application/x-wf-{name};version={n}`.

use core::fmt;

/// One of the `application/x-wf-…` media types, paired with the protocol
/// version attribute that travels alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentType {
    pub media_type: &'static str,
    pub version: u32,
}

impl ContentType {
    pub const fn new(media_type: &'static str, version: u32) -> Self {
        Self { media_type, version }
    }

    /// Parses a `Content-Type` header value, tolerating a leading charset or
    /// other parameters before `;version=`.
    pub fn parse(header_value: &str) -> Option<(String, u32)> {
        let mut parts = header_value.split(';');
        let media_type = parts.next()?.trim().strip_prefix("application/x-wf-")?.to_owned();
        let version = parts
            .map(str::trim)
            .find_map(|param| param.strip_prefix("version="))
            .and_then(|v| v.parse().ok())?;
        Some((media_type, version))
    }

    /// Whether a received content-type header matches this expected type,
    /// exactly on media type and version. A mismatch fails the operation
    /// before the body is touched.
    pub fn matches(&self, header_value: &str) -> bool {
        match Self::parse(header_value) {
            Some((media_type, version)) => media_type == self.media_type && version == self.version,
            None => false,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "application/x-wf-{};version={}", self.media_type, self.version)
    }
}

/// Bean invoke request body.
pub const EJB_INVOCATION: ContentType = ContentType::new("ejb-jbmar-invocation", 1);
/// Bean invoke success body.
pub const EJB_INVOCATION_RESPONSE: ContentType = ContentType::new("ejb-jbmar-response", 1);
/// Bean open-session request body.
pub const EJB_SESSION_OPEN: ContentType = ContentType::new("jbmar-sess-open", 1);
/// Bean open-session success.
pub const EJB_NEW_SESSION: ContentType = ContentType::new("ejb-jbmar-new-session", 1);
/// Bean discover success.
pub const EJB_DISCOVERY_RESPONSE: ContentType = ContentType::new("ejb-jbmar-discovery-response", 1);
/// Generic bean response envelope carried on paths other than invoke/open/discover.
pub const EJB_RESPONSE: ContentType = ContentType::new("ejb-response", 1);
/// Naming value body, request or response.
pub const NAMING_VALUE: ContentType = ContentType::new("jndi-jbmar-value", 1);
/// Failure body, all services.
pub const EXCEPTION: ContentType = ContentType::new("jbmar-exception", 1);
