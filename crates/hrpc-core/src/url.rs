//! Canonical path construction for both services.
//!
//! Every path segment that carries a caller-supplied value is percent-encoded;
//! empty segments serialize as `-` per the grammar. `EjbOp`/`NamingOp` pin
//! down the operation vocabulary so a typo in an op name is a compile error
//! rather than a 404 discovered at runtime.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

/// Percent-encodes everything outside `[A-Za-z0-9]`: slashes, semicolons,
/// question marks and non-ASCII bytes all round-trip.
const SEGMENT_ENCODE_SET: &AsciiSet = NON_ALPHANUMERIC;

/// Percent-encodes `value`, or returns `-` for an empty token.
pub fn encode_segment(value: &str) -> String {
    if value.is_empty() {
        "-".to_owned()
    } else {
        percent_encoding::utf8_percent_encode(value, SEGMENT_ENCODE_SET).to_string()
    }
}

/// Decodes a single path segment, treating `-` as the empty string.
pub fn decode_segment(segment: &str) -> String {
    if segment == "-" {
        String::new()
    } else {
        percent_encoding::percent_decode_str(segment).decode_utf8_lossy().into_owned()
    }
}

/// The four bean-invocation operations, each bound to one HTTP method and
/// path shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EjbOp {
    Invoke,
    Open,
    Discover,
    Cancel,
}

impl EjbOp {
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Invoke => "invoke",
            Self::Open => "open",
            Self::Discover => "discover",
            Self::Cancel => "cancel",
        }
    }

    pub const fn http_method(self) -> http::Method {
        match self {
            Self::Invoke | Self::Open => http::Method::POST,
            Self::Discover => http::Method::GET,
            Self::Cancel => http::Method::DELETE,
        }
    }

    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment {
            "invoke" => Some(Self::Invoke),
            "open" => Some(Self::Open),
            "discover" => Some(Self::Discover),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// The ten naming operations, each bound to one HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingOp {
    Bind,
    CreateSubcontext,
    Unbind,
    DestroySubcontext,
    List,
    ListBindings,
    Lookup,
    LookupLink,
    Rebind,
    Rename,
}

impl NamingOp {
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::CreateSubcontext => "create-subcontext",
            Self::Unbind => "unbind",
            Self::DestroySubcontext => "dest-subctx",
            Self::List => "list",
            Self::ListBindings => "list-bindings",
            Self::Lookup => "lookup",
            Self::LookupLink => "lookuplink",
            Self::Rebind => "rebind",
            Self::Rename => "rename",
        }
    }

    pub const fn http_method(self) -> http::Method {
        match self {
            Self::Bind | Self::CreateSubcontext => http::Method::PUT,
            Self::Unbind | Self::DestroySubcontext => http::Method::DELETE,
            Self::List | Self::ListBindings => http::Method::GET,
            Self::Lookup | Self::LookupLink => http::Method::POST,
            Self::Rebind | Self::Rename => http::Method::PATCH,
        }
    }

    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment {
            "bind" => Some(Self::Bind),
            "create-subcontext" => Some(Self::CreateSubcontext),
            "unbind" => Some(Self::Unbind),
            "dest-subctx" => Some(Self::DestroySubcontext),
            "list" => Some(Self::List),
            "list-bindings" => Some(Self::ListBindings),
            "lookup" => Some(Self::Lookup),
            "lookuplink" => Some(Self::LookupLink),
            "rebind" => Some(Self::Rebind),
            "rename" => Some(Self::Rename),
            _ => None,
        }
    }
}

/// `{prefix}/ejb/v{N}/invoke/{app}/{module}/{distinct}/{bean}/{sessionIdOrDash}/{view}/{method}/{paramType}*`
///
/// `bean_id` components and `view` are percent-encoded the same way every
/// other segment is: an encoded path is safe in strictly more cases than an
/// unencoded one, and nothing this implementation talks to requires the raw
/// form.
#[allow(clippy::too_many_arguments)]
pub fn ejb_invoke_path(
    prefix: &str,
    version: u32,
    bean_id: &crate::ids::BeanId,
    session_id: Option<&[u8]>,
    view: &str,
    method: &str,
    param_types: &[String],
) -> String {
    let mut path = format!(
        "{prefix}/ejb/v{version}/invoke/{}/{}/{}/{}/",
        encode_segment(&bean_id.app),
        encode_segment(&bean_id.module),
        encode_segment(&bean_id.distinct),
        encode_segment(&bean_id.bean),
    );
    match session_id {
        Some(id) if !id.is_empty() => path.push_str(&encode_segment(&crate::session::encode_session_id(id))),
        _ => path.push('-'),
    }
    path.push('/');
    path.push_str(&encode_segment(view));
    path.push('/');
    path.push_str(&encode_segment(method));
    for param_type in param_types {
        path.push('/');
        path.push_str(&encode_segment(param_type));
    }
    path
}

/// `{prefix}/ejb/v{N}/open/{app}/{module}/{distinct}/{bean}`
pub fn ejb_open_path(prefix: &str, version: u32, bean_id: &crate::ids::BeanId) -> String {
    format!(
        "{prefix}/ejb/v{version}/open/{}/{}/{}/{}",
        encode_segment(&bean_id.app),
        encode_segment(&bean_id.module),
        encode_segment(&bean_id.distinct),
        encode_segment(&bean_id.bean),
    )
}

/// `{prefix}/ejb/v{N}/discover`
pub fn ejb_discover_path(prefix: &str, version: u32) -> String {
    format!("{prefix}/ejb/v{version}/discover")
}

/// `{prefix}/ejb/v{N}/cancel/{app}/{module}/{distinct}/{bean}/{invocationId}/{cancelRunning}`
pub fn ejb_cancel_path(
    prefix: &str,
    version: u32,
    bean_id: &crate::ids::BeanId,
    invocation_id: u64,
    cancel_running: bool,
) -> String {
    format!(
        "{prefix}/ejb/v{version}/cancel/{}/{}/{}/{}/{invocation_id}/{cancel_running}",
        encode_segment(&bean_id.app),
        encode_segment(&bean_id.module),
        encode_segment(&bean_id.distinct),
        encode_segment(&bean_id.bean),
    )
}

/// `{prefix}/naming/v{N}/{op}/{encodedName}[?new={encodedNewName}]`
pub fn naming_path(prefix: &str, version: u32, op: NamingOp, name: &crate::ids::Name, rename_to: Option<&crate::ids::Name>) -> String {
    let mut path = format!("{prefix}/naming/v{version}/{}/{name}", op.path_segment());
    if let Some(new_name) = rename_to {
        path.push_str("?new=");
        path.push_str(&new_name.to_string());
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::BeanId;

    #[test]
    fn empty_segment_round_trips_through_dash() {
        assert_eq!(encode_segment(""), "-");
        assert_eq!(decode_segment("-"), "");
    }

    #[test]
    fn reserved_and_non_ascii_bytes_round_trip() {
        for raw in ["a/b", "weird?query;here", "caf\u{e9}"] {
            let encoded = encode_segment(raw);
            assert_eq!(decode_segment(&encoded), raw);
        }
    }

    #[test]
    fn invoke_path_matches_stateless_scenario() {
        let bean_id = BeanId::new("a", "m", "", "B");
        let path = ejb_invoke_path("/app1", 1, &bean_id, None, "v.I", "echo", &["java.lang.String".to_owned()]);
        assert_eq!(path, "/app1/ejb/v1/invoke/a/m/-/B/-/v.I/echo/java.lang.String");
    }

    #[test]
    fn cancel_path_matches_scenario() {
        let bean_id = BeanId::new("a", "m", "", "B");
        let path = ejb_cancel_path("/app1", 1, &bean_id, 7, true);
        assert_eq!(path, "/app1/ejb/v1/cancel/a/m/-/B/7/true");
    }

    #[test]
    fn discover_path_matches_scenario() {
        assert_eq!(ejb_discover_path("/app1", 1), "/app1/ejb/v1/discover");
    }

    #[test]
    fn naming_lookup_path_composes_child_name() {
        let name = crate::ids::Name::new(["users"]).child("alice");
        let path = naming_path("/ctx", 1, NamingOp::Lookup, &name, None);
        assert_eq!(path, "/ctx/naming/v1/lookup/users%2Falice");
    }

    #[test]
    fn rename_path_carries_new_query_param() {
        let from = crate::ids::Name::new(["old"]);
        let to = crate::ids::Name::new(["new name"]);
        let path = naming_path("/ctx", 1, NamingOp::Rename, &from, Some(&to));
        assert_eq!(path, "/ctx/naming/v1/rename/old?new=new%20name");
    }
}
