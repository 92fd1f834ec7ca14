//! Identifiers and value types shared by the bean and naming wire grammars.

use std::fmt;

/// A possibly-empty token from the bean identifier quad. Empty tokens
/// serialize as `-` on the wire; percent-encoding applies only to non-empty
/// values.
pub type Token = String;

/// `(app, module, distinct, bean)`: uniquely names a server-side component
/// instance type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BeanId {
    pub app: Token,
    pub module: Token,
    pub distinct: Token,
    pub bean: Token,
}

impl BeanId {
    pub fn new(app: impl Into<Token>, module: impl Into<Token>, distinct: impl Into<Token>, bean: impl Into<Token>) -> Self {
        Self {
            app: app.into(),
            module: module.into(),
            distinct: distinct.into(),
            bean: bean.into(),
        }
    }

    /// The `(app, module, distinct)` discovery unit this bean belongs to.
    pub fn module_id(&self) -> ModuleId {
        ModuleId {
            app_name: self.app.clone(),
            module_name: self.module.clone(),
            distinct_name: self.distinct.clone(),
        }
    }
}

/// `(appName, moduleName, distinctName)`: a discovery unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleId {
    pub app_name: Token,
    pub module_name: Token,
    pub distinct_name: Token,
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_name, self.module_name)?;
        if !self.distinct_name.is_empty() {
            write!(f, "/{}", self.distinct_name)?;
        }
        Ok(())
    }
}

/// The kind of component a [`BeanLocator`] resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BeanKind {
    Home,
    Stateless,
    /// `sessionId` is the server-minted opaque identifier persisted in the
    /// `x-wf-ejb-jbmar-session-id` header and consumed via a distinct URL
    /// segment on subsequent invocations.
    Stateful(Vec<u8>),
}

/// A bean identifier plus the kind of handle a caller holds on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BeanLocator {
    pub id: BeanId,
    pub kind: BeanKind,
}

impl BeanLocator {
    pub fn home(id: BeanId) -> Self {
        Self { id, kind: BeanKind::Home }
    }

    pub fn stateless(id: BeanId) -> Self {
        Self { id, kind: BeanKind::Stateless }
    }

    pub fn stateful(id: BeanId, session_id: Vec<u8>) -> Self {
        Self {
            id,
            kind: BeanKind::Stateful(session_id),
        }
    }

    pub fn session_id(&self) -> Option<&[u8]> {
        match &self.kind {
            BeanKind::Stateful(id) => Some(id.as_slice()),
            BeanKind::Home | BeanKind::Stateless => None,
        }
    }
}

/// `(invocationId, sessionAffinity)`: indexes the server-side cancellation
/// table. Both components are required to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvocationIdentifier {
    pub invocation_id: u64,
    pub session_affinity: String,
}

/// Distributed-transaction branch identifier: `(formatId, globalTransactionId, branchQualifier)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Xid {
    pub format_id: i32,
    pub global_id: Vec<u8>,
    pub branch_qualifier: Vec<u8>,
}

/// How a call participates in a distributed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionInfo {
    /// Tag byte 0: no distributed transaction.
    None,
    /// Tag byte 1: enlist a remote-coordinated transaction.
    Remote(Xid),
    /// Tag byte 2: outflow a local transaction.
    Local { xid: Xid, remaining_time_seconds: i32 },
}

impl TransactionInfo {
    pub const fn tag(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Remote(_) => 1,
            Self::Local { .. } => 2,
        }
    }
}

/// An ordered list of string components naming a node in the directory
/// service. The empty name refers to the root context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Name(pub Vec<String>);

impl Name {
    pub fn new(components: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(components.into_iter().map(Into::into).collect())
    }

    /// Parses a name from an already percent-decoded path segment (as
    /// handed back by an HTTP router's path extractor, which decodes
    /// `%2F` back into the literal separator between components).
    pub fn parse(decoded_segment: &str) -> Self {
        if decoded_segment.is_empty() {
            Self::default()
        } else {
            Self(decoded_segment.split('/').map(str::to_owned).collect())
        }
    }

    /// A new name with `child` appended, used to compose a returned
    /// sub-context handle's children onto its own path.
    pub fn child(&self, child: impl Into<String>) -> Self {
        let mut components = self.0.clone();
        components.push(child.into());
        Self(components)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The whole name is one URL path segment, so the separator between
        // components is itself escaped to `%2F` rather than emitted as a
        // literal slash.
        let mut first = true;
        for component in &self.0 {
            if !first {
                write!(f, "%2F")?;
            }
            first = false;
            write!(f, "{}", crate::url::encode_segment(component))?;
        }
        Ok(())
    }
}
