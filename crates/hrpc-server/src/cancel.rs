//! The server-side cancellation table: keyed by
//! [`InvocationIdentifier`], it must never leak: every entry is removed on
//! every terminal path for the invocation it was registered for, and a
//! cancel against an unknown key is a no-op.

use dashmap::DashMap;
use hrpc_core::InvocationIdentifier;

use crate::dispatch::CancelHandle;

#[derive(Clone)]
pub(crate) struct CancelTable(std::sync::Arc<DashMap<InvocationIdentifier, Box<dyn CancelHandle>>>);

impl CancelTable {
    pub(crate) fn new() -> Self {
        Self(std::sync::Arc::new(DashMap::new()))
    }

    fn key(invocation_id: u64, session_affinity: &str) -> InvocationIdentifier {
        InvocationIdentifier {
            invocation_id,
            session_affinity: session_affinity.to_owned(),
        }
    }

    pub(crate) fn insert(&self, invocation_id: u64, session_affinity: String, handle: Box<dyn CancelHandle>) {
        self.0.insert(
            InvocationIdentifier {
                invocation_id,
                session_affinity,
            },
            handle,
        );
    }

    /// Removes the entry unconditionally, whether or not one was present.
    pub(crate) fn remove(&self, invocation_id: u64, session_affinity: &str) {
        self.0.remove(&Self::key(invocation_id, session_affinity));
    }

    /// Looks up and removes the entry in one step, returning the handle if
    /// one was registered.
    pub(crate) fn take(&self, invocation_id: u64, session_affinity: &str) -> Option<Box<dyn CancelHandle>> {
        self.0.remove(&Self::key(invocation_id, session_affinity)).map(|(_, handle)| handle)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}
