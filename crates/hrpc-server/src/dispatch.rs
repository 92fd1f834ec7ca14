//! The host-implemented collaborators the server dispatches into. The local
//! component container and directory are external to this workspace: the
//! wire layer's job ends at handing a fully parsed invocation to these
//! traits and writing their answer back.

use std::collections::HashSet;

use async_trait::async_trait;
use hrpc_codec::{TypedValue, WireValue};
use hrpc_core::{BeanLocator, HrpcError, ModuleId, Name, TransactionInfo};

/// The outcome of dispatching one bean invocation.
pub enum InvokeOutcome {
    /// The call completed synchronously: a result and outbound attachments.
    Completed {
        result: WireValue,
        attachments: Vec<(String, WireValue)>,
    },
    /// The call is `void` and async: respond `202 Accepted` immediately.
    /// A cancel handle may still be registered so a later cancel request
    /// can reach the in-flight work.
    Accepted { cancel_handle: Option<Box<dyn CancelHandle>> },
}

/// A handle to an in-flight invocation, registered in the cancellation
/// table when the call was dispatched with an invocation id. `cancel`
/// never surfaces failure: the cancel handler always answers `2xx`
/// regardless of what the handle does.
#[async_trait]
pub trait CancelHandle: Send + Sync {
    async fn cancel(&self, cancel_running: bool);
}

/// The local component implementation a bean-invocation server dispatches
/// into. One instance is shared across every request the router handles.
#[async_trait]
pub trait EjbDispatcher: Send + Sync {
    /// Resolve and run one invocation. The peer's socket address is
    /// recorded into `attachments[SOURCE_ADDRESS_KEY]` by the caller before
    /// this is invoked, so implementations see it already present.
    #[allow(clippy::too_many_arguments)]
    async fn invoke(
        &self,
        locator: &BeanLocator,
        view: &str,
        method: &str,
        param_types: &[String],
        tx: TransactionInfo,
        args: Vec<WireValue>,
        attachments: Vec<(String, WireValue)>,
    ) -> Result<InvokeOutcome, HrpcError>;

    /// Approve (or reject) opening a stateful session against `locator`'s
    /// bean id. The session id itself is minted by the server; this hook
    /// only lets the local component veto the open or observe it.
    async fn open_session(&self, locator: &BeanLocator, tx: TransactionInfo) -> Result<(), HrpcError>;

    /// Snapshot of currently available modules. Implementations that track
    /// availability through module subscriptions answer from their current
    /// set; freshness is whatever the local component provides, not a wire
    /// guarantee.
    async fn discover(&self) -> HashSet<ModuleId>;
}

/// The result of one naming lookup-family operation.
pub enum NamingLookupOutcome {
    /// `204 No Content`: the name resolves to a sub-context.
    SubContext,
    /// `200 OK` with a `naming-value` body.
    Value(TypedValue),
}

/// The local directory implementation a naming server dispatches into.
#[async_trait]
pub trait NamingDispatcher: Send + Sync {
    async fn lookup(&self, name: &Name) -> Result<NamingLookupOutcome, HrpcError>;
    async fn lookup_link(&self, name: &Name) -> Result<NamingLookupOutcome, HrpcError>;
    async fn list(&self, name: &Name) -> Result<TypedValue, HrpcError>;
    async fn list_bindings(&self, name: &Name) -> Result<TypedValue, HrpcError>;
    async fn bind(&self, name: &Name, value: TypedValue) -> Result<(), HrpcError>;
    async fn rebind(&self, name: &Name, value: TypedValue) -> Result<(), HrpcError>;
    async fn unbind(&self, name: &Name) -> Result<(), HrpcError>;
    async fn create_subcontext(&self, name: &Name) -> Result<(), HrpcError>;
    async fn destroy_subcontext(&self, name: &Name) -> Result<(), HrpcError>;
    async fn rename(&self, name: &Name, new_name: &Name) -> Result<(), HrpcError>;
}
