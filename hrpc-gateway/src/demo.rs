//! In-memory dispatcher backends used only by the `serve` subcommand, so
//! this binary's HTTP boundary can be smoke-tested without an actual
//! component container behind it. An embedder wires its own
//! [`hrpc_server::EjbDispatcher`] / [`hrpc_server::NamingDispatcher`]
//! instead of reusing this module.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use hrpc_codec::{TypedValue, WireValue};
use hrpc_core::{BeanLocator, HrpcError, ModuleId, Name, TransactionInfo};
use hrpc_server::{EjbDispatcher, InvokeOutcome, NamingDispatcher, NamingLookupOutcome};

/// Echoes the first argument back as the invocation result and never
/// accepts anything asynchronously.
#[derive(Default)]
pub struct DemoEjbDispatcher;

#[async_trait]
impl EjbDispatcher for DemoEjbDispatcher {
    async fn invoke(
        &self,
        _locator: &BeanLocator,
        _view: &str,
        _method: &str,
        _param_types: &[String],
        _tx: TransactionInfo,
        args: Vec<WireValue>,
        attachments: Vec<(String, WireValue)>,
    ) -> Result<InvokeOutcome, HrpcError> {
        let result = args.into_iter().next().unwrap_or(WireValue::Null);
        Ok(InvokeOutcome::Completed { result, attachments })
    }

    async fn open_session(&self, _locator: &BeanLocator, _tx: TransactionInfo) -> Result<(), HrpcError> {
        Ok(())
    }

    async fn discover(&self) -> HashSet<ModuleId> {
        HashSet::new()
    }
}

#[derive(Default)]
pub struct DemoNamingDispatcher {
    bindings: Mutex<HashMap<String, TypedValue>>,
}

fn key(name: &Name) -> String {
    name.0.join("/")
}

#[async_trait]
impl NamingDispatcher for DemoNamingDispatcher {
    async fn lookup(&self, name: &Name) -> Result<NamingLookupOutcome, HrpcError> {
        self.bindings
            .lock()
            .expect("bindings mutex is never poisoned")
            .get(&key(name))
            .cloned()
            .map(NamingLookupOutcome::Value)
            .ok_or_else(|| HrpcError::name_not_found().msg(format!("no binding for `{name}`")))
    }

    async fn lookup_link(&self, name: &Name) -> Result<NamingLookupOutcome, HrpcError> {
        self.lookup(name).await
    }

    async fn list(&self, _name: &Name) -> Result<TypedValue, HrpcError> {
        Ok(TypedValue { class_name: "java.util.List".to_owned(), fields: vec![] })
    }

    async fn list_bindings(&self, name: &Name) -> Result<TypedValue, HrpcError> {
        self.list(name).await
    }

    async fn bind(&self, name: &Name, value: TypedValue) -> Result<(), HrpcError> {
        self.bindings.lock().expect("bindings mutex is never poisoned").insert(key(name), value);
        Ok(())
    }

    async fn rebind(&self, name: &Name, value: TypedValue) -> Result<(), HrpcError> {
        self.bind(name, value).await
    }

    async fn unbind(&self, name: &Name) -> Result<(), HrpcError> {
        self.bindings.lock().expect("bindings mutex is never poisoned").remove(&key(name));
        Ok(())
    }

    async fn create_subcontext(&self, _name: &Name) -> Result<(), HrpcError> {
        Ok(())
    }

    async fn destroy_subcontext(&self, _name: &Name) -> Result<(), HrpcError> {
        Ok(())
    }

    async fn rename(&self, name: &Name, new_name: &Name) -> Result<(), HrpcError> {
        let mut bindings = self.bindings.lock().expect("bindings mutex is never poisoned");
        if let Some(value) = bindings.remove(&key(name)) {
            bindings.insert(key(new_name), value);
        }
        Ok(())
    }
}
