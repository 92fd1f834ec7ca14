//! Optional rewrite hooks around (un)marshalling: `write_replace` runs on a
//! value just before it is encoded, `read_resolve` just after it is
//! decoded. A host plugs these in to substitute transport representations,
//! e.g. swapping a live handle for a routable description on the way out
//! and back again on the way in.

use std::sync::Arc;

use crate::value::TypedValue;

type Hook = Arc<dyn Fn(TypedValue) -> TypedValue + Send + Sync>;

#[derive(Clone, Default)]
pub struct ObjectResolver {
    write_replace: Option<Hook>,
    read_resolve: Option<Hook>,
}

impl ObjectResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_write_replace(mut self, hook: impl Fn(TypedValue) -> TypedValue + Send + Sync + 'static) -> Self {
        self.write_replace = Some(Arc::new(hook));
        self
    }

    pub fn with_read_resolve(mut self, hook: impl Fn(TypedValue) -> TypedValue + Send + Sync + 'static) -> Self {
        self.read_resolve = Some(Arc::new(hook));
        self
    }

    pub fn write_replace(&self, value: TypedValue) -> TypedValue {
        match &self.write_replace {
            Some(hook) => hook(value),
            None => value,
        }
    }

    pub fn read_resolve(&self, value: TypedValue) -> TypedValue {
        match &self.read_resolve {
            Some(hook) => hook(value),
            None => value,
        }
    }
}

impl std::fmt::Debug for ObjectResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectResolver")
            .field("write_replace", &self.write_replace.is_some())
            .field("read_resolve", &self.read_resolve.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::WireValue;

    fn tagged(class_name: &str) -> TypedValue {
        TypedValue {
            class_name: class_name.to_owned(),
            fields: vec![("v".to_owned(), WireValue::I32(1))],
        }
    }

    #[test]
    fn default_resolver_passes_values_through() {
        let resolver = ObjectResolver::new();
        assert_eq!(resolver.write_replace(tagged("a")), tagged("a"));
        assert_eq!(resolver.read_resolve(tagged("a")), tagged("a"));
    }

    #[test]
    fn hooks_rewrite_in_their_own_direction_only() {
        let resolver = ObjectResolver::new().with_write_replace(|mut value| {
            value.class_name = "replaced".to_owned();
            value
        });
        assert_eq!(resolver.write_replace(tagged("a")).class_name, "replaced");
        assert_eq!(resolver.read_resolve(tagged("a")).class_name, "a");
    }
}
