//! Class filter: a user-supplied predicate invoked on every concrete class
//! name and proxy interface name before resolution.

use std::sync::Arc;

/// `String -> bool`, evaluated once per decoded class name. Cloning is
/// cheap (an `Arc` clone) so the same filter can be shared across every
/// deserialization call on a target.
#[derive(Clone)]
pub struct ClassFilter(Arc<dyn Fn(&str) -> bool + Send + Sync>);

impl ClassFilter {
    pub fn new(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    /// No filtering: every class name resolves.
    pub fn allow_all() -> Self {
        Self::new(|_| true)
    }

    /// An allow-list filter backed by an exact-match set.
    pub fn allow_list(allowed: impl IntoIterator<Item = String>) -> Self {
        let allowed: std::collections::HashSet<String> = allowed.into_iter().collect();
        Self::new(move |class_name| allowed.contains(class_name))
    }

    pub fn check(&self, class_name: &str) -> bool {
        (self.0)(class_name)
    }
}

impl std::fmt::Debug for ClassFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ClassFilter(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_accepts_anything() {
        assert!(ClassFilter::allow_all().check("anything.At.All"));
    }

    #[test]
    fn allow_list_rejects_names_outside_the_set() {
        let filter = ClassFilter::allow_list(["java.lang.String".to_owned()]);
        assert!(filter.check("java.lang.String"));
        assert!(!filter.check("java.lang.Runtime"));
    }
}
