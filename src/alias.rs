//! Bidirectional name <-> factory registry for typed values.
//!
//! A `Value::Typed(alias, fields)` node round-trips through a registered
//! alias name rather than a concrete Rust type; the registry is what maps
//! between the two. One process-wide registry backs the default
//! [`Wire`](crate::wire::Wire) construction, and any `Wire` may be given
//! its own private registry instead.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// A factory that produces the default-constructed marshalled value for an
/// alias, used by readers that need to materialize a `Typed` node into a
/// concrete type before populating its fields.
pub type Factory = fn() -> crate::Value;

struct Registration {
    canonical: String,
    factory: Factory,
}

/// A concurrent, idempotent alias table.
///
/// Mutations (`add_alias`) are safe to call repeatedly with the same
/// arguments from multiple threads; the last registration for a given
/// canonical name wins, and aliasing a name that is already aliased to the
/// same factory is a no-op.
#[derive(Default)]
pub struct AliasRegistry {
    by_alias: Mutex<HashMap<String, Registration>>,
}

impl AliasRegistry {
    pub fn new() -> AliasRegistry {
        AliasRegistry {
            by_alias: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide default registry.
    pub fn global() -> &'static AliasRegistry {
        static GLOBAL: OnceLock<AliasRegistry> = OnceLock::new();
        GLOBAL.get_or_init(AliasRegistry::new)
    }

    /// Registers `canonical` as the primary alias for `factory`.
    pub fn add_class_alias(&self, canonical: impl Into<String>, factory: Factory) {
        let canonical = canonical.into();
        let mut table = self.by_alias.lock().expect("alias registry poisoned");
        table.insert(
            canonical.clone(),
            Registration {
                canonical,
                factory,
            },
        );
    }

    /// Additionally accepts `old_name` on read as a deprecated synonym for
    /// whatever factory `canonical` is currently registered under. Has no
    /// effect if `canonical` has not been registered yet; call
    /// `add_class_alias` first.
    pub fn add_alias(&self, canonical: &str, old_name: impl Into<String>) {
        let mut table = self.by_alias.lock().expect("alias registry poisoned");
        let factory = table.get(canonical).map(|r| r.factory);
        if let Some(factory) = factory {
            table.insert(
                old_name.into(),
                Registration {
                    canonical: canonical.to_owned(),
                    factory,
                },
            );
        } else {
            log::warn!(
                "add_alias({:?}) ignored: canonical alias {:?} is not registered",
                canonical,
                canonical
            );
        }
    }

    /// The canonical alias name a reader should tag a value with, given
    /// any registered name (canonical or deprecated synonym).
    pub fn canonical_name(&self, alias: &str) -> Option<String> {
        let table = self.by_alias.lock().expect("alias registry poisoned");
        table.get(alias).map(|r| r.canonical.clone())
    }

    /// Looks up the factory for an alias name.
    pub fn factory(&self, alias: &str) -> Option<Factory> {
        let table = self.by_alias.lock().expect("alias registry poisoned");
        table.get(alias).map(|r| r.factory)
    }

    pub fn contains(&self, alias: &str) -> bool {
        let table = self.by_alias.lock().expect("alias registry poisoned");
        table.contains_key(alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    fn make_probe() -> Value {
        Value::Mapping(crate::Dictionary::new())
    }

    #[test]
    fn canonical_and_deprecated_alias_resolve_to_same_factory() {
        let registry = AliasRegistry::new();
        registry.add_class_alias("Probe", make_probe);
        registry.add_alias("Probe", "OldProbeName");

        assert!(registry.factory("Probe").is_some());
        assert!(registry.factory("OldProbeName").is_some());
        assert_eq!(registry.canonical_name("OldProbeName").unwrap(), "Probe");
        assert!(registry.factory("Unregistered").is_none());
    }

    #[test]
    fn reregistering_canonical_is_idempotent() {
        let registry = AliasRegistry::new();
        registry.add_class_alias("Probe", make_probe);
        registry.add_class_alias("Probe", make_probe);
        assert!(registry.contains("Probe"));
    }
}
