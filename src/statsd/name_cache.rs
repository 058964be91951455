//! Per-session memo of atom id -> slice name.

use std::collections::HashMap;

use crate::storage::{Stat, StringId, TraceStorage};

use super::schema::{AtomLookup, AtomRegistry};

/// Name used for every atom when the `Atom` descriptor could not be loaded.
pub const MISSING_DESCRIPTOR_NAME: &str = "Could not load atom descriptor";

/// How an atom's payload should be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomRoute {
    /// The id is in the schema; decode with the schema-driven parser.
    Schema,
    /// The schema loaded but does not know the id.
    Unknown,
    /// There is no schema at all.
    NoSchema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAtom {
    pub name: StringId,
    pub route: AtomRoute,
}

/// Caches the interned name and the routing decision for each atom id so the
/// registry is consulted once per id rather than once per atom.
#[derive(Debug, Default)]
pub struct AtomNameCache {
    entries: HashMap<u32, ResolvedAtom>,
}

impl AtomNameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve<R: AtomRegistry + ?Sized>(
        &mut self,
        registry: &R,
        storage: &mut TraceStorage,
        atom_field_id: u32,
    ) -> ResolvedAtom {
        if let Some(cached) = self.entries.get(&atom_field_id) {
            return *cached;
        }

        let resolved = match registry.atom_field(atom_field_id) {
            AtomLookup::NoSchema => {
                // Never cached: every atom is counted while the schema is missing.
                storage.increment_stats(Stat::AtomUnknown);
                return ResolvedAtom {
                    name: storage.intern_string(MISSING_DESCRIPTOR_NAME),
                    route: AtomRoute::NoSchema,
                };
            }
            AtomLookup::Known(name) => ResolvedAtom {
                name: storage.intern_string(name),
                route: AtomRoute::Schema,
            },
            AtomLookup::Unknown => ResolvedAtom {
                name: storage.intern_string(&format!("atom_{atom_field_id}")),
                route: AtomRoute::Unknown,
            },
        };
        self.entries.insert(atom_field_id, resolved);
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto_args::{ArgsDelegate, ArgsParseError};
    use crate::statsd::schema::AtomSchema;
    use std::cell::Cell;

    /// Wraps a schema and counts how often ids are looked up.
    struct CountingRegistry {
        inner: AtomSchema,
        lookups: Cell<usize>,
    }

    impl AtomRegistry for CountingRegistry {
        fn atom_field(&self, field_id: u32) -> AtomLookup<'_> {
            self.lookups.set(self.lookups.get() + 1);
            self.inner.atom_field(field_id)
        }

        fn parse_atom(
            &self,
            payload: &[u8],
            delegate: &mut dyn ArgsDelegate,
        ) -> Result<(), ArgsParseError> {
            self.inner.parse_atom(payload, delegate)
        }
    }

    #[test]
    fn test_repeated_id_is_looked_up_once() {
        let registry = CountingRegistry {
            inner: AtomSchema::builtin(),
            lookups: Cell::new(0),
        };
        let mut storage = TraceStorage::new();
        let mut cache = AtomNameCache::new();

        let first = cache.resolve(&registry, &mut storage, 29);
        for _ in 0..999 {
            assert_eq!(cache.resolve(&registry, &mut storage, 29), first);
        }
        assert_eq!(registry.lookups.get(), 1);
        assert_eq!(storage.get_string(first.name), "screen_state_changed");
        assert_eq!(first.route, AtomRoute::Schema);
    }

    #[test]
    fn test_unknown_id_gets_synthesized_name() {
        let schema = AtomSchema::builtin();
        let mut storage = TraceStorage::new();
        let mut cache = AtomNameCache::new();

        let resolved = cache.resolve(&schema, &mut storage, 4242);
        assert_eq!(storage.get_string(resolved.name), "atom_4242");
        assert_eq!(resolved.route, AtomRoute::Unknown);
        // Unknown ids are counted by the dispatcher, not here.
        assert_eq!(storage.stat(Stat::AtomUnknown), 0);
    }

    #[test]
    fn test_missing_schema_is_never_cached() {
        let schema = AtomSchema::missing();
        let mut storage = TraceStorage::new();
        let mut cache = AtomNameCache::new();

        for _ in 0..3 {
            let resolved = cache.resolve(&schema, &mut storage, 29);
            assert_eq!(storage.get_string(resolved.name), MISSING_DESCRIPTOR_NAME);
            assert_eq!(resolved.route, AtomRoute::NoSchema);
        }
        assert!(cache.entries.is_empty());
        assert_eq!(storage.stat(Stat::AtomUnknown), 3);
    }
}
