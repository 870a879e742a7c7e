//! Process-wide mapping between property names and dense ids.

use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::RwLock;

use crate::error::PropertyError;
use crate::id::PropertyId;

/// Bijective, append-only map between property names and [`PropertyId`]s.
///
/// The id of a name is its insertion position, so ids are dense and never
/// reused. Lookups take a shared lock; registering a new name takes the
/// write lock briefly. A registry is normally shared by every store of a
/// run through an `Arc`.
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    names: RwLock<IndexSet<Arc<str>>>,
}

impl PropertyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `name`, registering it if this is the first time it is seen.
    pub fn add_or_get_id(&self, name: &str) -> PropertyId {
        if let Some(id) = self.query_id(name) {
            return id;
        }
        let mut names = self.names.write();
        // Another thread may have registered it between the two locks.
        let (index, _) = names.insert_full(Arc::from(name));
        PropertyId(index as u32)
    }

    /// Id of an already registered name.
    pub fn get_id(&self, name: &str) -> Result<PropertyId, PropertyError> {
        self.query_id(name).ok_or_else(|| PropertyError::NotFound {
            name: name.to_string(),
        })
    }

    /// Id of `name`, or `None` if it was never registered.
    pub fn query_id(&self, name: &str) -> Option<PropertyId> {
        self.names
            .read()
            .get_index_of(name)
            .map(|i| PropertyId(i as u32))
    }

    /// Name registered under `id`.
    pub fn get_name(&self, id: PropertyId) -> Result<Arc<str>, PropertyError> {
        self.names
            .read()
            .get_index(id.index())
            .cloned()
            .ok_or(PropertyError::UnknownId { id })
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Returns `true` if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All names in id order.
    pub fn names(&self) -> Vec<Arc<str>> {
        self.names.read().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ids_are_dense_and_stable() {
        let reg = PropertyRegistry::new();
        assert_eq!(reg.add_or_get_id("stress"), PropertyId(0));
        assert_eq!(reg.add_or_get_id("strain"), PropertyId(1));
        assert_eq!(reg.add_or_get_id("stress"), PropertyId(0));
        assert_eq!(reg.len(), 2);
        assert_eq!(&*reg.names()[1], "strain");
    }

    #[test]
    fn unknown_lookups_fail() {
        let reg = PropertyRegistry::new();
        reg.add_or_get_id("a");
        assert_eq!(
            reg.get_id("b"),
            Err(PropertyError::NotFound { name: "b".into() })
        );
        assert_eq!(reg.query_id("b"), None);
        assert_eq!(
            reg.get_name(PropertyId(5)),
            Err(PropertyError::UnknownId { id: PropertyId(5) })
        );
    }

    #[test]
    fn concurrent_registration_agrees() {
        let reg = Arc::new(PropertyRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|i| reg.add_or_get_id(&format!("p{i}")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(reg.len(), 50);
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
    }

    proptest! {
        #[test]
        fn name_round_trips(names in prop::collection::vec("[a-z_]{1,12}", 1..30)) {
            let reg = PropertyRegistry::new();
            for n in &names {
                let id = reg.add_or_get_id(n);
                prop_assert_eq!(&*reg.get_name(id).unwrap(), n.as_str());
                prop_assert_eq!(reg.add_or_get_id(n), id);
                prop_assert_eq!(reg.get_id(n), Ok(id));
            }
        }
    }
}
