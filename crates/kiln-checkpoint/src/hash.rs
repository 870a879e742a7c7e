//! Content digests of property stores.
//!
//! Uses FNV-1a for fast, deterministic hashing of stored values. The
//! digest is independent of table insertion order and of stateful index
//! numbering, so a store and its restored copy hash equal. It is not
//! cryptographically secure.

use kiln_core::{Points, TimeState};
use kiln_storage::{PropertyValues, StatefulPropertyStore};

/// FNV-1a offset basis for 64-bit.
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
/// FNV-1a prime for 64-bit.
const FNV_PRIME: u64 = 0x00000100000001B3;

#[inline]
fn fnv1a_byte(hash: u64, byte: u8) -> u64 {
    (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
}

#[inline]
fn fnv1a_bytes(mut hash: u64, bytes: &[u8]) -> u64 {
    for &b in bytes {
        hash = fnv1a_byte(hash, b);
    }
    hash
}

#[inline]
fn fnv1a_u32(hash: u64, v: u32) -> u64 {
    fnv1a_bytes(hash, &v.to_le_bytes())
}

#[inline]
fn fnv1a_u64(hash: u64, v: u64) -> u64 {
    fnv1a_bytes(hash, &v.to_le_bytes())
}

/// Hash the primal value of every point of `values`.
pub fn values_hash(values: &PropertyValues) -> u64 {
    let plain = values.data().to_plain();
    let mut hash = fnv1a_u32(FNV_OFFSET, u32::from(values.kind().tag()));
    hash = fnv1a_u64(hash, plain.len() as u64);
    match &plain {
        Points::Sequence(per_point) => {
            for point in per_point {
                hash = fnv1a_u64(hash, point.len() as u64);
                for v in point {
                    hash = fnv1a_u64(hash, v.to_bits());
                }
            }
        }
        fixed => {
            for v in fixed.as_flat().unwrap_or_default() {
                hash = fnv1a_u64(hash, v.to_bits());
            }
        }
    }
    hash
}

/// Compute a digest over every value in every live state of `store`.
///
/// Entries are visited in sorted `(element, side)` order and properties
/// in name order; each property name is folded in before its values.
pub fn store_digest(store: &StatefulPropertyStore) -> u64 {
    let mut names: Vec<_> = store
        .stateful_prop_ids()
        .into_iter()
        .filter_map(|id| {
            let name = store.registry().get_name(id).ok()?;
            Some((name, store.stateful_index_of(id)?))
        })
        .collect();
    names.sort();

    let mut hash = fnv1a_u32(FNV_OFFSET, store.num_states() as u32);
    for &state in store.max_state().up_to() {
        hash = fnv1a_u32(hash, state.depth());
        let view = store.table(state).read();
        let mut keys: Vec<_> = view
            .iter()
            .flat_map(|(element, sides)| sides.keys().map(move |&side| (element, side)))
            .collect();
        keys.sort();
        for (element, side) in keys {
            let Some(entry) = view.get(element, side) else {
                continue;
            };
            let entry = entry.lock();
            hash = fnv1a_u64(hash, element.to_raw());
            hash = fnv1a_u32(hash, side.to_raw());
            for (name, index) in &names {
                let Some(values) = entry.get(*index) else {
                    continue;
                };
                hash = fnv1a_bytes(hash, name.as_bytes());
                hash = fnv1a_u64(hash, values_hash(values));
            }
        }
    }
    hash
}

/// Digest of one state only. Useful for checking that `shift()` moved
/// history as expected.
pub fn state_digest(store: &StatefulPropertyStore, state: TimeState) -> u64 {
    let view = store.table(state).read();
    let mut parts: Vec<(u64, u32, u32, u64)> = Vec::new();
    for (element, sides) in view.iter() {
        for (side, entry) in sides {
            for (index, values) in entry.lock().iter() {
                parts.push((element.to_raw(), side.to_raw(), index.0, values_hash(values)));
            }
        }
    }
    parts.sort_unstable();
    let mut hash = FNV_OFFSET;
    for (element, side, index, values) in parts {
        hash = fnv1a_u64(hash, element);
        hash = fnv1a_u32(hash, side);
        hash = fnv1a_u32(hash, index);
        hash = fnv1a_u64(hash, values);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{ElementId, PropertyId, PropertyType, Side};
    use kiln_storage::ScratchPropertyBuffer;

    #[test]
    fn empty_values_hash_is_stable() {
        let a = PropertyValues::new(PropertyId(0), PropertyType::scalar(), 0);
        let b = PropertyValues::new(PropertyId(9), PropertyType::scalar(), 0);
        assert_eq!(values_hash(&a), values_hash(&b));
    }

    #[test]
    fn values_hash_sees_every_point() {
        let mut a = PropertyValues::new(PropertyId(0), PropertyType::vector(2), 3);
        let before = values_hash(&a);
        a.vector_mut::<f64>(2).unwrap()[1] = 1.0;
        assert_ne!(values_hash(&a), before);
    }

    #[test]
    fn shape_is_part_of_the_hash() {
        let s = PropertyValues::new(PropertyId(0), PropertyType::scalar(), 2);
        let v = PropertyValues::new(PropertyId(0), PropertyType::vector(1), 2);
        assert_ne!(values_hash(&s), values_hash(&v));
    }

    #[test]
    fn digest_ignores_declaration_order() {
        let build = |order: &[&str]| {
            let store = StatefulPropertyStore::standalone();
            for name in order {
                store.add_property(name, PropertyType::scalar(), 1, None).unwrap();
            }
            let mut scratch = ScratchPropertyBuffer::new(2);
            for slot in 0..3 {
                store
                    .init_stateful_props(&mut scratch, &[], 2, ElementId::new(slot, 0), Side::Volume)
                    .unwrap();
            }
            store_digest(&store)
        };
        assert_eq!(build(&["a", "b"]), build(&["b", "a"]));
    }

    #[test]
    fn state_digest_of_empty_state() {
        let store = StatefulPropertyStore::standalone();
        assert_eq!(state_digest(&store, TimeState::Current), FNV_OFFSET);
    }
}
