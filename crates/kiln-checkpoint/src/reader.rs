//! Checkpoint reader and restart compatibility checks.
//!
//! [`CheckpointReader`] validates the header and reads the declarations
//! section on open. [`check_compatibility`] compares those declarations
//! with the store being restored before any value is touched, so an
//! incompatible checkpoint leaves the store unchanged.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;

use tracing::{debug, warn};

use kiln_core::{
    Declarer, ElementId, PointData, PropertyId, Side, StatefulIndex, TimeState, ValueKind,
};
use kiln_storage::{PropertyEntry, PropertyValues, StatefulPropertyStore};

use crate::codec::{decode_manifest, read_len, read_u32_le, read_u64_le, CodecTable};
use crate::error::CheckpointError;
use crate::types::{CheckpointManifest, RecordManifest, RestoreSummary};

/// Reads a checkpoint from a byte stream.
///
/// Generic over `R: Read` so tests can use `&[u8]` and production
/// code can use `BufReader<File>`.
pub struct CheckpointReader<R: Read> {
    reader: R,
    manifest: CheckpointManifest,
    codecs: &'static CodecTable,
}

/// A decoded entry waiting to be installed.
type StagedEntry = (TimeState, ElementId, Side, PropertyEntry);

/// Where a checkpoint stateful property lands in the current store.
#[derive(Clone, Copy)]
struct Target {
    id: PropertyId,
    index: StatefulIndex,
    kind: ValueKind,
}

impl<R: Read> CheckpointReader<R> {
    /// Open a checkpoint stream, reading the header and declarations.
    pub fn open(mut reader: R) -> Result<Self, CheckpointError> {
        let manifest = decode_manifest(&mut reader)?;
        Ok(Self {
            reader,
            manifest,
            codecs: CodecTable::standard(),
        })
    }

    /// Declarations recorded in the checkpoint.
    pub fn manifest(&self) -> &CheckpointManifest {
        &self.manifest
    }

    /// Load every stored value into `store`.
    ///
    /// Runs [`check_compatibility`] first, then decodes every value block.
    /// Only once the whole stream has parsed are the store's previous
    /// values released, checkpoint values installed under the store's own
    /// stateful indices, and every loaded property marked restored. A
    /// stream that fails to parse leaves the store unchanged. Checkpoint
    /// properties that are not stateful in `store` are read and discarded.
    pub fn restore_into(mut self, store: &mut StatefulPropertyStore) -> Result<RestoreSummary, CheckpointError> {
        check_compatibility(&self.manifest, store)?;

        let mut targets: Vec<Option<Target>> = Vec::with_capacity(self.manifest.stateful.len());
        for (name, _) in self.manifest.stateful_props() {
            let target = store.registry().query_id(name).and_then(|id| {
                let record = store.prop_record(id)?;
                Some(Target {
                    id,
                    index: record.stateful_index?,
                    kind: record.ty.kind,
                })
            });
            targets.push(target);
        }

        let mut staged = Vec::new();
        let mut discarded = BTreeSet::new();
        for &state in TimeState::ALL.iter().take(self.manifest.num_states as usize) {
            self.read_state(state, &targets, &mut staged, &mut discarded)?;
        }

        store.release_properties();
        let entries = staged.len();
        for (state, element, side, entry) in staged {
            store.restore_entry(state, element, side, entry);
        }

        let mut restored = BTreeSet::new();
        for (i, target) in targets.iter().enumerate() {
            let Some(target) = target else {
                continue;
            };
            store.mark_restored(target.id);
            if let Some(name) = self.manifest.stateful_name(StatefulIndex(i as u32)) {
                restored.insert(name.to_string());
            }
        }
        for name in &discarded {
            warn!(property = %name, "discarded checkpoint property with no stateful counterpart");
        }
        debug!(
            states = self.manifest.num_states,
            entries,
            restored = restored.len(),
            "restored checkpoint"
        );
        Ok(RestoreSummary {
            num_states: self.manifest.num_states,
            entries,
            restored: restored.into_iter().collect(),
            discarded: discarded.into_iter().collect(),
        })
    }

    fn read_state(
        &mut self,
        state: TimeState,
        targets: &[Option<Target>],
        staged: &mut Vec<StagedEntry>,
        discarded: &mut BTreeSet<String>,
    ) -> Result<(), CheckpointError> {
        let r: &mut dyn Read = &mut self.reader;
        let n_elements = read_u64_le(r)?;
        for _ in 0..n_elements {
            let element = ElementId::from_raw(read_u64_le(r)?);
            let n_sides = read_len(r)?;
            for _ in 0..n_sides {
                let raw_side = read_u32_le(r)?;
                let side = Side::from_raw(raw_side).ok_or_else(|| CheckpointError::Malformed {
                    detail: format!("side index {raw_side}"),
                })?;
                let n_props = read_len(r)?;
                let _max_qpoints = read_len(r)?;
                let mut entry = PropertyEntry::new();
                for _ in 0..n_props {
                    let index = read_u32_le(r)?;
                    let target = targets.get(index as usize).ok_or_else(|| CheckpointError::Malformed {
                        detail: format!("value block for stateful index {index}"),
                    })?;
                    let points = self.codecs.decode_points(r)?;
                    let Some(target) = target else {
                        if let Some(name) = self.manifest.stateful_name(StatefulIndex(index)) {
                            discarded.insert(name.to_string());
                        }
                        continue;
                    };
                    if points.kind() != target.kind {
                        return Err(CheckpointError::Malformed {
                            detail: format!(
                                "stored {} values for a {} property",
                                points.kind(),
                                target.kind
                            ),
                        });
                    }
                    let values = PropertyValues::from_data(target.id, PointData::Plain(points));
                    entry.insert(target.index, values);
                }
                if !entry.is_empty() {
                    staged.push((state, element, side, entry));
                }
            }
        }
        Ok(())
    }
}

/// Open `reader` and restore its contents into `store`.
pub fn load_store<R: Read>(reader: R, store: &mut StatefulPropertyStore) -> Result<RestoreSummary, CheckpointError> {
    CheckpointReader::open(reader)?.restore_into(store)
}

/// Verify that the checkpoint's declarations can be applied to `store`.
///
/// Checked in order:
/// 1. the number of time states matches;
/// 2. for each current stateful property whose declarer also declared
///    stateful properties in the checkpoint, that declarer's set of
///    stateful names is unchanged;
/// 3. a stateful property present in both was declared by the same object;
/// 4. a stateful property present in both has the same value type.
pub fn check_compatibility(
    manifest: &CheckpointManifest,
    store: &StatefulPropertyStore,
) -> Result<(), CheckpointError> {
    let current_states = store.num_states() as u32;
    if manifest.num_states != current_states {
        return Err(CheckpointError::StateDepthMismatch {
            checkpoint: manifest.num_states,
            current: current_states,
        });
    }

    let mut saved_by_name: HashMap<&str, Option<&RecordManifest>> = HashMap::new();
    let mut saved_sets: BTreeMap<&Declarer, BTreeSet<String>> = BTreeMap::new();
    for (name, record) in manifest.stateful_props() {
        saved_by_name.insert(name, record);
        if let Some(declarer) = record.and_then(|r| r.declarer.as_ref()) {
            saved_sets.entry(declarer).or_default().insert(name.to_string());
        }
    }

    let mut current = Vec::new();
    let mut current_sets: BTreeMap<Declarer, BTreeSet<String>> = BTreeMap::new();
    for id in store.stateful_prop_ids() {
        let (Ok(name), Some(record)) = (store.registry().get_name(id), store.prop_record(id)) else {
            continue;
        };
        if let Some(declarer) = &record.declarer {
            current_sets
                .entry(declarer.clone())
                .or_default()
                .insert(name.to_string());
        }
        current.push((name, record));
    }

    for (name, record) in &current {
        if let Some(declarer) = &record.declarer {
            if let (Some(saved), Some(now)) = (saved_sets.get(declarer), current_sets.get(declarer)) {
                if saved != now {
                    return Err(CheckpointError::StatefulSetMismatch {
                        declarer: declarer.to_string(),
                        checkpoint: saved.iter().cloned().collect(),
                        current: now.iter().cloned().collect(),
                    });
                }
            }
        }

        let Some(Some(saved)) = saved_by_name.get(name.as_ref()) else {
            continue;
        };
        if let (Some(before), Some(now)) = (&saved.declarer, &record.declarer) {
            if before != now {
                return Err(CheckpointError::DeclarerChanged {
                    property: name.to_string(),
                    checkpoint: before.to_string(),
                    current: now.to_string(),
                });
            }
        }
        let now_type = record.ty.kind.type_name();
        if saved.value_type != now_type {
            return Err(CheckpointError::ValueTypeMismatch {
                property: name.to_string(),
                checkpoint: saved.value_type.clone(),
                current: now_type,
            });
        }
    }
    Ok(())
}
