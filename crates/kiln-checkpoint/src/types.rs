//! Checkpoint manifest and restore summary types.

use kiln_core::{Declarer, PropertyId, StatefulIndex};
use kiln_storage::StatefulPropertyStore;

/// What a checkpoint recorded about one declared property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordManifest {
    /// The first declarer, if one was recorded.
    pub declarer: Option<Declarer>,
    /// Shape name as produced by [`ValueKind::type_name`](kiln_core::ValueKind::type_name).
    pub value_type: String,
    /// Deepest history state (0, 1 or 2).
    pub max_state: u8,
}

/// Declarations section of a checkpoint, read before any values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckpointManifest {
    /// Number of time states the store kept.
    pub num_states: u32,
    /// Property names, indexed by property id.
    pub names: Vec<String>,
    /// Property ids, indexed by stateful index.
    pub stateful: Vec<u32>,
    /// Records, indexed by property id. `None` for names the store never declared.
    pub records: Vec<Option<RecordManifest>>,
}

impl CheckpointManifest {
    /// Capture the declarations of `store`.
    pub fn from_store(store: &StatefulPropertyStore) -> Self {
        let names: Vec<String> = store
            .registry()
            .names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        let records = (0..names.len())
            .map(|i| {
                store
                    .prop_record(PropertyId(i as u32))
                    .map(|r| RecordManifest {
                        declarer: r.declarer,
                        value_type: r.ty.kind.type_name(),
                        max_state: r.max_state.depth() as u8,
                    })
            })
            .collect();
        Self {
            num_states: store.num_states() as u32,
            names,
            stateful: store.stateful_prop_ids().iter().map(|id| id.0).collect(),
            records,
        }
    }

    /// Name of the property at checkpoint stateful index `index`.
    pub fn stateful_name(&self, index: StatefulIndex) -> Option<&str> {
        let id = *self.stateful.get(index.index())?;
        self.names.get(id as usize).map(String::as_str)
    }

    /// Record of the property at checkpoint stateful index `index`.
    pub fn stateful_record(&self, index: StatefulIndex) -> Option<&RecordManifest> {
        let id = *self.stateful.get(index.index())?;
        self.records.get(id as usize)?.as_ref()
    }

    /// `(name, record)` for every stateful property, in stateful-index order.
    pub fn stateful_props(&self) -> impl Iterator<Item = (&str, Option<&RecordManifest>)> {
        self.stateful.iter().map(|&id| {
            let name = self.names.get(id as usize).map_or("", String::as_str);
            let record = self.records.get(id as usize).and_then(Option::as_ref);
            (name, record)
        })
    }
}

/// What a restore did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Time states restored.
    pub num_states: u32,
    /// `(element, side)` entries restored across all states.
    pub entries: usize,
    /// Properties whose values were loaded, sorted by name.
    pub restored: Vec<String>,
    /// Checkpoint properties with no stateful counterpart, sorted by name.
    pub discarded: Vec<String>,
}
