//! Checkpoint writer.
//!
//! [`CheckpointWriter`] streams a store's declarations and every stored
//! value to any `Write` sink.

use std::io::Write;

use tracing::debug;

use kiln_core::TimeState;
use kiln_storage::StatefulPropertyStore;

use crate::codec::{encode_manifest, write_len, write_u32_le, write_u64_le, CodecTable};
use crate::error::CheckpointError;
use crate::types::CheckpointManifest;

/// Writes checkpoints to a byte stream.
///
/// Generic over `W: Write` so tests can use `Vec<u8>` and production
/// code can use `BufWriter<File>`.
///
/// # Examples
///
/// ```
/// use kiln_checkpoint::{load_store, CheckpointWriter};
/// use kiln_core::{ElementId, PropertyType, Side, TimeState};
/// use kiln_storage::{ScratchPropertyBuffer, StatefulPropertyStore};
///
/// let store = StatefulPropertyStore::standalone();
/// store.add_property("damage", PropertyType::scalar(), 1, None).unwrap();
/// let element = ElementId::new(0, 0);
/// let mut scratch = ScratchPropertyBuffer::new(2);
/// store.init_stateful_props(&mut scratch, &[], 2, element, Side::Volume).unwrap();
///
/// let mut writer = CheckpointWriter::new(Vec::new());
/// writer.write_store(&store).unwrap();
/// let bytes = writer.into_inner();
///
/// let mut restored = StatefulPropertyStore::standalone();
/// restored.add_property("damage", PropertyType::scalar(), 1, None).unwrap();
/// let summary = load_store(bytes.as_slice(), &mut restored).unwrap();
/// assert_eq!(summary.restored, vec!["damage".to_string()]);
/// assert!(restored.table(TimeState::Old).contains(element, Side::Volume));
/// ```
pub struct CheckpointWriter<W: Write> {
    writer: W,
    codecs: &'static CodecTable,
    entries_written: u64,
}

impl<W: Write> CheckpointWriter<W> {
    /// Create a writer using the standard codec table.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            codecs: CodecTable::standard(),
            entries_written: 0,
        }
    }

    /// Write the full checkpoint of `store`: header, declarations, then
    /// every `(element, side)` entry of every live state.
    pub fn write_store(&mut self, store: &StatefulPropertyStore) -> Result<(), CheckpointError> {
        let manifest = CheckpointManifest::from_store(store);
        encode_manifest(&mut self.writer, &manifest)?;
        for &state in store.max_state().up_to() {
            self.write_state(store, state)?;
        }
        debug!(
            states = manifest.num_states,
            stateful = manifest.stateful.len(),
            entries = self.entries_written,
            "wrote checkpoint"
        );
        Ok(())
    }

    fn write_state(&mut self, store: &StatefulPropertyStore, state: TimeState) -> Result<(), CheckpointError> {
        let w: &mut dyn Write = &mut self.writer;
        let view = store.table(state).read();
        write_u64_le(w, view.element_count() as u64)?;
        for (element, sides) in view.iter() {
            write_u64_le(w, element.to_raw())?;
            write_len(w, sides.len())?;
            for (side, entry) in sides {
                let entry = entry.lock();
                write_u32_le(w, side.to_raw())?;
                write_len(w, entry.len())?;
                let max_qpoints = entry.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
                write_len(w, max_qpoints)?;
                for (index, values) in entry.iter() {
                    write_u32_le(w, index.0)?;
                    self.codecs.encode_values(w, values)?;
                }
                self.entries_written += 1;
            }
        }
        Ok(())
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<(), CheckpointError> {
        self.writer.flush()?;
        Ok(())
    }

    /// `(element, side)` entries written so far, across states.
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    /// Consume the writer and return the underlying `Write` sink.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Write a checkpoint of `store` to `writer` and flush it.
pub fn save_store<W: Write>(writer: W, store: &StatefulPropertyStore) -> Result<(), CheckpointError> {
    let mut writer = CheckpointWriter::new(writer);
    writer.write_store(store)?;
    writer.flush()
}
