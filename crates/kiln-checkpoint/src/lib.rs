//! Checkpoint and restart support for Kiln property stores.
//!
//! Saves every stored value of a [`StatefulPropertyStore`] to a binary
//! stream and restores it into a freshly declared store, rejecting
//! checkpoints whose declarations no longer match.
//!
//! # Architecture
//!
//! - [`CheckpointWriter`] / [`save_store`] write to any `Write` sink
//! - [`CheckpointReader`] / [`load_store`] restore from any `Read` source
//! - [`check_compatibility`] runs the restart checks before any value moves
//! - [`store_digest`] and [`compare_stores`] verify a restore
//! - All I/O uses a custom binary codec (no serde dependency)
//!
//! # Format
//!
//! ```text
//! [MAGIC "KILN"] [VERSION u8] [num_states u32]
//! [names] [stateful ids] [records]
//! [state 0 entries] ... [state num_states-1 entries]
//! ```
//!
//! Each entry holds one `(element, side)` with one value block per
//! stored property, keyed by the checkpoint's stateful index.
//!
//! [`StatefulPropertyStore`]: kiln_storage::StatefulPropertyStore

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod compare;
pub mod error;
pub mod hash;
pub mod reader;
pub mod types;
pub mod writer;

pub use codec::{CodecTable, ShapeCodec};
pub use compare::{compare_stores, DivergenceKind, DivergenceReport, PropertyDivergence};
pub use error::CheckpointError;
pub use hash::{state_digest, store_digest, values_hash};
pub use reader::{check_compatibility, load_store, CheckpointReader};
pub use types::{CheckpointManifest, RecordManifest, RestoreSummary};
pub use writer::{save_store, CheckpointWriter};

/// Magic bytes at the start of every checkpoint.
pub const MAGIC: [u8; 4] = *b"KILN";

/// Current binary format version.
///
/// History:
/// - v1: initial layout; value blocks carry the checkpoint stateful index
pub const FORMAT_VERSION: u8 = 1;
