//! Error types for checkpoint save and restore.

use std::fmt;
use std::io;

use kiln_storage::StorageError;

/// Errors that can occur while writing or restoring a checkpoint.
#[derive(Debug)]
pub enum CheckpointError {
    /// An I/O error occurred during read or write.
    Io(io::Error),
    /// The stream does not start with the expected `b"KILN"` magic bytes.
    InvalidMagic,
    /// The format version is not supported by this build.
    UnsupportedVersion {
        /// The version found in the stream.
        found: u8,
    },
    /// The stream could not be decoded (truncated or corrupt data).
    Malformed {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// A value block carries a shape tag with no registered codec.
    UnknownShapeTag {
        /// The unrecognized tag.
        tag: u8,
    },
    /// The checkpoint keeps a different number of time states.
    StateDepthMismatch {
        /// States in the checkpoint.
        checkpoint: u32,
        /// States in the current store.
        current: u32,
    },
    /// A declarer's set of stateful properties changed since the checkpoint.
    StatefulSetMismatch {
        /// Display form of the declarer.
        declarer: String,
        /// Stateful names the declarer had in the checkpoint.
        checkpoint: Vec<String>,
        /// Stateful names the declarer has now.
        current: Vec<String>,
    },
    /// A stateful property is declared by a different object than before.
    DeclarerChanged {
        /// The property name.
        property: String,
        /// Declarer recorded in the checkpoint.
        checkpoint: String,
        /// Declarer in the current store.
        current: String,
    },
    /// A stateful property changed value type since the checkpoint.
    ValueTypeMismatch {
        /// The property name.
        property: String,
        /// Type name recorded in the checkpoint.
        checkpoint: String,
        /// Type name in the current store.
        current: String,
    },
    /// The store rejected a restore operation.
    Storage(StorageError),
}

impl CheckpointError {
    /// Whether the checkpoint is well-formed but cannot be applied to
    /// the current store's declarations.
    pub fn is_restart_incompatibility(&self) -> bool {
        matches!(
            self,
            Self::StateDepthMismatch { .. }
                | Self::StatefulSetMismatch { .. }
                | Self::DeclarerChanged { .. }
                | Self::ValueTypeMismatch { .. }
        )
    }
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidMagic => write!(f, "invalid magic bytes (expected b\"KILN\")"),
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported format version {found}")
            }
            Self::Malformed { detail } => write!(f, "malformed checkpoint: {detail}"),
            Self::UnknownShapeTag { tag } => write!(f, "unknown shape tag {tag}"),
            Self::StateDepthMismatch {
                checkpoint,
                current,
            } => {
                write!(
                    f,
                    "checkpoint keeps {checkpoint} time states but the store keeps {current}"
                )
            }
            Self::StatefulSetMismatch {
                declarer,
                checkpoint,
                current,
            } => {
                write!(
                    f,
                    "stateful properties of {declarer} changed: checkpoint has [{}], \
                     current has [{}]",
                    checkpoint.join(", "),
                    current.join(", ")
                )
            }
            Self::DeclarerChanged {
                property,
                checkpoint,
                current,
            } => {
                write!(
                    f,
                    "stateful property '{property}' was declared by {checkpoint}, now by {current}"
                )
            }
            Self::ValueTypeMismatch {
                property,
                checkpoint,
                current,
            } => {
                write!(
                    f,
                    "stateful property '{property}' was {checkpoint}, now {current}"
                )
            }
            Self::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CheckpointError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<StorageError> for CheckpointError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
