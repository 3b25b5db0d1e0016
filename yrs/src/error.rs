use crate::id::ClientID;

/// The error taxonomy surfaced to callers. `MissingDependency` is deliberately absent: it is
/// non-fatal by design (the affected range is buffered into
/// `Store::pending`/`Store::pending_ds` and retried once the prerequisite
/// arrives), so it never surfaces as an `Err` from `apply_update`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Ill-formed update bytes: integer overflow, unknown content tag,
    /// unexpected end of input. Fatal to the update currently being decoded;
    /// the replica's existing state is untouched because decoding happens
    /// before any integration takes place.
    #[error("failed to decode update: {0}")]
    Decoding(#[from] lib0::Error),

    /// Integration found a gap in a per-client clock sequence (invariant
    /// S1/S2 violated). Indicates a corrupted store or a buggy encoder;
    /// unlike `MissingDependency` this is not recoverable by waiting.
    #[error("struct store invariant violated for client {0}: clock sequence has a gap")]
    StructureViolation(ClientID),

    /// `get_or_define(name, kind)` was called with a `kind` that doesn't
    /// match a type already registered under `name`.
    #[error("root type '{0}' already exists with a different, incompatible kind")]
    TypeMismatch(String),

    /// A sequence-level insert/delete went past the bounds of the type.
    #[error("operation index {index} is out of bounds for a sequence of length {len}")]
    LengthExceeded { index: u64, len: u64 },

    /// `document_from_snapshot` was invoked on a source document with GC
    /// enabled — deleted content it needs may already be gone.
    #[error("cannot restore a snapshot from a document that garbage-collects deleted content")]
    UnsupportedGc,
}
