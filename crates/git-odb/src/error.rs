//! The seven error kinds a store operation can report, independently
//! matchable regardless of which sub-store produced them.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    /// The identified object is not present in the consulted store, or its
    /// on-disk representation is unreadable.
    #[error("bad object: {0}")]
    BadObject(String),

    /// A pack header reported an unknown numeric type.
    #[error("unknown pack object type id: {0}")]
    BadObjectType(u8),

    /// A partial digest matched two or more distinct full digests in the
    /// search scope.
    #[error("ambiguous object name: {0}")]
    AmbiguousObjectName(String),

    /// A store was constructed on a path that yielded no usable sub-stores.
    #[error("invalid object database root: {}", .0.display())]
    InvalidDBRoot(PathBuf),

    /// E.g. CRC verification requested on a v1 index; writes requested on
    /// the packed store.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Malformed opcodes, out-of-range copy, or truncated delta buffer.
    #[error("delta apply error: {0}")]
    DeltaApplyError(String),

    /// Underlying filesystem or decompression failure.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

impl From<git_loose::LooseError> for OdbError {
    fn from(err: git_loose::LooseError) -> Self {
        use git_loose::LooseError as E;
        match err {
            E::Corrupt { oid, reason } => OdbError::BadObject(format!("{oid}: {reason}")),
            E::Decompress { oid, source } => {
                OdbError::BadObject(format!("{oid}: decompression failed: {source}"))
            }
            E::HashMismatch {
                path,
                expected,
                actual,
            } => OdbError::BadObject(format!(
                "{}: hash mismatch, expected {expected}, got {actual}",
                path.display()
            )),
            E::AmbiguousObjectName { partial_hex } => OdbError::AmbiguousObjectName(partial_hex),
            E::Io(e) => OdbError::IoError(e),
            E::Header(e) => OdbError::BadObject(e.to_string()),
            E::Hash(e) => OdbError::BadObject(e.to_string()),
            E::Util(e) => OdbError::IoError(std::io::Error::other(e.to_string())),
        }
    }
}

impl From<git_pack::PackError> for OdbError {
    fn from(err: git_pack::PackError) -> Self {
        use git_pack::PackError as E;
        match err {
            E::AmbiguousObjectName { partial_hex } => OdbError::AmbiguousObjectName(partial_hex),
            E::InvalidDelta { offset, reason } => {
                OdbError::DeltaApplyError(format!("at offset {offset}: {reason}"))
            }
            E::MissingBase(oid) => OdbError::BadObject(format!("delta base {oid} not found")),
            E::DeltaChainTooDeep { offset, max_depth } => OdbError::DeltaApplyError(format!(
                "chain exceeds {max_depth} levels at offset {offset}"
            )),
            E::ChecksumMismatch { expected, actual } => OdbError::BadObject(format!(
                "pack checksum mismatch: expected {expected}, got {actual}"
            )),
            E::CorruptEntry(offset) => OdbError::BadObject(format!("corrupt entry at offset {offset}")),
            E::UnknownType(type_id) => OdbError::BadObjectType(type_id),
            E::InvalidHeader(reason) => OdbError::BadObject(reason),
            E::InvalidIndex(reason) => OdbError::BadObject(reason),
            E::UnsupportedVersion(v) => {
                OdbError::UnsupportedOperation(format!("unsupported pack/index version {v}"))
            }
            E::UnsupportedOperation(reason) => OdbError::UnsupportedOperation(reason),
            E::Io(e) => OdbError::IoError(e),
            E::Object(e) => OdbError::BadObject(e.to_string()),
            E::Hash(e) => OdbError::BadObject(e.to_string()),
        }
    }
}
