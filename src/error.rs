use thiserror::Error;

/// Sum-type error surface for the storage engine: storage I/O failures,
/// configuration mistakes, and on-disk corruption all get a distinct,
/// matchable variant instead of a single opaque error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("key not found")]
    NotFound,

    #[error("storage read failed: {0}")]
    StorageRead(#[source] std::io::Error),

    #[error("storage write failed: {0}")]
    StorageWrite(#[source] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("corrupt page {page_id}: {reason}")]
    CorruptPage { page_id: u32, reason: String },
}
