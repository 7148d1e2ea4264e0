use thiserror::Error;

/// Errors that can arise while reading or rewriting the relay directory file.
#[derive(Debug, Error)]
pub enum PeerStoreError {
    /// Wrapper around IO errors (open, create_dir, write, flush).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Another process holds the advisory lock on the directory file.
    #[error("relay directory {0} is locked by another writer")]
    Locked(String),

    /// A write failed after some records were already flushed.
    #[error("save aborted after {written} records: {source}")]
    PartialWrite {
        written: usize,
        #[source]
        source: std::io::Error,
    },
}
