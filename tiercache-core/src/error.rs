use tiercache_stats::StatisticsError;

/// Errors raised by store operations.
///
/// Absence is never an error: a missing key is `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// `replace_if` was handed two elements with different keys.
    #[error("replace_if requires old and new elements to share a key")]
    KeyMismatch,

    #[error("disk store {operation} failed: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Another live disk store owns the data file.
    #[error("data file {} is already in use", path.display())]
    FileInUse { path: std::path::PathBuf },

    #[error("element encoding failed: {0}")]
    Serialization(#[from] bincode::Error),

    /// The write delegate rejected a change that was already applied locally.
    #[error("cache writer failed: {0}")]
    Writer(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("store has been disposed")]
    Disposed,

    #[error(transparent)]
    Statistics(#[from] StatisticsError),
}

impl CacheError {
    pub(crate) fn io(operation: &'static str, source: std::io::Error) -> Self {
        CacheError::Io { operation, source }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
