use crate::{CacheError, Element, Result};

pub type WriterError = Box<dyn std::error::Error + Send + Sync>;

/// Write-through delegate notified after a store applied a change.
///
/// Stores apply the change locally first and notify afterwards. A failing
/// delegate surfaces as [`CacheError::Writer`]; the local change stays.
pub trait CacheWriter<K, V>: Send + Sync {
    fn write(&self, element: &Element<K, V>) -> std::result::Result<(), WriterError>;

    fn delete(&self, element: &Element<K, V>) -> std::result::Result<(), WriterError>;
}

/// Hands a stored element to `writer`, if both are present.
pub fn notify_write<K, V>(
    writer: Option<&dyn CacheWriter<K, V>>,
    element: Option<&Element<K, V>>,
) -> Result<()> {
    match (writer, element) {
        (Some(writer), Some(element)) => writer.write(element).map_err(|e| {
            tracing::warn!(error = %e, "cache writer rejected write");
            CacheError::Writer(e)
        }),
        _ => Ok(()),
    }
}

pub fn notify_delete<K, V>(
    writer: Option<&dyn CacheWriter<K, V>>,
    element: Option<&Element<K, V>>,
) -> Result<()> {
    match (writer, element) {
        (Some(writer), Some(element)) => writer.delete(element).map_err(|e| {
            tracing::warn!(error = %e, "cache writer rejected delete");
            CacheError::Writer(e)
        }),
        _ => Ok(()),
    }
}
