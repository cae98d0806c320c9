//! Typed records for the Readwise (v2) and Reader (v3) APIs.
use serde::{Deserialize, Deserializer};

pub mod v2;
pub mod v3;

pub use v2::{
    Book, BookCategory, CreatedHighlight, DailyReview, ExportBook, Highlight, HighlightCreate,
    HighlightUpdate, Tag,
};
pub use v3::{
    Document, DocumentCategory, DocumentCreate, DocumentLocation, DocumentTag, DocumentUpdate,
    ReaderTag, SaveResult,
};

/// Treat an explicit JSON `null` the same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
