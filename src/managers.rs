//! Resource-level conveniences over the clients: filtered listings,
//! text search, bulk edits and aggregate statistics.
//!
//! Every manager comes in two forms. The plain one borrows a
//! [`crate::client::blocking::ReadwiseClient`]; the `Async` one borrows the
//! async [`crate::ReadwiseClient`]. Relative windows go through
//! [`crate::Since::from_parts`], so "days, hours or a timestamp" behaves the
//! same everywhere. Bulk operations never fail as a whole: each id maps to
//! whether its request succeeded.
pub mod books;
pub mod documents;
pub mod highlights;

pub use books::{AsyncBookManager, BookManager, BookWithHighlights, ReadingStats};
pub use documents::{AsyncDocumentManager, DocumentManager, InboxStats};
pub use highlights::{AsyncHighlightManager, HighlightManager};

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::since::Since;

/// Resolve the loose window triple against the current time.
fn cutoff(
    days: Option<u32>,
    hours: Option<u32>,
    at: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>> {
    Ok(Since::from_parts(days, hours, at)?.resolve(Utc::now()))
}

/// Case-insensitive substring match on an optional field.
fn contains_ignore_case(field: Option<&str>, needle: &str) -> bool {
    field.is_some_and(|value| value.to_lowercase().contains(needle))
}
