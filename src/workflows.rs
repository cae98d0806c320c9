//! Higher-level routines built on the blocking client.
pub mod digest;
pub mod inbox;
pub mod push;
pub mod tags;

pub use digest::{DigestBuilder, DigestFormat, DigestOptions, DigestGrouping};
pub use inbox::{ArchiveRule, InboxAction, QueueStats, ReadingInbox};
pub use push::{
    truncate_str, DeleteResult, FieldTruncation, HighlightPusher, PushResult, SimpleHighlight,
    TruncationInfo, UpdateResult,
};
pub use tags::{normalize_tag_name, TagPattern, TagReport, TagUsage, TagWorkflow};
