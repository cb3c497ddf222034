//! Parse failures.

/// Structural faults that fail a report-descriptor parse.
///
/// Everything else a malformed descriptor can throw at the parser (unknown
/// items, truncated trailing data) is tolerated and degrades rather than
/// erroring; these are the faults with no sane recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// An `EndCollection` item with no open collection.
    #[error("unbalanced end-collection item at byte offset {offset}")]
    UnbalancedEndCollection {
        /// Byte offset of the offending item.
        offset: usize,
    },

    /// A long item (`0xFE` prefix). No shipping device descriptor uses
    /// them and their payload cannot be safely skipped without trusting
    /// the declared length, so the parse is declined.
    #[error("long item at byte offset {offset} is not supported")]
    LongItem {
        /// Byte offset of the offending item.
        offset: usize,
    },
}
