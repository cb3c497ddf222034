//! Error type for the event arena.

/// Errors from appending records to an event buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// Record larger than the absolute single-record ceiling.
    #[error("event record of {size} bytes exceeds the maximum of {max} bytes")]
    OversizedRecord {
        /// Total record size that was requested.
        size: usize,
        /// The ceiling ([`MAX_EVENT_SIZE`](crate::MAX_EVENT_SIZE)).
        max: usize,
    },

    /// Record too small to hold the fixed header.
    #[error("event record of {size} bytes is smaller than the {header}-byte header")]
    RuntRecord {
        /// Total record size that was requested.
        size: usize,
        /// The header size ([`EVENT_HEADER_SIZE`](crate::EVENT_HEADER_SIZE)).
        header: usize,
    },

    /// A pre-framed record whose declared size disagrees with the bytes given.
    #[error("framed record declares {declared} bytes but {actual} bytes were supplied")]
    SizeMismatch {
        /// `size_bytes` field of the supplied frame.
        declared: u32,
        /// Length of the supplied slice.
        actual: usize,
    },
}
