//! Framed event records and the event arena.
//!
//! Platform backends deliver input as variable-length binary records: a
//! 20-byte header (four-character type tag, total size, device id, f64
//! timestamp) followed by a type-specific payload, with the whole record
//! padded to 4-byte alignment inside the buffer. The [`EventBuffer`] arena
//! stores a tick's worth of such records contiguously and grows by
//! reallocation; consumers walk it with a lazy iterator that skips unknown
//! type tags by their declared size.
//!
//! The [`compactor`] pass losslessly merges redundant consecutive pointer
//! move records in place before the pipeline walks the buffer.

mod buffer;
pub mod compactor;
mod error;
mod event;
mod pointer;

pub use buffer::{EventBuffer, EventIter};
pub use error::EventError;
pub use event::{
    DELTA_STATE_EVENT, DeltaStateEventView, EVENT_ALIGNMENT, EVENT_HEADER_SIZE, EventRecord,
    MAX_EVENT_SIZE, STATE_EVENT, StateEventView, align_event_size,
};
pub use pointer::{POINTER_FORMAT, POINTER_STATE_SIZE, PointerState};
