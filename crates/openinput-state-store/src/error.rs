//! Error type for the state store.

use crate::store::UpdateContext;

/// Errors from allocating or addressing device state buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A device declared a zero-size state block; that device cannot be
    /// registered.
    #[error("device {device_id} has a zero-size state block")]
    ZeroSizedState {
        /// Runtime id of the rejected device.
        device_id: u32,
    },

    /// A device index past the end of the roster.
    #[error("device index {index} is out of range ({count} devices)")]
    UnknownDevice {
        /// The offending index.
        index: usize,
        /// Number of devices in the store.
        count: usize,
    },

    /// The requested update context has no buffers in this store.
    #[error("update context {context:?} has no buffers in this store")]
    ContextDisabled {
        /// The disabled context.
        context: UpdateContext,
    },

    /// A state write that would land outside the device's block.
    #[error("state write of {len} bytes at device-relative offset {offset} exceeds the \
             {block_size}-byte device block")]
    WriteOutOfBounds {
        /// Device-relative byte offset of the write.
        offset: usize,
        /// Length of the write.
        len: usize,
        /// Size of the device's block.
        block_size: usize,
    },
}
