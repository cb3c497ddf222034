//! Error type for pipeline operations.

use openinput_state_block::FourCC;
use openinput_state_store::StoreError;

/// Errors from device registration and tick processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// The device id is already in the roster.
    #[error("device {device_id} is already registered")]
    DuplicateDevice {
        /// The offending id.
        device_id: u32,
    },

    /// The catalog does not know the device kind.
    #[error("device kind '{kind}' is unknown to the catalog")]
    UnknownKind {
        /// The unknown kind tag.
        kind: FourCC,
    },

    /// The device id is not in the roster.
    #[error("device {device_id} is not registered")]
    UnknownDevice {
        /// The missing id.
        device_id: u32,
    },

    /// The device's layout has no such control.
    #[error("device {device_id} has no control {control_id}")]
    UnknownControl {
        /// Device that was addressed.
        device_id: u32,
        /// Control that does not exist on it.
        control_id: u32,
    },

    /// An underlying state store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
