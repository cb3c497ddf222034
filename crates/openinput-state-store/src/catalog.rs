//! The external device catalog seam.

use openinput_state_block::{FourCC, StateBlock};
use serde::{Deserialize, Serialize};

/// One control's identity and location within its device's state block.
///
/// Offsets in `block` are relative to the device block, so a layout is a
/// portable asset independent of where the device lands in the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlLayout {
    /// Stable identifier of the control within its device kind.
    pub control_id: u32,
    /// Where the control's bits live.
    pub block: StateBlock,
    /// Whether the control changes value without user action (sensor
    /// jitter). Noisy bits are excluded from significance checks.
    #[serde(default)]
    pub noisy: bool,
}

/// Identity and memory requirements of one device in the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Runtime id assigned by the platform backend. Never reused within a
    /// session.
    pub device_id: u32,
    /// Format tag of the device's state block; doubles as the device kind
    /// for catalog lookups.
    pub state_format: FourCC,
    /// Total state size in bytes, before 4-byte alignment.
    pub state_size_in_bytes: u32,
}

/// External collaborator that knows device kinds: their state size and
/// per-control bit layout. Consumed by the store at registration and
/// migration time only; read-only during normal operation.
pub trait DeviceCatalog {
    /// Total state size in bytes for a kind, `None` for unknown kinds.
    fn state_size_in_bytes(&self, kind: FourCC) -> Option<u32>;

    /// Per-control layout for a kind; offsets relative to the device block.
    fn control_layout(&self, kind: FourCC) -> Vec<ControlLayout>;
}
