//! Double-buffered per-device state storage.
//!
//! All device state lives in one contiguous arena managed by the
//! [`StateStore`]: per update context a front and a back buffer (the
//! current-tick and previous-tick snapshots, swapped per device, never
//! copied), plus a default-state buffer and a noise-mask buffer. Devices get
//! linear, 4-byte-aligned offsets into every buffer.
//!
//! When the device roster or any device's layout changes, a new store is
//! allocated and the old contents are [migrated](StateStore::migrate_from)
//! device by device — front and back — so no committed state is ever lost
//! and readers of the old store never observe a torn snapshot.
//!
//! The [`MonitorRegistry`] associates bit regions of a device's state with
//! callbacks that fire when a store commit changes those bits, in
//! caller-specified group order, with group-scoped handled-suppression and
//! optional expiry timers.

mod catalog;
mod error;
mod monitor;
mod store;

pub use catalog::{ControlLayout, DeviceCatalog, DeviceSpec};
pub use error::StoreError;
pub use monitor::{
    BitRegion, EventInfo, MonitorHandle, MonitorRegistry, StateChangeMonitor,
};
pub use store::{ContextMask, DevicePhase, StateStore, UpdateContext};
