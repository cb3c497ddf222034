//! The per-tick event-to-state pipeline.
//!
//! This crate wires the low-level pieces together: once per update tick the
//! pipeline compacts the incoming [`EventBuffer`](openinput_events::EventBuffer),
//! walks its records in append order, copies state payloads into the
//! [`StateStore`](openinput_state_store::StateStore)'s back buffers, fires
//! the change monitors whose bit regions intersect the written bytes, and
//! commits each write by swapping that device's front and back buffers.
//!
//! Devices enter and leave through [`InputPipeline::register_device`] /
//! [`InputPipeline::remove_device`], which rebuild the store and migrate all
//! surviving state. The external [`DeviceCatalog`](openinput_state_store::DeviceCatalog)
//! is consulted only at those points; a HID device's catalog entry is
//! typically derived from its parsed report descriptor via
//! [`layout_from_descriptor`].

mod error;
mod hid;
mod pipeline;

pub use error::PipelineError;
pub use hid::{input_state_size_in_bytes, layout_from_descriptor};
pub use pipeline::{InputPipeline, UpdateSummary};
