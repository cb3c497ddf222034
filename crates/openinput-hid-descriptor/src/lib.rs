//! Binary HID report-descriptor parsing.
//!
//! HID devices describe their own data layout with a binary report
//! descriptor: a linear sequence of variable-length items that a single-pass
//! state machine turns into collections, elements, usages and bit offsets.
//! The bytes come straight from physical hardware and are fully untrusted:
//! every multi-byte read here is bounds-checked and truncated trailing data
//! degrades to zero rather than erroring, while structural faults (an
//! `EndCollection` with no open collection) fail the parse outright.
//!
//! The resulting [`DeviceDescriptor`] is immutable, owned by the device
//! catalog and serializable to JSON for caching across sessions.
//!
//! For the item format see section 6.2.2 of the
//! [Device Class Definition for Human Interface Devices](https://www.usb.org/sites/default/files/hid1_11.pdf).

mod descriptor;
mod error;
mod parser;

pub use descriptor::{
    CollectionDescriptor, CollectionType, DeviceDescriptor, ElementDescriptor, ReportType,
    element_flags,
};
pub use error::ParseError;
pub use parser::{parse_report_descriptor, parse_report_descriptor_into};
