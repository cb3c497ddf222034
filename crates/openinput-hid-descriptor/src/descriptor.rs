//! The parsed device descriptor model.

use serde::{Deserialize, Serialize};

/// Which report stream an element belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    /// Device-to-host interrupt data.
    Input,
    /// Host-to-device data (LEDs, rumble, ...).
    Output,
    /// Configuration data exchanged on request.
    Feature,
}

/// HID collection types from the `Collection` main-item data byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    /// A group of axes sharing a physical sensor.
    Physical,
    /// A top-level functional device (mouse, keyboard, gamepad).
    Application,
    /// A logical grouping of related data.
    Logical,
    /// A group forming one report.
    Report,
    /// A named array of selectors.
    NamedArray,
    /// A usage-switch modifier set.
    UsageSwitch,
    /// A usage-modifier set.
    UsageModifier,
    /// Reserved or vendor-defined type byte.
    Other(u32),
}

impl CollectionType {
    /// Decode the main-item data value.
    pub fn from_data(data: u32) -> Self {
        match data {
            0x00 => CollectionType::Physical,
            0x01 => CollectionType::Application,
            0x02 => CollectionType::Logical,
            0x03 => CollectionType::Report,
            0x04 => CollectionType::NamedArray,
            0x05 => CollectionType::UsageSwitch,
            0x06 => CollectionType::UsageModifier,
            other => CollectionType::Other(other),
        }
    }
}

/// Flag bits of the `Input`/`Output`/`Feature` main-item data.
pub mod element_flags {
    /// Constant (padding) rather than data.
    pub const CONSTANT: u32 = 1 << 0;
    /// Variable field rather than an array of selectors.
    pub const VARIABLE: u32 = 1 << 1;
    /// Relative rather than absolute values.
    pub const RELATIVE: u32 = 1 << 2;
    /// Values wrap around at the logical extremes.
    pub const WRAP: u32 = 1 << 3;
    /// Non-linear sensor mapping.
    pub const NON_LINEAR: u32 = 1 << 4;
    /// No preferred (resting) state.
    pub const NO_PREFERRED: u32 = 1 << 5;
    /// Has a null state outside the logical range.
    pub const NULL_STATE: u32 = 1 << 6;
    /// Output value may change without host involvement.
    pub const VOLATILE: u32 = 1 << 7;
    /// Fixed-size byte stream rather than a bitfield.
    pub const BUFFERED_BYTES: u32 = 1 << 8;
}

/// One data field inside a report: its usage, position and value range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    /// Usage page the element's usage lives on.
    pub usage_page: u32,
    /// Usage within the page (16 bits).
    pub usage: u32,
    /// Which report stream the element belongs to.
    pub report_type: ReportType,
    /// Report the element is part of (1 when the device does not use IDs).
    pub report_id: u32,
    /// Bit position within the report.
    pub report_offset_in_bits: u32,
    /// Width of the field.
    pub report_size_in_bits: u32,
    /// Main-item flag bits, see [`element_flags`].
    pub flags: u32,
    /// Smallest logical value.
    pub logical_min: i32,
    /// Largest logical value.
    pub logical_max: i32,
    /// Smallest physical value (falls back to the logical range).
    pub physical_min: i32,
    /// Largest physical value (falls back to the logical range).
    pub physical_max: i32,
    /// Unit code.
    pub unit: u32,
    /// Decimal exponent applied to the unit.
    pub unit_exponent: i32,
}

impl ElementDescriptor {
    /// Whether the element is constant padding.
    pub fn is_constant(&self) -> bool {
        self.flags & element_flags::CONSTANT != 0
    }

    /// Whether the element is a variable field (as opposed to an array of
    /// selectors).
    pub fn is_variable(&self) -> bool {
        self.flags & element_flags::VARIABLE != 0
    }

    /// Whether the element reports relative motion.
    pub fn is_relative(&self) -> bool {
        self.flags & element_flags::RELATIVE != 0
    }

    /// First bit past the element.
    pub fn end_bit(&self) -> u32 {
        self.report_offset_in_bits + self.report_size_in_bits
    }
}

/// One node of the descriptor's collection tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    /// Kind of grouping.
    pub collection_type: CollectionType,
    /// Usage page of the collection's usage.
    pub usage_page: u32,
    /// Usage naming the collection.
    pub usage: u32,
    /// Index of the enclosing collection, `None` at top level.
    pub parent: Option<usize>,
    /// Index of the first element emitted inside this collection.
    pub first_child: usize,
    /// Number of elements emitted while the collection was open.
    pub child_count: usize,
}

/// A device's full parsed HID description.
///
/// Created once per physical device by the parser and immutable thereafter;
/// owned by the device catalog and referenced, never duplicated, by state
/// lookups. Round-trips through JSON for caching across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// USB vendor id, zero when unknown.
    #[serde(default)]
    pub vendor_id: u16,
    /// USB product id, zero when unknown.
    #[serde(default)]
    pub product_id: u16,
    /// Usage page of the device's top-level application collection.
    #[serde(default)]
    pub usage_page: u32,
    /// Usage of the device's top-level application collection.
    #[serde(default)]
    pub usage: u32,
    /// Every data field of every report, in descriptor order.
    #[serde(default)]
    pub elements: Vec<ElementDescriptor>,
    /// The collection tree, in descriptor order.
    #[serde(default)]
    pub collections: Vec<CollectionDescriptor>,
}

impl DeviceDescriptor {
    /// Total size in bits of one report, including the leading report-ID
    /// byte when the device uses report IDs.
    pub fn report_size_in_bits(&self, report_id: u32, report_type: ReportType) -> u32 {
        self.elements
            .iter()
            .filter(|e| e.report_id == report_id && e.report_type == report_type)
            .map(ElementDescriptor::end_bit)
            .max()
            .unwrap_or(0)
    }

    /// Elements of one `(report_id, report_type)` group, in bit order.
    pub fn report_elements(
        &self,
        report_id: u32,
        report_type: ReportType,
    ) -> impl Iterator<Item = &ElementDescriptor> {
        self.elements
            .iter()
            .filter(move |e| e.report_id == report_id && e.report_type == report_type)
    }

    /// The children of a collection node.
    pub fn collection_children(
        &self,
        collection: &CollectionDescriptor,
    ) -> &[ElementDescriptor] {
        self.elements
            .get(collection.first_child..collection.first_child + collection.child_count)
            .unwrap_or(&[])
    }
}
