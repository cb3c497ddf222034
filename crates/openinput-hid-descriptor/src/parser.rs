//! The single-pass report-descriptor state machine.

use crate::descriptor::{
    CollectionDescriptor, CollectionType, DeviceDescriptor, ElementDescriptor, ReportType,
};
use crate::error::ParseError;

// Item type-and-tag bytes with the low two size bits masked off.
mod item {
    pub const INPUT: u8 = 0x80;
    pub const OUTPUT: u8 = 0x90;
    pub const FEATURE: u8 = 0xB0;
    pub const COLLECTION: u8 = 0xA0;
    pub const END_COLLECTION: u8 = 0xC0;
    pub const USAGE_PAGE: u8 = 0x04;
    pub const LOGICAL_MINIMUM: u8 = 0x14;
    pub const LOGICAL_MAXIMUM: u8 = 0x24;
    pub const PHYSICAL_MINIMUM: u8 = 0x34;
    pub const PHYSICAL_MAXIMUM: u8 = 0x44;
    pub const UNIT_EXPONENT: u8 = 0x54;
    pub const UNIT: u8 = 0x64;
    pub const REPORT_SIZE: u8 = 0x74;
    pub const REPORT_ID: u8 = 0x84;
    pub const REPORT_COUNT: u8 = 0x94;
    pub const USAGE: u8 = 0x08;
    pub const USAGE_MINIMUM: u8 = 0x18;
    pub const USAGE_MAXIMUM: u8 = 0x28;
}

const LONG_ITEM_PREFIX: u8 = 0xFE;

// State that applies only to the next main item and is reset after each one.
// `Usage` may repeat to build an ordered list consumed index-by-index when a
// main item emits multiple elements.
#[derive(Default)]
struct LocalItemState {
    usage: Option<u32>,
    usage_list: Vec<u32>,
    usage_minimum: Option<u32>,
    usage_maximum: Option<u32>,
}

impl LocalItemState {
    fn set_usage(&mut self, value: u32) {
        if let Some(previous) = self.usage {
            self.usage_list.push(previous);
        }
        self.usage = Some(value);
    }

    // Usage for the Nth element emitted by one main item.
    fn usage_for_index(&self, index: u32) -> u32 {
        if let (Some(min), Some(max)) = (self.usage_minimum, self.usage_maximum) {
            if max < min {
                return 0;
            }
            let range = max - min;
            if index >= range {
                return max;
            }
            return min + index;
        }
        if !self.usage_list.is_empty() {
            if let Some(&listed) = self.usage_list.get(index as usize) {
                return listed;
            }
            return self.usage.unwrap_or(0);
        }
        self.usage.unwrap_or(0)
    }

    // Wipe, preserving the list allocation.
    fn reset(&mut self) {
        self.usage = None;
        self.usage_minimum = None;
        self.usage_maximum = None;
        self.usage_list.clear();
    }
}

// State that persists from main item to main item until overwritten.
#[derive(Default)]
struct GlobalItemState {
    usage_page: Option<u32>,
    logical_minimum: Option<i32>,
    logical_maximum: Option<i32>,
    physical_minimum: Option<i32>,
    physical_maximum: Option<i32>,
    unit_exponent: Option<i32>,
    unit: Option<u32>,
    report_size: Option<u32>,
    report_count: Option<u32>,
    report_id: Option<u32>,
}

impl GlobalItemState {
    // When no usage page is set, the element's page is the high half of its
    // extended usage.
    fn usage_page_for(&self, index: u32, local: &LocalItemState) -> u32 {
        match self.usage_page {
            Some(page) => page,
            None => local.usage_for_index(index) >> 16,
        }
    }

    // The physical range falls back to the logical range when absent or
    // all-zero.
    fn physical_min(&self) -> i32 {
        match (self.physical_minimum, self.physical_maximum) {
            (Some(min), Some(max)) if min != 0 || max != 0 => min,
            _ => self.logical_minimum.unwrap_or(0),
        }
    }

    fn physical_max(&self) -> i32 {
        match (self.physical_minimum, self.physical_maximum) {
            (Some(min), Some(max)) if min != 0 || max != 0 => max,
            _ => self.logical_maximum.unwrap_or(0),
        }
    }
}

// Running bit cursor of one (report id, report type) group.
struct ReportCursor {
    report_id: u32,
    report_type: ReportType,
    bit_offset: u32,
}

fn cursor_index(
    cursors: &mut Vec<ReportCursor>,
    report_id: u32,
    report_type: ReportType,
) -> usize {
    if let Some(index) = cursors
        .iter()
        .position(|c| c.report_id == report_id && c.report_type == report_type)
    {
        return index;
    }
    cursors.push(ReportCursor {
        report_id,
        report_type,
        bit_offset: 0,
    });
    cursors.len() - 1
}

// Item data is an unsigned little-endian integer; reads past the buffer end
// degrade to zero. No sign extension is performed for 1- and 2-byte data:
// cached descriptors depend on the historical unsigned readings.
fn read_item_data(bytes: &[u8], offset: usize, size_code: u8) -> u32 {
    let take = |count: usize| -> u32 {
        let Some(data) = bytes.get(offset..offset + count) else {
            return 0;
        };
        let mut value = 0u32;
        for (i, byte) in data.iter().enumerate() {
            value |= u32::from(*byte) << (8 * i);
        }
        value
    };
    match size_code {
        0 => 0,
        1 => take(1),
        2 => take(2),
        // Size code 3 means four data bytes, not three.
        _ => take(4),
    }
}

const fn item_data_len(size_code: u8) -> usize {
    match size_code {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => 4,
    }
}

/// Parse a binary HID report descriptor into a fresh [`DeviceDescriptor`].
///
/// Vendor and product ids are not part of the report descriptor and are left
/// zero for the caller to fill in from the transport.
///
/// # Errors
///
/// [`ParseError`] on an unbalanced `EndCollection` or a long item; every
/// other malformation degrades (unknown items are skipped by their declared
/// size, truncated data reads as zero).
pub fn parse_report_descriptor(bytes: &[u8]) -> Result<DeviceDescriptor, ParseError> {
    let mut descriptor = DeviceDescriptor::default();
    parse_report_descriptor_into(bytes, &mut descriptor)?;
    Ok(descriptor)
}

/// Parse a binary HID report descriptor, appending elements and collections
/// to an existing descriptor (which typically already carries the vendor and
/// product ids from the transport).
///
/// # Errors
///
/// As [`parse_report_descriptor`]. On error the descriptor is left
/// unmodified.
pub fn parse_report_descriptor_into(
    bytes: &[u8],
    descriptor: &mut DeviceDescriptor,
) -> Result<(), ParseError> {
    let mut local = LocalItemState::default();
    let mut global = GlobalItemState::default();

    let mut elements: Vec<ElementDescriptor> = Vec::new();
    let mut collections: Vec<CollectionDescriptor> = Vec::new();
    let mut cursors: Vec<ReportCursor> = Vec::new();
    let mut current_collection: Option<usize> = None;

    let mut offset = 0usize;
    while offset < bytes.len() {
        let item_offset = offset;
        let first_byte = bytes[offset];
        if first_byte == LONG_ITEM_PREFIX {
            return Err(ParseError::LongItem {
                offset: item_offset,
            });
        }
        let size_code = first_byte & 0x03;
        let type_and_tag = first_byte & 0xFC;
        offset += 1;

        let data = read_item_data(bytes, offset, size_code);

        match type_and_tag {
            // Global items persist until overwritten or the parse ends.
            item::USAGE_PAGE => global.usage_page = Some(data),
            item::REPORT_COUNT => global.report_count = Some(data),
            item::REPORT_SIZE => global.report_size = Some(data),
            item::REPORT_ID => global.report_id = Some(data),
            item::LOGICAL_MINIMUM => global.logical_minimum = Some(data as i32),
            item::LOGICAL_MAXIMUM => global.logical_maximum = Some(data as i32),
            item::PHYSICAL_MINIMUM => global.physical_minimum = Some(data as i32),
            item::PHYSICAL_MAXIMUM => global.physical_maximum = Some(data as i32),
            item::UNIT_EXPONENT => global.unit_exponent = Some(data as i32),
            item::UNIT => global.unit = Some(data),

            // Local items apply to the next main item only.
            item::USAGE => local.set_usage(data),
            item::USAGE_MINIMUM => local.usage_minimum = Some(data),
            item::USAGE_MAXIMUM => local.usage_maximum = Some(data),

            item::COLLECTION => {
                let parent = current_collection;
                current_collection = Some(collections.len());
                collections.push(CollectionDescriptor {
                    collection_type: CollectionType::from_data(data),
                    parent,
                    usage_page: global.usage_page_for(0, &local),
                    usage: local.usage_for_index(0),
                    first_child: elements.len(),
                    child_count: 0,
                });
                local.reset();
            }

            item::END_COLLECTION => {
                let Some(index) = current_collection else {
                    return Err(ParseError::UnbalancedEndCollection {
                        offset: item_offset,
                    });
                };
                collections[index].child_count = elements.len() - collections[index].first_child;
                current_collection = collections[index].parent;
                local.reset();
            }

            item::INPUT | item::OUTPUT | item::FEATURE => {
                let report_type = match type_and_tag {
                    item::INPUT => ReportType::Input,
                    item::OUTPUT => ReportType::Output,
                    _ => ReportType::Feature,
                };

                let report_id = global.report_id.unwrap_or(1);
                let cursor = cursor_index(&mut cursors, report_id, report_type);

                // With report IDs in play, every report starts with the
                // one-byte ID; reserve it before the first element.
                if cursors[cursor].bit_offset == 0 && global.report_id.is_some() {
                    cursors[cursor].bit_offset = 8;
                }

                let report_count = global.report_count.unwrap_or(1);
                let report_size = global.report_size.unwrap_or(8);
                for i in 0..report_count {
                    elements.push(ElementDescriptor {
                        // Mask off the page half of extended usages.
                        usage: local.usage_for_index(i) & 0xFFFF,
                        usage_page: global.usage_page_for(i, &local),
                        report_type,
                        report_id,
                        report_offset_in_bits: cursors[cursor].bit_offset,
                        report_size_in_bits: report_size,
                        flags: data,
                        logical_min: global.logical_minimum.unwrap_or(0),
                        logical_max: global.logical_maximum.unwrap_or(0),
                        physical_min: global.physical_min(),
                        physical_max: global.physical_max(),
                        unit: global.unit.unwrap_or(0),
                        unit_exponent: global.unit_exponent.unwrap_or(0),
                    });
                    cursors[cursor].bit_offset += report_size;
                }
                local.reset();
            }

            // Unknown items are skipped by their declared size.
            _ => {}
        }

        offset += item_data_len(size_code);
    }

    descriptor.elements.append(&mut elements);
    descriptor.collections.append(&mut collections);

    // The device-level usage is that of the outermost application collection.
    for collection in &descriptor.collections {
        if collection.parent.is_none()
            && collection.collection_type == CollectionType::Application
        {
            descriptor.usage = collection.usage;
            descriptor.usage_page = collection.usage_page;
            break;
        }
    }

    Ok(())
}
