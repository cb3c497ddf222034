//! Bridge from a parsed HID descriptor to a device control layout.

use openinput_hid_descriptor::{DeviceDescriptor, ElementDescriptor, ReportType};
use openinput_state_block::{StateBlock, format};
use openinput_state_store::ControlLayout;

// Negative logical minimums are stored as their unsigned item reading, so a
// signed element shows up either as an actually negative minimum (4-byte
// data) or as a "minimum" above the maximum (1- and 2-byte data).
fn is_signed(element: &ElementDescriptor) -> bool {
    element.logical_min < 0 || element.logical_min > element.logical_max
}

fn block_for(element: &ElementDescriptor) -> StateBlock {
    let offset = element.report_offset_in_bits;
    let size = element.report_size_in_bits;
    let byte_aligned = offset % 8 == 0;
    let signed = is_signed(element);

    let fmt = match (byte_aligned, size, signed) {
        (true, 8, false) => format::BYTE,
        (true, 8, true) => format::SBYTE,
        (true, 16, false) => format::USHORT,
        (true, 16, true) => format::SHORT,
        (true, 32, false) => format::UINT,
        (true, 32, true) => format::INT,
        (_, _, false) => format::BIT,
        (_, _, true) => format::SBIT,
    };

    if format::is_bitfield(fmt) {
        StateBlock::new(fmt, offset / 8, offset % 8, size)
    } else {
        StateBlock::new(fmt, offset / 8, 0, size)
    }
}

/// Derive the per-control state layout of a HID device's input report.
///
/// Walks the input elements of the descriptor's first input report,
/// skipping constant padding, and assigns each a [`StateBlock`] at the
/// element's bit position: 1-bit and unaligned fields become bitfields,
/// byte-aligned 8/16/32-bit fields become native integers (signed when the
/// logical range says so). Control ids are the element ordinals within the
/// report.
///
/// The report-ID byte, when present, is part of the element offsets, so the
/// resulting layout indexes the raw report bytes as delivered.
pub fn layout_from_descriptor(descriptor: &DeviceDescriptor) -> Vec<ControlLayout> {
    let Some(report_id) = descriptor
        .elements
        .iter()
        .find(|e| e.report_type == ReportType::Input)
        .map(|e| e.report_id)
    else {
        return Vec::new();
    };

    descriptor
        .report_elements(report_id, ReportType::Input)
        .filter(|e| !e.is_constant())
        .enumerate()
        .map(|(index, element)| ControlLayout {
            control_id: index as u32,
            block: block_for(element),
            noisy: false,
        })
        .collect()
}

/// Size in bytes of the device's first input report, report-ID byte
/// included.
pub fn input_state_size_in_bytes(descriptor: &DeviceDescriptor) -> u32 {
    let Some(report_id) = descriptor
        .elements
        .iter()
        .find(|e| e.report_type == ReportType::Input)
        .map(|e| e.report_id)
    else {
        return 0;
    };
    descriptor
        .report_size_in_bits(report_id, ReportType::Input)
        .div_ceil(8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openinput_hid_descriptor::parse_report_descriptor;

    const BOOT_MOUSE: &[u8] = &[
        0x05, 0x01, 0x09, 0x02, 0xA1, 0x01, 0x09, 0x01, 0xA1, 0x00, 0x05, 0x09, 0x19, 0x01,
        0x29, 0x03, 0x15, 0x00, 0x25, 0x01, 0x95, 0x03, 0x75, 0x01, 0x81, 0x02, 0x95, 0x01,
        0x75, 0x05, 0x81, 0x03, 0x05, 0x01, 0x09, 0x30, 0x09, 0x31, 0x09, 0x38, 0x15, 0x81,
        0x25, 0x7F, 0x75, 0x08, 0x95, 0x03, 0x81, 0x06, 0xC0, 0xC0,
    ];

    #[test]
    fn test_boot_mouse_layout() {
        let descriptor = parse_report_descriptor(BOOT_MOUSE).expect("parse");
        let layout = layout_from_descriptor(&descriptor);

        // Three buttons and three axes; the constant padding is skipped.
        assert_eq!(layout.len(), 6);

        for (i, control) in layout[..3].iter().enumerate() {
            assert_eq!(control.block.format, format::BIT);
            assert_eq!(control.block.byte_offset, 0);
            assert_eq!(control.block.bit_offset, i as u32);
            assert_eq!(control.block.size_in_bits, 1);
        }

        // X/Y/wheel: -127..127 stored unsigned flags them as signed bytes.
        for (i, control) in layout[3..].iter().enumerate() {
            assert_eq!(control.block.format, format::SBYTE);
            assert_eq!(control.block.byte_offset, 1 + i as u32);
            assert_eq!(control.block.bit_offset, 0);
        }

        assert_eq!(input_state_size_in_bytes(&descriptor), 4);
    }

    #[test]
    fn test_empty_descriptor_yields_empty_layout() {
        let descriptor = DeviceDescriptor::default();
        assert!(layout_from_descriptor(&descriptor).is_empty());
        assert_eq!(input_state_size_in_bytes(&descriptor), 0);
    }
}
