//! HID report map for the gamepad and a small descriptor walker.
//!
//! The report map is what the HID service exposes on the Report Map
//! characteristic; the host builds its parser from it, so it must agree
//! bit-for-bit with the packed layout in [`super::report`].
//!
//! ## HID Report Descriptor Structure
//!
//! A Report Descriptor is a sequence of items. Each item starts with a
//! prefix byte: bits 0-1 data size (0, 1, 2 or 4 bytes), bits 2-3 item
//! type (main / global / local) and bits 4-7 the tag.
//!
//! The walker below only understands what is needed to check our own
//! descriptor: Report ID, Report Size, Report Count, Usage Page, Usage and
//! Input. Push/Pop and Delimiter items are ignored.

use crate::config::REPORT_ID;

/// Report map registered with the HID service.
pub const GAMEPAD_REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x05, // Usage (Game Pad)
    0xA1, 0x01, // Collection (Application)
    0x85, REPORT_ID, //   Report ID (3)
    //
    //   - Hat switch (4 bits + 4 padding) -
    0x05, 0x01, //   Usage Page (Generic Desktop)
    0x75, 0x04, //   Report Size (4)
    0x95, 0x01, //   Report Count (1)
    0x25, 0x07, //   Logical Maximum (7)
    0x46, 0x3B, 0x01, // Physical Maximum (315)
    0x65, 0x14, //   Unit (English Rotation, degrees)
    0x09, 0x39, //   Usage (Hat switch)
    0x81, 0x42, //   Input (Data, Variable, Absolute, Null State)
    0x45, 0x00, //   Physical Maximum (0)
    0x65, 0x00, //   Unit (None)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x04, //   Report Count (4)
    0x81, 0x01, //   Input (Constant) - padding
    //
    //   - 15 buttons + 1 padding bit -
    0x05, 0x09, //   Usage Page (Button)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x0F, //   Report Count (15)
    0x09, 0x12, //   Usage (Button 18)  capture
    0x09, 0x11, //   Usage (Button 17)  assistant
    0x09, 0x14, //   Usage (Button 20)  l2
    0x09, 0x13, //   Usage (Button 19)  r2
    0x09, 0x0D, //   Usage (Button 13)  stadia
    0x09, 0x0C, //   Usage (Button 12)  menu
    0x09, 0x0B, //   Usage (Button 11)  options
    0x09, 0x0F, //   Usage (Button 15)  r3
    0x09, 0x0E, //   Usage (Button 14)  l3
    0x09, 0x08, //   Usage (Button 8)   r1
    0x09, 0x07, //   Usage (Button 7)   l1
    0x09, 0x05, //   Usage (Button 5)   y
    0x09, 0x04, //   Usage (Button 4)   x
    0x09, 0x02, //   Usage (Button 2)   b
    0x09, 0x01, //   Usage (Button 1)   a
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x01, //   Report Count (1)
    0x81, 0x01, //   Input (Constant) - padding
    //
    //   - Sticks -
    0x05, 0x01, //   Usage Page (Generic Desktop)
    0x15, 0x01, //   Logical Minimum (1)
    0x26, 0xFF, 0x00, // Logical Maximum (255)
    0x09, 0x01, //   Usage (Pointer)
    0xA1, 0x00, //   Collection (Physical)
    0x09, 0x30, //     Usage (X)
    0x09, 0x31, //     Usage (Y)
    0x75, 0x08, //     Report Size (8)
    0x95, 0x02, //     Report Count (2)
    0x81, 0x02, //     Input (Data, Variable, Absolute)
    0xC0, //   End Collection
    0x09, 0x01, //   Usage (Pointer)
    0xA1, 0x00, //   Collection (Physical)
    0x09, 0x32, //     Usage (Z)
    0x09, 0x35, //     Usage (Rz)
    0x75, 0x08, //     Report Size (8)
    0x95, 0x02, //     Report Count (2)
    0x81, 0x02, //     Input (Data, Variable, Absolute)
    0xC0, //   End Collection
    //
    //   - Triggers -
    0x05, 0x02, //   Usage Page (Simulation Controls)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x02, //   Report Count (2)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, // Logical Maximum (255)
    0x09, 0xC5, //   Usage (Brake)
    0x09, 0xC4, //   Usage (Accelerator)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    //   - Extra buttons (consumer page) -
    0x05, 0x0C, //   Usage Page (Consumer)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x09, 0xE9, //   Usage (Volume Increment)
    0x09, 0xEA, //   Usage (Volume Decrement)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x02, //   Report Count (2)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x09, 0xCD, //   Usage (Play/Pause)
    0x95, 0x01, //   Report Count (1)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x95, 0x05, //   Report Count (5)
    0x81, 0x01, //   Input (Constant) - padding
    //
    0xC0, // End Collection
];

/// Length of [`GAMEPAD_REPORT_DESCRIPTOR`], for fixed-size GATT values.
pub const GAMEPAD_REPORT_DESCRIPTOR_LEN: usize = GAMEPAD_REPORT_DESCRIPTOR.len();

/// The report map as an array, for characteristics sized at compile time.
pub const GAMEPAD_REPORT_MAP: [u8; GAMEPAD_REPORT_DESCRIPTOR_LEN] = {
    let mut out = [0u8; GAMEPAD_REPORT_DESCRIPTOR_LEN];
    let mut i = 0;
    while i < GAMEPAD_REPORT_DESCRIPTOR_LEN {
        out[i] = GAMEPAD_REPORT_DESCRIPTOR[i];
        i += 1;
    }
    out
};

/// HID Information characteristic value:
/// bcdHID 1.01, country code 0, flags RemoteWake | NormallyConnectable.
pub const HID_INFORMATION: [u8; 4] = [0x01, 0x01, 0x00, 0x03];

const USAGE_PAGE_GENERIC_DESKTOP: u16 = 0x01;
const USAGE_PAGE_BUTTON: u16 = 0x09;
const USAGE_HAT_SWITCH: u16 = 0x39;

/// What a report map declares for one input report ID.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DescriptorSummary {
    /// Total input bits (data and constant) for the report ID.
    pub input_bits: u16,
    /// Number of 1-bit data fields on the Button usage page.
    pub button_count: u16,
    /// Whether a hat switch with a null state is declared.
    pub has_hat_switch: bool,
}

impl DescriptorSummary {
    /// Input report size in whole bytes (payload only, no report ID).
    pub fn input_bytes(&self) -> usize {
        (self.input_bits as usize).div_ceil(8)
    }

    /// Walk `data` and summarise the input items belonging to `report_id`.
    ///
    /// Returns `None` if the descriptor never declares that report ID or
    /// ends in the middle of an item.
    pub fn parse(data: &[u8], report_id: u8) -> Option<Self> {
        let mut summary = DescriptorSummary::default();
        let mut seen_id = false;

        // Parser state.
        let mut usage_page: u16 = 0;
        let mut usage: u16 = 0;
        let mut current_id: u8 = 0;
        let mut report_size: u16 = 0;
        let mut report_count: u16 = 0;

        let mut i = 0;
        while i < data.len() {
            let prefix = data[i];
            let tag = (prefix >> 4) & 0x0F;
            let item_type = (prefix >> 2) & 0x03;
            let size = match prefix & 0x03 {
                0 => 0,
                1 => 1,
                2 => 2,
                _ => 4,
            };

            if i + 1 + size > data.len() {
                return None;
            }

            let value: u32 = match size {
                0 => 0,
                1 => data[i + 1] as u32,
                2 => u16::from_le_bytes([data[i + 1], data[i + 2]]) as u32,
                _ => u32::from_le_bytes([data[i + 1], data[i + 2], data[i + 3], data[i + 4]]),
            };

            match item_type {
                // Main items
                0 => {
                    // Input
                    if tag == 0x08 && current_id == report_id {
                        let is_constant = value & 0x01 != 0;
                        let has_null_state = value & 0x40 != 0;
                        summary.input_bits += report_size * report_count;

                        if !is_constant {
                            if usage_page == USAGE_PAGE_BUTTON && report_size == 1 {
                                summary.button_count += report_count;
                            }
                            if usage_page == USAGE_PAGE_GENERIC_DESKTOP
                                && usage == USAGE_HAT_SWITCH
                                && has_null_state
                            {
                                summary.has_hat_switch = true;
                            }
                        }
                    }
                }
                // Global items
                1 => match tag {
                    // Usage Page
                    0x00 => usage_page = value as u16,
                    // Report ID
                    0x08 => {
                        current_id = value as u8;
                        if current_id == report_id {
                            seen_id = true;
                        }
                    }
                    // Report Size
                    0x07 => report_size = value as u16,
                    // Report Count
                    0x09 => report_count = value as u16,
                    _ => {}
                },
                // Local items
                2 => {
                    if tag == 0x00 {
                        usage = value as u16;
                    }
                }
                _ => {}
            }

            i += 1 + size;
        }

        if seen_id {
            Some(summary)
        } else {
            debug!("HID descriptor: report id {} not declared", report_id);
            None
        }
    }
}
