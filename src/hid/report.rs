//! Gamepad input report (report ID 3).
//!
//! Layout (10 bytes, bit 0 = least significant bit):
//! ```text
//! Byte 0:    bits 0-3 hat switch (0-7 = N..NW clockwise, 0xF = centred)
//!            bits 4-7 constant 0
//! Byte 1:    capture, assistant, l2, r2, stadia, menu, options, r3
//! Byte 2:    l3, r1, l1, y, x, b, a, padding
//! Byte 3-6:  lx, ly, rx, ry       (0x80 = centred)
//! Byte 7-8:  l2_axis, r2_axis     (brake / accelerator)
//! Byte 9:    extra buttons        (volume up, volume down, play/pause)
//! ```
//!
//! The report is kept as its wire bytes and fields are packed and unpacked
//! explicitly, so equality is exact byte equality.

use crate::config::REPORT_SIZE;

/// Gamepad report size in bytes.
pub const GAMEPAD_REPORT_SIZE: usize = REPORT_SIZE;

/// Hat-switch value meaning "no direction".
pub const DPAD_NEUTRAL: u8 = 0x0F;

/// Resting value of every stick axis.
pub const AXIS_CENTER: u8 = 0x80;

/// Trigger axis value while the (digital) trigger is held.
pub const TRIGGER_FULL: u8 = 0xFF;

const DPAD_BYTE: usize = 0;
const BUTTONS_BYTE: usize = 1;
const EXTRA_BYTE: usize = 9;

/// The 15 single-bit buttons, numbered by their bit in bytes 1-2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Button {
    Capture = 0,
    Assistant = 1,
    L2 = 2,
    R2 = 3,
    Stadia = 4,
    Menu = 5,
    Options = 6,
    R3 = 7,
    L3 = 8,
    R1 = 9,
    L1 = 10,
    Y = 11,
    X = 12,
    B = 13,
    A = 14,
}

impl Button {
    pub const ALL: [Button; 15] = [
        Button::Capture,
        Button::Assistant,
        Button::L2,
        Button::R2,
        Button::Stadia,
        Button::Menu,
        Button::Options,
        Button::R3,
        Button::L3,
        Button::R1,
        Button::L1,
        Button::Y,
        Button::X,
        Button::B,
        Button::A,
    ];

    const fn mask(self) -> u16 {
        1 << (self as u8)
    }
}

/// The six 8-bit axes, numbered by their byte offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Axis {
    LeftX = 3,
    LeftY = 4,
    RightX = 5,
    RightY = 6,
    /// Left trigger (HID "Brake").
    L2 = 7,
    /// Right trigger (HID "Accelerator").
    R2 = 8,
}

/// Bits of the extra-buttons byte (consumer page usages).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ExtraButton {
    VolumeUp = 0,
    VolumeDown = 1,
    PlayPause = 2,
}

/// Packed gamepad input report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GamepadReport {
    bytes: [u8; GAMEPAD_REPORT_SIZE],
}

impl Default for GamepadReport {
    fn default() -> Self {
        Self::neutral()
    }
}

impl GamepadReport {
    /// Idle report: nothing pressed, sticks centred, triggers released,
    /// hat centred.
    pub const fn neutral() -> Self {
        Self {
            bytes: [
                DPAD_NEUTRAL,
                0x00,
                0x00,
                AXIS_CENTER,
                AXIS_CENTER,
                AXIS_CENTER,
                AXIS_CENTER,
                0x00,
                0x00,
                0x00,
            ],
        }
    }

    /// Wrap raw report bytes (without the report ID).
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < GAMEPAD_REPORT_SIZE {
            return None;
        }
        let mut bytes = [0u8; GAMEPAD_REPORT_SIZE];
        bytes.copy_from_slice(&data[..GAMEPAD_REPORT_SIZE]);
        Some(Self { bytes })
    }

    /// Wire bytes as sent on the input report characteristic.
    pub const fn as_bytes(&self) -> &[u8; GAMEPAD_REPORT_SIZE] {
        &self.bytes
    }

    /// Serialise into a byte slice.
    /// Returns the number of bytes written (0 if `buf` is too small).
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        if buf.len() < GAMEPAD_REPORT_SIZE {
            return 0;
        }
        buf[..GAMEPAD_REPORT_SIZE].copy_from_slice(&self.bytes);
        GAMEPAD_REPORT_SIZE
    }

    /// Hat-switch nibble.
    pub fn dpad(&self) -> u8 {
        self.bytes[DPAD_BYTE] & 0x0F
    }

    /// Set the hat-switch nibble; only the low 4 bits of `code` are used.
    pub fn set_dpad(&mut self, code: u8) {
        self.bytes[DPAD_BYTE] = (self.bytes[DPAD_BYTE] & 0xF0) | (code & 0x0F);
    }

    /// All 16 button-field bits (15 buttons + padding), little-endian.
    pub fn buttons(&self) -> u16 {
        u16::from_le_bytes([self.bytes[BUTTONS_BYTE], self.bytes[BUTTONS_BYTE + 1]])
    }

    fn set_buttons(&mut self, bits: u16) {
        let [lo, hi] = bits.to_le_bytes();
        self.bytes[BUTTONS_BYTE] = lo;
        self.bytes[BUTTONS_BYTE + 1] = hi;
    }

    pub fn button(&self, button: Button) -> bool {
        self.buttons() & button.mask() != 0
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        let bits = self.buttons();
        let bits = if pressed {
            bits | button.mask()
        } else {
            bits & !button.mask()
        };
        self.set_buttons(bits);
    }

    pub fn axis(&self, axis: Axis) -> u8 {
        self.bytes[axis as usize]
    }

    pub fn set_axis(&mut self, axis: Axis, value: u8) {
        self.bytes[axis as usize] = value;
    }

    pub fn extra_buttons(&self) -> u8 {
        self.bytes[EXTRA_BYTE]
    }

    pub fn set_extra_buttons(&mut self, bits: u8) {
        self.bytes[EXTRA_BYTE] = bits;
    }

    pub fn extra_button(&self, button: ExtraButton) -> bool {
        self.bytes[EXTRA_BYTE] & (1 << button as u8) != 0
    }

    /// Returns `true` if this is exactly the idle report.
    pub fn is_neutral(&self) -> bool {
        *self == Self::neutral()
    }
}

/// Canonical idle report.
pub const fn neutral_report() -> GamepadReport {
    GamepadReport::neutral()
}
