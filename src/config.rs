//! Application-wide constants and compile-time configuration.
//!
//! All hardware pin assignments, timing parameters, and protocol
//! constants live here so they can be tuned in one place.

// HID report

/// Report ID of the gamepad input report (prefixed by the HID service,
/// not part of the payload).
pub const REPORT_ID: u8 = 3;

/// Size of the gamepad input report payload in bytes.
pub const REPORT_SIZE: usize = 10;

/// Number of reports the outbound queue can hold before dropping.
pub const REPORT_QUEUE_CAPACITY: usize = 10;

/// Number of lifecycle events that can be pending for the lifecycle task.
pub const EVENT_QUEUE_CAPACITY: usize = 8;

// Timing

/// Input sampling period (ms).
pub const POLL_INTERVAL_MS: u64 = 1;

/// Sleep timeout while advertising / after boot (ms).
pub const DISCONNECTED_SLEEP_TIMEOUT_MS: u64 = 60_000;

/// Sleep timeout while connected, re-armed on every report sent (ms).
pub const CONNECTED_SLEEP_TIMEOUT_MS: u64 = 600_000;

/// System button hold time that clears all bonds (ms).
pub const SYS_BUTTON_LONG_PRESS_MS: u64 = 3_000;

/// System button hold time that reboots into the bootloader (ms).
pub const SYS_BUTTON_VERY_LONG_PRESS_MS: u64 = 10_000;

// BLE

/// Complete local name put in the advertising payload and GAP name.
pub const DEVICE_NAME: &str = "BLE Gamepad";

/// GAP appearance: HID Gamepad.
pub const DEVICE_APPEARANCE: u16 = 0x03C4;

/// Whether the first advertising round after boot is directed at the
/// most recent bond. Every restart after a disconnect is non-directed.
pub const DIRECTED_ADVERTISING_ON_BOOT: bool = false;

/// Bonding identity the firmware uses (the SoftDevice default identity).
pub const BOND_IDENTITY: u8 = 0;

/// Advertising interval for undirected advertising (in 0.625 ms units).
/// 48 = 30 ms.
pub const BLE_ADV_INTERVAL: u32 = 48;

/// BLE connection interval range (in 1.25 ms units).
/// 6 = 7.5 ms (lowest latency for HID).
pub const BLE_CONN_INTERVAL_MIN: u16 = 6;
pub const BLE_CONN_INTERVAL_MAX: u16 = 12;

/// BLE slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// BLE supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

// Power

/// GPREGRET value the Adafruit nRF52 bootloader treats as "enter DFU".
pub const BOOTLOADER_DFU_MAGIC: u8 = 0x57;

// Bond storage

/// Maximum number of bonds kept in flash.
pub const MAX_BONDS: usize = 4;

/// Flash page index where bond storage starts (4 KB per page on nRF52840).
pub const STORAGE_FLASH_PAGE_START: u32 = 240;

/// Number of flash pages reserved for bond storage.
pub const STORAGE_FLASH_PAGE_COUNT: u32 = 4;

// GPIO

/// Number of physical inputs wired to the controller board.
pub const BUTTON_COUNT: usize = 18;

/// Which physical input feeds which report field.
///
/// Indices refer to the order pins are handed to the sampler (see
/// `main.rs`). The d-pad entries are the four bits of the lookup index,
/// least significant first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinLayout {
    /// The system button: reported as `menu` and tracked for long presses.
    pub system: usize,
    pub options: usize,
    pub stadia: usize,
    pub capture: usize,
    pub l3: usize,
    pub r3: usize,
    pub dpad: [usize; 4],
    pub x: usize,
    pub y: usize,
    pub r1: usize,
    pub l1: usize,
    pub a: usize,
    pub b: usize,
    pub r2: usize,
    pub l2: usize,
}

/// Wiring of the reference board.
//
//   0 MENU (system)   1 OPTIONS   2 STADIA   3 CAPTURE
//   4 L3              5 R3        6/8/9/7 D-PAD
//  10 X              11 Y        12 R1      13 L1
//  14 A              15 B        16 R2      17 L2
pub const DEFAULT_PIN_LAYOUT: PinLayout = PinLayout {
    system: 0,
    options: 1,
    stadia: 2,
    capture: 3,
    l3: 4,
    r3: 5,
    dpad: [6, 8, 9, 7],
    x: 10,
    y: 11,
    r1: 12,
    l1: 13,
    a: 14,
    b: 15,
    r2: 16,
    l2: 17,
};

/// Runtime knobs of the lifecycle state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LifecycleConfig {
    pub connected_sleep_timeout_ms: u64,
    pub disconnected_sleep_timeout_ms: u64,
    pub directed_on_boot: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            connected_sleep_timeout_ms: CONNECTED_SLEEP_TIMEOUT_MS,
            disconnected_sleep_timeout_ms: DISCONNECTED_SLEEP_TIMEOUT_MS,
            directed_on_boot: DIRECTED_ADVERTISING_ON_BOOT,
        }
    }
}
