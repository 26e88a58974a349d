//! Core logic of the BLE gamepad firmware.
//!
//! Everything here is hardware independent and builds for the host, so it
//! is covered by `cargo test`. Time is passed in explicitly as
//! milliseconds since boot.
//!
//! The nRF52840 binding (SoftDevice, GPIO, flash) lives in the binary
//! (`src/main.rs`, feature `embedded`) and drives these modules:
//!
//! - [`input::Sampler`] turns pin levels into [`hid::GamepadReport`]s,
//! - [`queue::ReportQueue`] carries them to the sender,
//! - [`lifecycle::Device`] owns advertising, the connection and the sleep
//!   deadline, talking to the stack through [`lifecycle::Transport`].

#![cfg_attr(not(test), no_std)]

// Must stay first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod advertising;
pub mod bonds;
pub mod config;
pub mod error;
pub mod hid;
pub mod input;
pub mod lifecycle;
pub mod power_logic;
pub mod queue;

pub use error::{BleError, Error};
pub use hid::{GamepadReport, GAMEPAD_REPORT_DESCRIPTOR};
pub use input::{Sampler, TickOutcome};
pub use lifecycle::{ConnHandle, Device, Event, LinkState, Transport};
pub use power_logic::{classify_hold, SleepTimer, SystemAction};
pub use queue::ReportQueue;
