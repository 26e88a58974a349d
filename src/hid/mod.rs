//! HID report model: the packed gamepad input report and the report map
//! that describes it to the host.

pub mod descriptor;
pub mod report;


pub use descriptor::{DescriptorSummary, GAMEPAD_REPORT_DESCRIPTOR, HID_INFORMATION};
pub use report::{
    neutral_report, Axis, Button, ExtraButton, GamepadReport, AXIS_CENTER, DPAD_NEUTRAL,
    GAMEPAD_REPORT_SIZE, TRIGGER_FULL,
};
