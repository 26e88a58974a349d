//! GPIO button inputs.
//!
//! All 18 inputs are active-low with internal pull-ups. They are sampled
//! by the 1 ms poll loop, which acts as the debounce, so no edge
//! interrupts are used here.

use ble_gamepad::config::BUTTON_COUNT;
use ble_gamepad::input::PinLevels;
use embassy_nrf::gpio::{AnyPin, Input, Pull};

pub struct Buttons {
    inputs: [Input<'static>; BUTTON_COUNT],
}

impl Buttons {
    /// Configure the pins in sampler order (see `DEFAULT_PIN_LAYOUT`).
    pub fn new(pins: [AnyPin; BUTTON_COUNT]) -> Self {
        Self {
            inputs: pins.map(|pin| Input::new(pin, Pull::Up)),
        }
    }

    /// Logical levels: `true` = pressed.
    pub fn read(&self) -> PinLevels {
        let mut levels = [false; BUTTON_COUNT];
        for (level, input) in levels.iter_mut().zip(self.inputs.iter()) {
            *level = input.is_low();
        }
        levels
    }
}
