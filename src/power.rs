//! Power management: System OFF and the bootloader reset.
//!
//! nRF52840 power modes:
//! - System ON: normal operation, BLE active
//! - System OFF: deep sleep (~0.4 µA), only a GPIO DETECT wakes us, and
//!   waking is a full reset
//!
//! Both paths go through the SoftDevice since it owns the POWER peripheral.

use ble_gamepad::config::BOOTLOADER_DFU_MAGIC;
use defmt::{error, info};
use embassy_nrf::gpio::Output;
use embassy_nrf::pac;
use embassy_nrf::pac::gpio::vals;
use nrf_softdevice::raw;

/// What we need to shut the board down.
pub struct Shutdown {
    /// Active-low reset line of the I/O expander, asserted while off.
    expander_reset: Option<Output<'static>>,
    /// P0 pin number of the system button (wake source).
    wake_pin: usize,
}

impl Shutdown {
    pub fn new(expander_reset: Option<Output<'static>>, wake_pin: usize) -> Self {
        Self {
            expander_reset,
            wake_pin,
        }
    }

    /// Enter System OFF. Pressing the system button resets the chip.
    pub fn system_off(&mut self) -> ! {
        if let Some(reset) = self.expander_reset.as_mut() {
            reset.set_low();
        }
        info!("Powering off, wake on P0.{}", self.wake_pin);

        // Input with pull-up, DETECT when pulled low.
        pac::P0.pin_cnf(self.wake_pin).write(|w| {
            w.set_dir(vals::Dir::INPUT);
            w.set_input(vals::Input::CONNECT);
            w.set_pull(vals::Pull::PULLUP);
            w.set_sense(vals::Sense::LOW);
        });

        let ret = unsafe { raw::sd_power_system_off() };
        // Only returns on error (e.g. while a debugger keeps the chip in
        // emulated System OFF).
        error!("sd_power_system_off returned {}", ret);
        loop {
            cortex_m::asm::wfe();
        }
    }
}

/// Reboot into the Adafruit bootloader's DFU mode.
pub fn reset_to_bootloader() -> ! {
    info!("Rebooting into bootloader");
    let ret = unsafe { raw::sd_power_gpregret_set(0, BOOTLOADER_DFU_MAGIC as u32) };
    if ret != raw::NRF_SUCCESS {
        error!("sd_power_gpregret_set failed: {}", ret);
    }
    cortex_m::peripheral::SCB::sys_reset()
}
