//! GATT server: HID over GATT (gamepad) and Battery service.
//!
//! Services are registered with the SoftDevice's builder API because the
//! input report needs a Report Reference descriptor, which the attribute
//! macros cannot express.

use ble_gamepad::config::REPORT_ID;
use ble_gamepad::error::{BleError, Error};
use ble_gamepad::hid::descriptor::GAMEPAD_REPORT_MAP;
use ble_gamepad::hid::{GamepadReport, HID_INFORMATION};
use defmt::{debug, info};
use nrf_softdevice::ble::gatt_server::builder::ServiceBuilder;
use nrf_softdevice::ble::gatt_server::characteristic::{Attribute, Metadata, Properties};
use nrf_softdevice::ble::gatt_server::{self, NotifyValueError, RegisterError, WriteOp};
use nrf_softdevice::ble::{Connection, SecurityMode, Uuid};
use nrf_softdevice::Softdevice;

const HID_SERVICE: Uuid = Uuid::new_16(0x1812);
const HID_INFO: Uuid = Uuid::new_16(0x2a4a);
const REPORT_MAP: Uuid = Uuid::new_16(0x2a4b);
const HID_CONTROL_POINT: Uuid = Uuid::new_16(0x2a4c);
const HID_REPORT: Uuid = Uuid::new_16(0x2a4d);
const PROTOCOL_MODE: Uuid = Uuid::new_16(0x2a4e);
const REPORT_REFERENCE: Uuid = Uuid::new_16(0x2908);

const BATTERY_SERVICE: Uuid = Uuid::new_16(0x180f);
const BATTERY_LEVEL: Uuid = Uuid::new_16(0x2a19);

/// Report Reference "type" field: input report.
const REPORT_TYPE_INPUT: u8 = 0x01;
/// Protocol Mode value: report protocol (boot protocol is not offered).
const PROTOCOL_MODE_REPORT: u8 = 0x01;

/// HID service attribute handles.
pub struct HidService {
    control_point: u16,
    protocol_mode: u16,
    input_report: u16,
    input_report_cccd: u16,
}

impl HidService {
    pub fn new(sd: &mut Softdevice) -> Result<Self, RegisterError> {
        let mut service = ServiceBuilder::new(sd, HID_SERVICE)?;

        service
            .add_characteristic(
                HID_INFO,
                Attribute::new(HID_INFORMATION).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().read()),
            )?
            .build();

        service
            .add_characteristic(
                REPORT_MAP,
                Attribute::new(GAMEPAD_REPORT_MAP).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().read()),
            )?
            .build();

        let control_point = service
            .add_characteristic(
                HID_CONTROL_POINT,
                Attribute::new([0u8]).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().write_without_response()),
            )?
            .build();

        let protocol_mode = service
            .add_characteristic(
                PROTOCOL_MODE,
                Attribute::new([PROTOCOL_MODE_REPORT]).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().read().write_without_response()),
            )?
            .build();

        let mut input = service.add_characteristic(
            HID_REPORT,
            Attribute::new(*GamepadReport::neutral().as_bytes()).security(SecurityMode::JustWorks),
            Metadata::new(Properties::new().read().notify()),
        )?;
        input.add_descriptor(
            REPORT_REFERENCE,
            Attribute::new([REPORT_ID, REPORT_TYPE_INPUT]).security(SecurityMode::JustWorks),
        )?;
        let input_report = input.build();

        let _ = service.build();

        Ok(Self {
            control_point: control_point.value_handle,
            protocol_mode: protocol_mode.value_handle,
            input_report: input_report.value_handle,
            input_report_cccd: input_report.cccd_handle,
        })
    }

    /// Notify one input report on `conn`.
    pub fn notify(&self, conn: &Connection, report: &GamepadReport) -> Result<(), NotifyValueError> {
        gatt_server::notify_value(conn, self.input_report, report.as_bytes())
    }

    fn on_write(&self, handle: u16, data: &[u8]) {
        if handle == self.control_point {
            match data.first() {
                Some(0) => info!("HID: host suspended"),
                Some(1) => info!("HID: host resumed"),
                _ => debug!("HID: unknown control point write {:x}", data),
            }
        } else if handle == self.protocol_mode {
            debug!("HID: protocol mode set to {:x}", data);
        } else if handle == self.input_report_cccd {
            let enabled = data.first().map(|v| v & 0x01 != 0).unwrap_or(false);
            info!("HID: input report notifications enabled={}", enabled);
        }
    }
}

/// Battery service. The level is static; there is no fuel gauge.
pub struct BatteryService {
    level: u16,
}

impl BatteryService {
    pub fn new(sd: &mut Softdevice) -> Result<Self, RegisterError> {
        let mut service = ServiceBuilder::new(sd, BATTERY_SERVICE)?;
        let level = service
            .add_characteristic(
                BATTERY_LEVEL,
                Attribute::new([100u8]).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().read().notify()),
            )?
            .build();
        let _ = service.build();

        Ok(Self {
            level: level.value_handle,
        })
    }

    pub fn level_handle(&self) -> u16 {
        self.level
    }
}

pub struct Server {
    pub hid: HidService,
    pub bas: BatteryService,
}

impl Server {
    pub fn new(sd: &mut Softdevice) -> Result<Self, Error> {
        let bas = BatteryService::new(sd).map_err(setup_error)?;
        let hid = HidService::new(sd).map_err(setup_error)?;
        info!(
            "GATT server ready (battery level handle {})",
            bas.level_handle()
        );
        Ok(Self { hid, bas })
    }
}

fn setup_error(err: RegisterError) -> Error {
    match err {
        RegisterError::Raw(raw) => Error::TransportSetup(BleError::Raw(raw as u32)),
    }
}

impl gatt_server::Server for Server {
    type Event = ();

    fn on_write(
        &self,
        _conn: &Connection,
        handle: u16,
        _op: WriteOp,
        _offset: usize,
        data: &[u8],
    ) -> Option<Self::Event> {
        self.hid.on_write(handle, data);
        None
    }
}
