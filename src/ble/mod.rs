//! Bluetooth Low Energy subsystem.
//!
//! This module drives the Nordic SoftDevice S140 in **Peripheral** role:
//!
//! 1. **Advertiser** - runs the advertising flavour the lifecycle asks for
//!    and hands new connections to a GATT task.
//! 2. **HID service** - the GATT server the host talks to.
//! 3. **Bonder** - answers the SoftDevice's key requests from the bond
//!    table.
//!
//! The lifecycle task owns a [`SoftdeviceTransport`]; everything the stack
//! reports comes back as [`Event`]s on [`EVENTS`].

pub mod advertiser;
pub mod bonder;
pub mod hid_service;

use core::cell::RefCell;

use ble_gamepad::advertising::AdvertisingParams;
use ble_gamepad::bonds::{AddressKind, BondAddress};
use ble_gamepad::config::{EVENT_QUEUE_CAPACITY, MAX_BONDS};
use ble_gamepad::error::{BleError, Error};
use ble_gamepad::hid::GamepadReport;
use ble_gamepad::lifecycle::{ConnHandle, Event, Transport};
use defmt::{debug, warn, Format};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use nrf_softdevice::ble::gatt_server::NotifyValueError;
use nrf_softdevice::ble::{Address, AddressType, Connection};

use hid_service::Server;

/// Peripheral links the SoftDevice is configured for (one host plus one
/// slot so a second central can be seen and turned away).
pub const MAX_CONNECTIONS: usize = 2;

/// Commands the lifecycle sends to the advertiser task.
#[derive(Clone, Copy, Format)]
pub enum AdvCommand {
    Start(AdvertisingParams),
    Stop,
}

pub static ADV_COMMANDS: Channel<CriticalSectionRawMutex, AdvCommand, 4> = Channel::new();

/// Stack events for the lifecycle task.
pub static EVENTS: Channel<CriticalSectionRawMutex, Event, EVENT_QUEUE_CAPACITY> = Channel::new();

/// Live connections, looked up by handle.
static CONNECTIONS: Mutex<CriticalSectionRawMutex, RefCell<Vec<Connection, MAX_CONNECTIONS>>> =
    Mutex::new(RefCell::new(Vec::new()));

/// Queue an event for the lifecycle without blocking.
pub fn post_event(event: Event) {
    if EVENTS.try_send(event).is_err() {
        warn!("Event queue full, dropping {}", event);
    }
}

pub fn register_connection(conn: &Connection) {
    CONNECTIONS.lock(|conns| {
        if conns.borrow_mut().push(conn.clone()).is_err() {
            warn!("Connection registry full");
        }
    });
}

pub fn forget_connection(handle: u16) {
    CONNECTIONS.lock(|conns| {
        conns
            .borrow_mut()
            .retain(|c| c.handle().is_some_and(|h| h != handle));
    });
}

fn connection(handle: ConnHandle) -> Option<Connection> {
    CONNECTIONS.lock(|conns| {
        conns
            .borrow()
            .iter()
            .find(|c| c.handle() == Some(handle.0))
            .cloned()
    })
}

pub fn to_bond_address(addr: Address) -> BondAddress {
    let kind = match addr.address_type() {
        AddressType::Public => AddressKind::Public,
        AddressType::RandomStatic => AddressKind::RandomStatic,
        AddressType::RandomPrivateResolvable => AddressKind::RandomPrivateResolvable,
        AddressType::RandomPrivateNonResolvable => AddressKind::RandomPrivateNonResolvable,
        AddressType::Anonymous => AddressKind::Anonymous,
    };
    BondAddress::new(kind, addr.bytes())
}

pub fn to_address(bond: &BondAddress) -> Address {
    let kind = match bond.kind {
        AddressKind::Public => AddressType::Public,
        AddressKind::RandomStatic => AddressType::RandomStatic,
        AddressKind::RandomPrivateResolvable => AddressType::RandomPrivateResolvable,
        AddressKind::RandomPrivateNonResolvable => AddressType::RandomPrivateNonResolvable,
        AddressKind::Anonymous => AddressType::Anonymous,
    };
    Address::new(kind, bond.bytes)
}

/// [`Transport`] over the SoftDevice.
///
/// Advertising runs in the advertiser task, so start/stop only queue a
/// command; their outcome arrives later as an [`Event`].
pub struct SoftdeviceTransport {
    server: &'static Server,
    hid_conn: Option<ConnHandle>,
}

impl SoftdeviceTransport {
    pub fn new(server: &'static Server) -> Self {
        Self {
            server,
            hid_conn: None,
        }
    }

    fn command(&self, cmd: AdvCommand) -> Result<(), Error> {
        ADV_COMMANDS
            .try_send(cmd)
            .map_err(|_| Error::Advertising(BleError::NoResources))
    }
}

impl Transport for SoftdeviceTransport {
    fn start_advertising(&mut self, params: &AdvertisingParams) -> Result<(), Error> {
        self.command(AdvCommand::Start(*params))
    }

    fn stop_advertising(&mut self) -> Result<(), Error> {
        self.command(AdvCommand::Stop)
    }

    fn send_report(&mut self, conn: ConnHandle, report: &GamepadReport) -> Result<(), Error> {
        if self.hid_conn != Some(conn) {
            return Err(Error::Send(BleError::LinkDown));
        }
        let link = connection(conn).ok_or(Error::Send(BleError::LinkDown))?;

        self.server.hid.notify(&link, report).map_err(|e| {
            Error::Send(match e {
                NotifyValueError::Disconnected => BleError::LinkDown,
                NotifyValueError::Raw(raw) => BleError::Raw(raw as u32),
            })
        })
    }

    fn disconnect(&mut self, conn: ConnHandle, reason: u8) -> Result<(), Error> {
        // The SoftDevice always terminates with "remote user terminated".
        debug!("Disconnecting {} (reason {})", conn, reason);
        connection(conn)
            .ok_or(Error::Disconnect(BleError::LinkDown))?
            .disconnect()
            .map_err(|_| Error::Disconnect(BleError::LinkDown))
    }

    fn hid_connected(&mut self, conn: ConnHandle) -> Result<(), Error> {
        self.hid_conn = Some(conn);
        Ok(())
    }

    fn hid_disconnected(&mut self, conn: ConnHandle) -> Result<(), Error> {
        if self.hid_conn == Some(conn) {
            self.hid_conn = None;
        }
        Ok(())
    }

    fn enumerate_bonds(&self, _identity: u8) -> Vec<BondAddress, MAX_BONDS> {
        bonder::with_bonds(|bonds| bonds.addresses())
    }

    fn unpair(&mut self, _identity: u8) -> Result<(), Error> {
        bonder::clear_bonds();
        Ok(())
    }
}
