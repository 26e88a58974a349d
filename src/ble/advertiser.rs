//! Advertiser task.
//!
//! Runs one advertising round at a time as commanded by the lifecycle.
//! A new command preempts the running round (dropping the advertise
//! future stops advertising in the SoftDevice). Every connection gets its
//! own GATT task which reports the disconnect.

use ble_gamepad::advertising::{advertising_data, AdvData, AdvertisingParams};
use ble_gamepad::bonds::BondAddress;
use ble_gamepad::config::{BLE_ADV_INTERVAL, DEVICE_APPEARANCE, DEVICE_NAME};
use ble_gamepad::error::{BleError, Error};
use ble_gamepad::lifecycle::{hci, ConnHandle, Event};
use defmt::{debug, error, info, warn};
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use nrf_softdevice::ble::peripheral::{self, AdvertiseError, ConnectableAdvertisement, FilterPolicy};
use nrf_softdevice::ble::{gatt_server, Connection};
use nrf_softdevice::{raw, RawError, Softdevice};

use super::hid_service::Server;
use super::{bonder, forget_connection, post_event, register_connection, to_address, to_bond_address};
use super::{AdvCommand, ADV_COMMANDS, EVENTS, MAX_CONNECTIONS};

#[embassy_executor::task]
pub async fn advertiser_task(
    sd: &'static Softdevice,
    server: &'static Server,
    spawner: Spawner,
) -> ! {
    let adv_data = advertising_data(DEVICE_NAME, DEVICE_APPEARANCE);
    let mut pending: Option<AdvCommand> = None;

    loop {
        let cmd = match pending.take() {
            Some(cmd) => cmd,
            None => ADV_COMMANDS.receive().await,
        };

        let params = match cmd {
            AdvCommand::Start(params) => params,
            AdvCommand::Stop => {
                debug!("Advertising stopped");
                continue;
            }
        };

        match select(ADV_COMMANDS.receive(), advertise(sd, &params, &adv_data)).await {
            Either::First(next) => pending = Some(next),
            Either::Second(Ok(conn)) => on_connection(conn, server, spawner).await,
            Either::Second(Err(AdvertiseError::Timeout)) => post_event(Event::ConnectFailed {
                peer: params.peer().copied(),
                status: hci::ADVERTISING_TIMEOUT,
            }),
            Either::Second(Err(e)) => {
                let err = match e {
                    AdvertiseError::NoFreeConn => BleError::NoResources,
                    AdvertiseError::Raw(raw) => BleError::Raw(raw as u32),
                    AdvertiseError::Timeout => BleError::LinkDown,
                };
                post_event(Event::AdvertisingFailed(Error::Advertising(err)));
            }
        }
    }
}

async fn advertise(
    sd: &'static Softdevice,
    params: &AdvertisingParams,
    adv_data: &AdvData,
) -> Result<Connection, AdvertiseError> {
    let mut config = peripheral::Config::default();

    let adv = match params {
        AdvertisingParams::Directed { peer } => {
            set_device_identities(Some(peer)).map_err(AdvertiseError::Raw)?;
            ConnectableAdvertisement::NonscannableDirectedHighDuty {
                peer: to_address(peer),
            }
        }
        AdvertisingParams::Filtered { peer } => {
            set_device_identities(Some(peer)).map_err(AdvertiseError::Raw)?;
            set_accept_list(Some(peer)).map_err(AdvertiseError::Raw)?;
            config.filter_policy = FilterPolicy::ConnectionRequests;
            config.interval = BLE_ADV_INTERVAL;
            ConnectableAdvertisement::ScannableUndirected {
                adv_data: adv_data.as_slice(),
                scan_data: &[],
            }
        }
        AdvertisingParams::Open => {
            set_accept_list(None).map_err(AdvertiseError::Raw)?;
            set_device_identities(None).map_err(AdvertiseError::Raw)?;
            config.interval = BLE_ADV_INTERVAL;
            ConnectableAdvertisement::ScannableUndirected {
                adv_data: adv_data.as_slice(),
                scan_data: &[],
            }
        }
    };

    peripheral::advertise_pairable(sd, adv, &config, bonder::bonder()).await
}

/// Load the GAP accept list: just `peer`, or empty.
fn set_accept_list(peer: Option<&BondAddress>) -> Result<(), RawError> {
    let ret = match peer {
        Some(peer) => {
            let addr = to_address(peer).into_raw();
            let list = [&addr as *const raw::ble_gap_addr_t];
            unsafe { raw::sd_ble_gap_whitelist_set(list.as_ptr(), 1) }
        }
        None => unsafe { raw::sd_ble_gap_whitelist_set(core::ptr::null(), 0) },
    };
    RawError::convert(ret)
}

/// Load the identity resolving list: `peer` with its IRK, or empty.
/// Without it a host using a private address never matches the accept
/// list or the directed target.
fn set_device_identities(peer: Option<&BondAddress>) -> Result<(), RawError> {
    let identity = peer.and_then(|peer| bonder::with_bonds(|bonds| bonds.resolving_identity(peer)));

    let ret = match identity {
        Some((addr, irk)) => {
            let key = raw::ble_gap_id_key_t {
                id_info: raw::ble_gap_irk_t { irk },
                id_addr_info: to_address(&addr).into_raw(),
            };
            let keys = [&key as *const raw::ble_gap_id_key_t];
            unsafe { raw::sd_ble_gap_device_identities_set(keys.as_ptr(), core::ptr::null(), 1) }
        }
        None => {
            if peer.is_some() {
                debug!("Bonded host shared no IRK, matching identity address only");
            }
            unsafe { raw::sd_ble_gap_device_identities_set(core::ptr::null(), core::ptr::null(), 0) }
        }
    };
    RawError::convert(ret)
}

async fn on_connection(conn: Connection, server: &'static Server, spawner: Spawner) {
    let Some(handle) = conn.handle() else {
        warn!("Connection closed before it was registered");
        return;
    };
    let peer = to_bond_address(conn.peer_address());
    info!("Link {} up with {}", handle, peer);

    register_connection(&conn);
    EVENTS
        .send(Event::Connected {
            conn: ConnHandle(handle),
            peer,
        })
        .await;

    if spawner.spawn(gatt_task(conn.clone(), server)).is_err() {
        error!("No free GATT task for link {}", handle);
        let _ = conn.disconnect();
        forget_connection(handle);
        EVENTS
            .send(Event::Disconnected {
                conn: ConnHandle(handle),
                peer,
                reason: None,
            })
            .await;
    }
}

#[embassy_executor::task(pool_size = MAX_CONNECTIONS)]
async fn gatt_task(conn: Connection, server: &'static Server) {
    let Some(handle) = conn.handle() else {
        return;
    };
    let peer = to_bond_address(conn.peer_address());

    let _ = gatt_server::run(&conn, server, |_| {}).await;

    // A lost disconnect would leave the lifecycle connected forever.
    forget_connection(handle);
    EVENTS
        .send(Event::Disconnected {
            conn: ConnHandle(handle),
            peer,
            reason: None,
        })
        .await;
}
