//! BLE HID gamepad firmware for nRF52840 + SoftDevice S140.
//!
//! Tasks:
//! - `softdevice_task`: SoftDevice event pump
//! - `advertiser_task`: advertising rounds and per-connection GATT tasks
//! - `lifecycle_task`: owns the [`Device`] state machine, sends reports and
//!   powers off when the sleep deadline passes
//! - `storage_task`: writes the bond table to flash when it changes
//! - `main` itself: 1 ms input poll loop

#![no_std]
#![no_main]

mod ble;
mod buttons;
mod power;
mod storage;

use core::mem;

use ble_gamepad::config::{
    LifecycleConfig, BLE_CONN_INTERVAL_MAX, BLE_CONN_INTERVAL_MIN, BLE_SLAVE_LATENCY,
    BLE_SUP_TIMEOUT, DEFAULT_PIN_LAYOUT, DEVICE_APPEARANCE, DEVICE_NAME,
    POLL_INTERVAL_MS,
};
use ble_gamepad::lifecycle::{Device, DrainStats, Event};
use ble_gamepad::{ReportQueue, Sampler, SystemAction};
use defmt::{debug, info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_futures::select::{select3, Either3};
use embassy_nrf::gpio::{Level, Output, OutputDrive, Pin};
use embassy_nrf::interrupt::Priority;
use embassy_time::{Duration, Instant, Ticker, Timer};
use nrf_softdevice::{raw, Flash, Softdevice};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use ble::advertiser::advertiser_task;
use ble::hid_service::Server;
use ble::{post_event, SoftdeviceTransport, EVENTS, MAX_CONNECTIONS};
use buttons::Buttons;
use power::Shutdown;

/// Reports from the poll loop to the lifecycle task.
static REPORTS: ReportQueue = ReportQueue::new();

fn now_ms() -> u64 {
    Instant::now().as_millis()
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn lifecycle_task(server: &'static Server, mut shutdown: Shutdown) -> ! {
    let mut device = Device::new(SoftdeviceTransport::new(server), LifecycleConfig::default());
    device.boot(now_ms());

    loop {
        let deadline = device.sleep_timer().deadline_ms();
        let sleep = async move {
            match deadline {
                Some(ms) => Timer::at(Instant::from_millis(ms)).await,
                None => core::future::pending::<()>().await,
            }
        };

        match select3(EVENTS.receive(), REPORTS.receive(), sleep).await {
            Either3::First(event) => device.handle(event, now_ms()),
            Either3::Second(report) => {
                let now = now_ms();
                let mut stats = DrainStats::default();
                device.deliver(report, now, &mut stats);
                while let Some(report) = REPORTS.try_dequeue() {
                    device.deliver(report, now, &mut stats);
                }
                debug!("Reports: {}", stats);
            }
            Either3::Third(()) => {}
        }

        if device.poll_sleep(now_ms()) {
            shutdown.system_off();
        }
    }
}

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: MAX_CONNECTIONS as u8,
            event_length: 6,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 64 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: MAX_CONNECTIONS as u8,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: DEVICE_NAME.as_ptr() as _,
            current_len: DEVICE_NAME.len() as u16,
            max_len: DEVICE_NAME.len() as u16,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}

/// Appearance and preferred connection parameters for the GAP service.
fn set_gap_params() {
    let conn_params = raw::ble_gap_conn_params_t {
        min_conn_interval: BLE_CONN_INTERVAL_MIN,
        max_conn_interval: BLE_CONN_INTERVAL_MAX,
        slave_latency: BLE_SLAVE_LATENCY,
        conn_sup_timeout: BLE_SUP_TIMEOUT,
    };
    unsafe {
        let ret = raw::sd_ble_gap_appearance_set(DEVICE_APPEARANCE);
        if ret != raw::NRF_SUCCESS {
            warn!("sd_ble_gap_appearance_set failed: {}", ret);
        }
        let ret = raw::sd_ble_gap_ppcp_set(&conn_params);
        if ret != raw::NRF_SUCCESS {
            warn!("sd_ble_gap_ppcp_set failed: {}", ret);
        }
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("BLE gamepad starting");

    // Leave priorities 0, 1 and 4 to the SoftDevice.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(config);

    // Board wiring, in sampler order (see DEFAULT_PIN_LAYOUT).
    let pins = [
        p.P0_02.degrade(), // 0 menu / system
        p.P0_03.degrade(), // 1 options
        p.P0_04.degrade(), // 2 stadia
        p.P0_05.degrade(), // 3 capture
        p.P0_28.degrade(), // 4 l3
        p.P0_29.degrade(), // 5 r3
        p.P0_30.degrade(), // 6 d-pad
        p.P0_31.degrade(), // 7 d-pad
        p.P1_15.degrade(), // 8 d-pad
        p.P1_13.degrade(), // 9 d-pad
        p.P1_11.degrade(), // 10 x
        p.P1_10.degrade(), // 11 y
        p.P1_08.degrade(), // 12 r1
        p.P0_07.degrade(), // 13 l1
        p.P0_26.degrade(), // 14 a
        p.P0_27.degrade(), // 15 b
        p.P0_06.degrade(), // 16 r2
        p.P0_08.degrade(), // 17 l2
    ];
    let wake_pin = 2;
    let buttons = Buttons::new(pins);

    // Active-low reset, released while running.
    let expander_reset = Output::new(p.P0_12, Level::High, OutputDrive::Standard);
    let shutdown = Shutdown::new(Some(expander_reset), wake_pin);

    let sd = Softdevice::enable(&softdevice_config());
    set_gap_params();

    static SERVER: StaticCell<Server> = StaticCell::new();
    let server: &'static Server = SERVER.init(unwrap!(Server::new(sd)));

    let sd: &'static Softdevice = sd;
    unwrap!(spawner.spawn(softdevice_task(sd)));

    let mut flash = Flash::take(sd);
    storage::restore(&mut flash).await;
    unwrap!(spawner.spawn(storage::storage_task(flash)));

    unwrap!(spawner.spawn(advertiser_task(sd, server, spawner)));
    unwrap!(spawner.spawn(lifecycle_task(server, shutdown)));

    let mut sampler = Sampler::new(DEFAULT_PIN_LAYOUT);
    let mut ticker = Ticker::every(Duration::from_millis(POLL_INTERVAL_MS));

    loop {
        let outcome = sampler.tick(&buttons.read(), now_ms(), &REPORTS);
        if outcome.dropped {
            warn!("Report queue full, report dropped");
        }
        match outcome.action {
            Some(SystemAction::ClearBonds) => post_event(Event::ClearBonds),
            Some(SystemAction::ResetToBootloader) => power::reset_to_bootloader(),
            None => {}
        }
        ticker.next().await;
    }
}
