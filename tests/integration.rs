//! Integration tests for the gamepad core: sampler → queue → lifecycle.

use ble_gamepad::advertising::{AdvertisingMode, AdvertisingParams};
use ble_gamepad::bonds::{AddressKind, BondAddress};
use ble_gamepad::config::{
    LifecycleConfig, BUTTON_COUNT, DEFAULT_PIN_LAYOUT, MAX_BONDS, REPORT_QUEUE_CAPACITY,
};
use ble_gamepad::hid::{Button, GamepadReport, DPAD_NEUTRAL};
use ble_gamepad::lifecycle::hci;
use ble_gamepad::{
    ConnHandle, Device, Error, Event, LinkState, ReportQueue, Sampler, SystemAction, Transport,
};

/// Records what the lifecycle asked the stack to do.
#[derive(Default)]
struct RecordingTransport {
    advertised: Vec<AdvertisingParams>,
    sent: Vec<GamepadReport>,
    disconnects: Vec<(ConnHandle, u8)>,
    hid_links: Vec<ConnHandle>,
    bonds: heapless::Vec<BondAddress, MAX_BONDS>,
    unpaired: usize,
}

impl Transport for RecordingTransport {
    fn start_advertising(&mut self, params: &AdvertisingParams) -> Result<(), Error> {
        self.advertised.push(*params);
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn send_report(&mut self, _conn: ConnHandle, report: &GamepadReport) -> Result<(), Error> {
        self.sent.push(*report);
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnHandle, reason: u8) -> Result<(), Error> {
        self.disconnects.push((conn, reason));
        Ok(())
    }

    fn hid_connected(&mut self, conn: ConnHandle) -> Result<(), Error> {
        self.hid_links.push(conn);
        Ok(())
    }

    fn hid_disconnected(&mut self, conn: ConnHandle) -> Result<(), Error> {
        self.hid_links.retain(|c| *c != conn);
        Ok(())
    }

    fn enumerate_bonds(&self, _identity: u8) -> heapless::Vec<BondAddress, MAX_BONDS> {
        self.bonds.clone()
    }

    fn unpair(&mut self, _identity: u8) -> Result<(), Error> {
        self.unpaired += 1;
        self.bonds.clear();
        Ok(())
    }
}

const HOST: BondAddress = BondAddress::new(AddressKind::Public, [0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
const CONN: ConnHandle = ConnHandle(0);

fn released() -> [bool; BUTTON_COUNT] {
    [false; BUTTON_COUNT]
}

fn new_device() -> Device<RecordingTransport> {
    Device::new(RecordingTransport::default(), LifecycleConfig::default())
}

#[test]
fn boot_connect_disconnect_cycle() {
    let mut device = new_device();

    device.boot(0);
    assert_eq!(device.state(), LinkState::Advertising(AdvertisingMode::Undirected));
    assert_eq!(device.sleep_timer().timeout_ms(), Some(60_000));

    device.handle(Event::Connected { conn: CONN, peer: HOST }, 5_000);
    assert_eq!(device.state(), LinkState::Connected(CONN));
    assert_eq!(device.sleep_timer().timeout_ms(), Some(600_000));
    assert_eq!(device.transport().hid_links, [CONN]);

    device.handle(
        Event::Disconnected {
            conn: CONN,
            peer: HOST,
            reason: Some(0x08),
        },
        20_000,
    );
    assert_eq!(device.state(), LinkState::Advertising(AdvertisingMode::Undirected));
    assert_eq!(device.sleep_timer().deadline_ms(), Some(80_000));
    assert!(device.transport().hid_links.is_empty());
    assert_eq!(device.transport().advertised.len(), 2);
}

#[test]
fn button_press_reaches_host() {
    let mut device = new_device();
    let queue = ReportQueue::new();
    let mut sampler = Sampler::new(DEFAULT_PIN_LAYOUT);

    device.boot(0);
    device.handle(Event::Connected { conn: CONN, peer: HOST }, 100);

    let mut levels = released();
    levels[DEFAULT_PIN_LAYOUT.a] = true;
    let outcome = sampler.tick(&levels, 200, &queue);
    assert!(outcome.changed);

    // Nothing changes on the next sample, so nothing new is queued.
    let outcome = sampler.tick(&levels, 201, &queue);
    assert!(!outcome.changed);
    assert_eq!(queue.len(), 1);

    let stats = device.drain(&queue, 202);
    assert_eq!(stats.sent, 1);
    let sent = &device.transport().sent;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].button(Button::A));
    assert_eq!(sent[0].dpad(), DPAD_NEUTRAL);
    assert_eq!(device.sleep_timer().deadline_ms(), Some(600_202));
}

#[test]
fn reports_are_discarded_while_advertising() {
    let mut device = new_device();
    let queue = ReportQueue::new();
    let mut sampler = Sampler::new(DEFAULT_PIN_LAYOUT);
    device.boot(0);

    let mut levels = released();
    levels[DEFAULT_PIN_LAYOUT.b] = true;
    sampler.tick(&levels, 10, &queue);

    let stats = device.drain(&queue, 11);
    assert_eq!(stats.discarded, 1);
    assert!(queue.is_empty());
    assert!(device.transport().sent.is_empty());
    // The disconnected deadline is not pushed back by discarded reports.
    assert_eq!(device.sleep_timer().deadline_ms(), Some(60_000));
}

#[test]
fn full_queue_drops_newest_report() {
    let queue = ReportQueue::new();
    let mut sampler = Sampler::new(DEFAULT_PIN_LAYOUT);

    // Toggle a button every sample so each tick produces a new report.
    let mut dropped = 0;
    for t in 0..(REPORT_QUEUE_CAPACITY as u64 + 3) {
        let mut levels = released();
        levels[DEFAULT_PIN_LAYOUT.x] = t % 2 == 0;
        if sampler.tick(&levels, t, &queue).dropped {
            dropped += 1;
        }
    }
    assert_eq!(queue.len(), REPORT_QUEUE_CAPACITY);
    assert_eq!(dropped, 3);
}

#[test]
fn long_press_clears_bonds() {
    let mut device = new_device();
    device.transport_mut().bonds.push(HOST).unwrap();
    let queue = ReportQueue::new();
    let mut sampler = Sampler::new(DEFAULT_PIN_LAYOUT);

    device.boot(0);
    assert_eq!(
        device.state(),
        LinkState::Advertising(AdvertisingMode::UndirectedFiltered)
    );

    let mut levels = released();
    levels[DEFAULT_PIN_LAYOUT.system] = true;
    sampler.tick(&levels, 1_000, &queue);
    let outcome = sampler.tick(&released(), 4_500, &queue);
    assert_eq!(outcome.action, Some(SystemAction::ClearBonds));

    device.handle(Event::ClearBonds, 4_500);
    assert_eq!(device.transport().unpaired, 1);
    assert_eq!(device.state(), LinkState::Advertising(AdvertisingMode::Undirected));
    assert_eq!(
        device.transport().advertised.last(),
        Some(&AdvertisingParams::Open)
    );
}

#[test]
fn clear_bonds_drops_connected_host() {
    let mut device = new_device();
    device.transport_mut().bonds.push(HOST).unwrap();
    device.boot(0);
    device.handle(Event::Connected { conn: CONN, peer: HOST }, 10);

    device.handle(Event::ClearBonds, 50);
    assert_eq!(
        device.transport().disconnects,
        [(CONN, hci::REMOTE_USER_TERMINATED)]
    );

    device.handle(
        Event::Disconnected {
            conn: CONN,
            peer: HOST,
            reason: Some(hci::REMOTE_USER_TERMINATED),
        },
        60,
    );
    assert_eq!(device.state(), LinkState::Advertising(AdvertisingMode::Undirected));
}

#[test]
fn directed_boot_falls_back_after_timeout() {
    let mut transport = RecordingTransport::default();
    transport.bonds.push(HOST).unwrap();
    let mut device = Device::new(
        transport,
        LifecycleConfig {
            directed_on_boot: true,
            ..LifecycleConfig::default()
        },
    );

    device.boot(0);
    assert_eq!(
        device.transport().advertised,
        [AdvertisingParams::Directed { peer: HOST }]
    );

    device.handle(
        Event::ConnectFailed {
            peer: Some(HOST),
            status: hci::ADVERTISING_TIMEOUT,
        },
        1_300,
    );
    assert_eq!(
        device.state(),
        LinkState::Advertising(AdvertisingMode::UndirectedFiltered)
    );
    assert_eq!(device.sleep_timer().deadline_ms(), Some(60_000));
}

#[test]
fn idle_device_goes_to_sleep() {
    let mut device = new_device();
    device.boot(0);
    assert!(!device.poll_sleep(30_000));
    assert!(device.poll_sleep(60_000));
    assert!(device.is_off());

    // A late drain after shutdown sends nothing.
    let queue = ReportQueue::new();
    queue.enqueue(GamepadReport::default()).unwrap();
    let stats = device.drain(&queue, 60_001);
    assert_eq!(stats.sent, 0);
    assert!(device.transport().sent.is_empty());
}
