//! Connection / advertising lifecycle.
//!
//! [`Device`] is the single owned context of the firmware: the active
//! connection handle, the directed-retry flag and the sleep deadline all
//! live here and are only touched through `&mut Device`. The BLE stack is
//! reached through the [`Transport`] trait and reports back by feeding
//! [`Event`]s into [`Device::handle`].
//!
//! ```text
//!            boot / disconnect / clear bonds
//!   Idle ──────────────────────────────────────► Advertising(mode)
//!    ▲  ◄── directed timeout (restarts non-directed) ──┘   │
//!    │                                                     │ connected
//!    └── advertising refused          Connected(handle) ◄──┘
//!                                          │ disconnected
//!                                          └──► Advertising(non-directed)
//!
//!   sleep deadline reached (any state) ──► Off (terminal)
//! ```

use crate::advertising::{AdvertisingMode, AdvertisingParams};
use crate::bonds::BondAddress;
use crate::config::{LifecycleConfig, BOND_IDENTITY, MAX_BONDS};
use crate::error::Error;
use crate::hid::GamepadReport;
use crate::power_logic::SleepTimer;
use crate::queue::ReportQueue;
use heapless::Vec;

/// HCI status / reason codes the lifecycle cares about.
pub mod hci {
    /// Remote User Terminated Connection.
    pub const REMOTE_USER_TERMINATED: u8 = 0x13;
    /// Advertising Timeout (directed advertising expired).
    pub const ADVERTISING_TIMEOUT: u8 = 0x3C;
}

/// Stack-assigned connection handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnHandle(pub u16);

/// The narrow slice of the BLE / HID stack the lifecycle drives.
pub trait Transport {
    /// Start advertising; replaces whatever advertising is running.
    fn start_advertising(&mut self, params: &AdvertisingParams) -> Result<(), Error>;

    fn stop_advertising(&mut self) -> Result<(), Error>;

    /// Notify one input report on `conn`.
    fn send_report(&mut self, conn: ConnHandle, report: &GamepadReport) -> Result<(), Error>;

    fn disconnect(&mut self, conn: ConnHandle, reason: u8) -> Result<(), Error>;

    /// Attach `conn` to the HID service.
    fn hid_connected(&mut self, conn: ConnHandle) -> Result<(), Error>;

    /// Detach `conn` from the HID service.
    fn hid_disconnected(&mut self, conn: ConnHandle) -> Result<(), Error>;

    /// Identity addresses of the bonds stored for `identity`, oldest first.
    fn enumerate_bonds(&self, identity: u8) -> Vec<BondAddress, MAX_BONDS>;

    /// Forget every bond stored for `identity`.
    fn unpair(&mut self, identity: u8) -> Result<(), Error>;
}

/// Inputs to the lifecycle: stack callbacks plus the clear-bonds action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// A host connected while we were advertising.
    Connected { conn: ConnHandle, peer: BondAddress },
    /// Advertising ended without a connection. `status` is an HCI code;
    /// [`hci::ADVERTISING_TIMEOUT`] is the normal end of directed advertising.
    ConnectFailed {
        peer: Option<BondAddress>,
        status: u8,
    },
    /// A link went down. `reason` is the HCI reason when the stack reports it.
    Disconnected {
        conn: ConnHandle,
        peer: BondAddress,
        reason: Option<u8>,
    },
    /// The stack refused advertising after accepting the start request.
    AdvertisingFailed(Error),
    SecurityChanged {
        peer: BondAddress,
        level: u8,
        error: Option<u8>,
    },
    PairingComplete { peer: BondAddress, bonded: bool },
    PairingFailed { peer: BondAddress, reason: u8 },
    AuthCancelled { peer: BondAddress },
    /// Forget all bonds (long press on the system button).
    ClearBonds,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Idle,
    Advertising(AdvertisingMode),
    Connected(ConnHandle),
    /// Sleep deadline reached; nothing is processed any more.
    Off,
}

/// Counts from one queue drain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DrainStats {
    pub sent: usize,
    /// Dropped because no host was connected.
    pub discarded: usize,
    /// Handed to the transport but refused.
    pub failed: usize,
}

/// Device context: lifecycle state plus the sleep deadline.
pub struct Device<T: Transport> {
    transport: T,
    config: LifecycleConfig,
    state: LinkState,
    active_conn: Option<ConnHandle>,
    try_directed: bool,
    sleep: SleepTimer,
}

impl<T: Transport> Device<T> {
    pub fn new(transport: T, config: LifecycleConfig) -> Self {
        Self {
            transport,
            config,
            state: LinkState::Idle,
            active_conn: None,
            try_directed: false,
            sleep: SleepTimer::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn active_connection(&self) -> Option<ConnHandle> {
        self.active_conn
    }

    pub fn sleep_timer(&self) -> &SleepTimer {
        &self.sleep
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_off(&self) -> bool {
        self.state == LinkState::Off
    }

    /// First advertising round after power-on; arms the short sleep timeout.
    pub fn boot(&mut self, now_ms: u64) {
        info!("Gamepad lifecycle starting");
        self.try_directed = self.config.directed_on_boot;
        self.advertise();
        self.sleep
            .rearm(now_ms, self.config.disconnected_sleep_timeout_ms);
    }

    /// Feed one event into the state machine.
    pub fn handle(&mut self, event: Event, now_ms: u64) {
        if self.is_off() {
            debug!("Ignoring event while off");
            return;
        }

        match event {
            Event::Connected { conn, peer } => self.on_connected(conn, peer, now_ms),
            Event::ConnectFailed { peer, status } => self.on_connect_failed(peer, status),
            Event::Disconnected { conn, peer, reason } => {
                self.on_disconnected(conn, peer, reason, now_ms)
            }
            Event::AdvertisingFailed(err) => {
                error!("Advertising failed: {}", err);
                if matches!(self.state, LinkState::Advertising(_)) {
                    self.state = LinkState::Idle;
                }
            }
            Event::SecurityChanged { peer, level, error } => match error {
                None => info!("Security changed: {}, level={}", peer, level),
                Some(err) => error!(
                    "Security failed: {}, level={}, err={}",
                    peer, level, err
                ),
            },
            Event::PairingComplete { peer, bonded } => {
                info!("Pairing complete: {}, bonded={}", peer, bonded)
            }
            Event::PairingFailed { peer, reason } => {
                error!("Pairing failed: {}, reason={}", peer, reason)
            }
            Event::AuthCancelled { peer } => warn!("Pairing cancelled: {}", peer),
            Event::ClearBonds => self.clear_bonds(now_ms),
        }
    }

    /// Forget every bond. A connected host is dropped and the disconnect
    /// path re-advertises; otherwise advertising is restarted right away.
    pub fn clear_bonds(&mut self, now_ms: u64) {
        if self.is_off() {
            return;
        }

        info!("Clearing bonds");
        check("unpair", self.transport.unpair(BOND_IDENTITY));

        match self.active_conn {
            Some(conn) => {
                info!("Disconnecting...");
                check(
                    "disconnect",
                    self.transport.disconnect(conn, hci::REMOTE_USER_TERMINATED),
                );
            }
            None => {
                info!("(not connected)");
                check("stop_advertising", self.transport.stop_advertising());
                self.state = LinkState::Idle;
                self.advertising_start(now_ms);
            }
        }
    }

    /// Deliver one report to the connected host.
    ///
    /// While connected this re-arms the long sleep timeout whether or not
    /// the stack accepts the notification. Without a connection the report
    /// is discarded and `NotConnected` returned.
    pub fn send_report(&mut self, report: &GamepadReport, now_ms: u64) -> Result<(), Error> {
        let conn = match (self.state, self.active_conn) {
            (LinkState::Off, _) | (_, None) => return Err(Error::NotConnected),
            (_, Some(conn)) => conn,
        };

        self.sleep
            .rearm(now_ms, self.config.connected_sleep_timeout_ms);
        debug!("Sending report...");
        self.transport.send_report(conn, report)
    }

    /// Empty the queue, sending each report if connected. Draining an empty
    /// queue does nothing.
    pub fn drain(&mut self, queue: &ReportQueue, now_ms: u64) -> DrainStats {
        let mut stats = DrainStats::default();
        while let Some(report) = queue.try_dequeue() {
            self.deliver(report, now_ms, &mut stats);
        }
        stats
    }

    /// Send a report taken from the queue by the caller and account for it.
    pub fn deliver(&mut self, report: GamepadReport, now_ms: u64, stats: &mut DrainStats) {
        match self.send_report(&report, now_ms) {
            Ok(()) => stats.sent += 1,
            Err(Error::NotConnected) => stats.discarded += 1,
            Err(err) => {
                error!("send_report failed: {}", err);
                stats.failed += 1;
            }
        }
    }

    /// Check the sleep deadline. Returns `true` exactly once, when the
    /// device must shut down; from then on it is `Off`.
    pub fn poll_sleep(&mut self, now_ms: u64) -> bool {
        if self.is_off() || !self.sleep.is_expired(now_ms) {
            return false;
        }
        info!("Going to sleep...");
        self.state = LinkState::Off;
        self.sleep.disarm();
        true
    }

    fn on_connected(&mut self, conn: ConnHandle, peer: BondAddress, now_ms: u64) {
        if let Some(active) = self.active_conn {
            error!(
                "Rejecting {} ({}): already connected on {}",
                peer,
                Error::AlreadyConnected,
                active
            );
            check(
                "disconnect",
                self.transport.disconnect(conn, hci::REMOTE_USER_TERMINATED),
            );
            return;
        }

        if !matches!(self.state, LinkState::Advertising(_)) {
            error!(
                "Rejecting {} ({}): state {}",
                peer,
                Error::NotAdvertising,
                self.state
            );
            check(
                "disconnect",
                self.transport.disconnect(conn, hci::REMOTE_USER_TERMINATED),
            );
            return;
        }

        info!("Connected: {}", peer);
        self.active_conn = Some(conn);
        self.state = LinkState::Connected(conn);
        check("hid_connected", self.transport.hid_connected(conn));
        self.sleep
            .rearm(now_ms, self.config.connected_sleep_timeout_ms);
    }

    fn on_connect_failed(&mut self, peer: Option<BondAddress>, status: u8) {
        if status != hci::ADVERTISING_TIMEOUT {
            error!("Failed to connect to {} ({})", peer, status);
            return;
        }

        info!("Directed advertising to {} timed out", peer);
        match self.state {
            LinkState::Advertising(_) | LinkState::Idle => {
                self.state = LinkState::Idle;
                self.advertising_restart();
            }
            _ => warn!("Advertising timeout in state {}", self.state),
        }
    }

    fn on_disconnected(
        &mut self,
        conn: ConnHandle,
        peer: BondAddress,
        reason: Option<u8>,
        now_ms: u64,
    ) {
        info!("Disconnected: {} (reason={})", peer, reason);

        if self.active_conn != Some(conn) {
            error!("Disconnected from a different connection than the active one?");
            return;
        }

        check("hid_disconnected", self.transport.hid_disconnected(conn));
        self.active_conn = None;
        self.state = LinkState::Idle;
        self.advertising_start(now_ms);
    }

    /// Non-directed advertising plus the short sleep timeout.
    fn advertising_start(&mut self, now_ms: u64) {
        self.try_directed = false;
        self.advertise();
        self.sleep
            .rearm(now_ms, self.config.disconnected_sleep_timeout_ms);
    }

    /// Non-directed advertising, sleep deadline untouched.
    fn advertising_restart(&mut self) {
        self.try_directed = false;
        self.advertise();
    }

    fn advertise(&mut self) {
        let bond = self.transport.enumerate_bonds(BOND_IDENTITY).last().copied();
        let params = AdvertisingParams::select(self.try_directed, bond);

        match &params {
            AdvertisingParams::Directed { peer } => info!("Directed advertising to {}", peer),
            AdvertisingParams::Filtered { peer } => info!("Enabling filter: {}", peer),
            AdvertisingParams::Open => info!("Not enabling filter."),
        }

        if check("start_advertising", self.transport.start_advertising(&params)) {
            self.state = LinkState::Advertising(params.mode());
        } else {
            self.state = LinkState::Idle;
        }
    }
}

/// Log a failed stack call with its origin. Returns `true` on success.
fn check(origin: &'static str, result: Result<(), Error>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            error!("{} failed: {}", origin, err);
            false
        }
    }
}
