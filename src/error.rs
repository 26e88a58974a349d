//! Unified error type for the gamepad firmware.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

/// Top-level error type used across the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // BLE
    /// Stack initialisation or GATT service registration failed.
    TransportSetup(BleError),

    /// The stack refused to start or stop advertising.
    Advertising(BleError),

    /// A report could not be handed to the link.
    Send(BleError),

    /// Disconnect request was refused.
    Disconnect(BleError),

    /// A connection arrived while another one is still tracked.
    AlreadyConnected,

    /// A connection arrived while no advertising was running.
    NotAdvertising,

    /// Operation needs an active connection.
    NotConnected,

    // Queue
    /// Outbound report queue is full; the report was dropped.
    QueueFull,

    // Storage
    /// Flash read/write/erase failed.
    Storage,
}

/// Subset of BLE errors we propagate (keeps the enum `Copy`-friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleError {
    /// Raw error code from the SoftDevice / HCI.
    Raw(u32),
    /// The link is down (no connection to send on).
    LinkDown,
    /// The stack has no free resources (queue or buffer full).
    NoResources,
    /// Peer has not enabled notifications yet.
    NotifyDisabled,
}
