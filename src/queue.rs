//! Outbound report queue between the input sampler and the sender.
//!
//! A bounded FIFO on top of an `embassy-sync` channel. The sampler pushes
//! without ever blocking (a full queue drops the new report); the sender
//! wakes on the first queued report and then drains whatever is left.
//! The channel's critical section orders the hand-over between the poll
//! loop and the sender task.

use crate::config::REPORT_QUEUE_CAPACITY;
use crate::error::Error;
use crate::hid::GamepadReport;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

/// Bounded report FIFO (capacity [`REPORT_QUEUE_CAPACITY`]).
pub struct ReportQueue {
    channel: Channel<CriticalSectionRawMutex, GamepadReport, REPORT_QUEUE_CAPACITY>,
}

impl Default for ReportQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Queue a report without blocking.
    ///
    /// When the queue is full the report is dropped and `QueueFull` is
    /// returned; the caller is not expected to retry.
    pub fn enqueue(&self, report: GamepadReport) -> Result<(), Error> {
        self.channel
            .try_send(report)
            .map_err(|_| Error::QueueFull)
    }

    /// Take the oldest queued report, if any.
    pub fn try_dequeue(&self) -> Option<GamepadReport> {
        self.channel.try_receive().ok()
    }

    /// Wait until a report is queued and take it.
    pub async fn receive(&self) -> GamepadReport {
        self.channel.receive().await
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.channel.is_full()
    }
}
