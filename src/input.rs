//! Input sampler: turns logical pin levels into gamepad reports.
//!
//! Runs once per poll tick on the main loop. Each tick it
//! 1. tracks press/release edges of the system button and classifies the
//!    hold time on release,
//! 2. maps the button pins onto the report (the two triggers also drive
//!    their axis to full scale, there is no analog trigger input),
//! 3. folds the four d-pad pins into a hat-switch code,
//! 4. queues the report only if it differs from the last one queued.
//!
//! Pin levels are logical (`true` = pressed); active-low inversion happens
//! in the GPIO layer.

use crate::config::{PinLayout, BUTTON_COUNT};
use crate::hid::{neutral_report, Axis, Button, GamepadReport, TRIGGER_FULL};
use crate::power_logic::{classify_hold, SystemAction};
use crate::queue::ReportQueue;

/// Logical level of every input, indexed as in [`PinLayout`].
pub type PinLevels = [bool; BUTTON_COUNT];

/// Hat-switch code for each 4-bit d-pad index.
///
/// Index bits follow `PinLayout::dpad` (bit 0 first). Opposing pairs and
/// the all-pressed case fold to the null state 0xF.
pub const DPAD_LUT: [u8; 16] = [
    0x0F, 0x06, 0x02, 0x0F, 0x00, 0x07, 0x01, 0x00, 0x04, 0x05, 0x03, 0x04, 0x0F, 0x06, 0x02, 0x0F,
];

/// Look up the hat-switch code for a d-pad index (upper bits ignored).
pub fn dpad_code(index: u8) -> u8 {
    DPAD_LUT[(index & 0x0F) as usize]
}

/// D-pad index from the four d-pad pins.
pub fn dpad_index(levels: &PinLevels, layout: &PinLayout) -> u8 {
    layout
        .dpad
        .iter()
        .enumerate()
        .fold(0u8, |acc, (bit, &pin)| acc | ((levels[pin] as u8) << bit))
}

/// Build the full report for one set of pin levels.
pub fn build_report(levels: &PinLevels, layout: &PinLayout) -> GamepadReport {
    let mut report = neutral_report();

    let direct = [
        (Button::Menu, layout.system),
        (Button::Options, layout.options),
        (Button::Stadia, layout.stadia),
        (Button::Capture, layout.capture),
        (Button::L3, layout.l3),
        (Button::R3, layout.r3),
        (Button::X, layout.x),
        (Button::Y, layout.y),
        (Button::R1, layout.r1),
        (Button::L1, layout.l1),
        (Button::A, layout.a),
        (Button::B, layout.b),
        (Button::R2, layout.r2),
        (Button::L2, layout.l2),
    ];
    for (button, pin) in direct {
        report.set_button(button, levels[pin]);
    }

    report.set_axis(Axis::R2, trigger_axis(levels[layout.r2]));
    report.set_axis(Axis::L2, trigger_axis(levels[layout.l2]));

    report.set_dpad(dpad_code(dpad_index(levels, layout)));
    report
}

fn trigger_axis(pressed: bool) -> u8 {
    if pressed {
        TRIGGER_FULL
    } else {
        0
    }
}

/// Press/release edge tracking for the system button.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemButton {
    pressed: bool,
    pressed_at_ms: u64,
}

impl SystemButton {
    pub const fn new() -> Self {
        Self {
            pressed: false,
            pressed_at_ms: 0,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Feed the current level; returns the hold duration on a release edge.
    pub fn update(&mut self, pressed: bool, now_ms: u64) -> Option<u64> {
        let held_for = match (self.pressed, pressed) {
            (false, true) => {
                self.pressed_at_ms = now_ms;
                None
            }
            (true, false) => {
                let duration = now_ms.saturating_sub(self.pressed_at_ms);
                self.pressed_at_ms = 0;
                Some(duration)
            }
            _ => None,
        };
        self.pressed = pressed;
        held_for
    }
}

/// Result of one sampler tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickOutcome {
    /// The report differed from the previous one and was offered to the queue.
    pub changed: bool,
    /// The queue was full and the changed report was dropped.
    pub dropped: bool,
    /// Long-press action triggered by a system-button release.
    pub action: Option<SystemAction>,
}

/// Owns the previous-report shadow and the system-button edge state.
pub struct Sampler {
    layout: PinLayout,
    previous: GamepadReport,
    system_button: SystemButton,
}

impl Sampler {
    pub const fn new(layout: PinLayout) -> Self {
        Self {
            layout,
            previous: GamepadReport::neutral(),
            system_button: SystemButton::new(),
        }
    }

    /// Last report offered to the queue (neutral until the first change).
    pub fn previous(&self) -> &GamepadReport {
        &self.previous
    }

    pub fn system_button(&self) -> &SystemButton {
        &self.system_button
    }

    /// Process one poll tick.
    pub fn tick(&mut self, levels: &PinLevels, now_ms: u64, queue: &ReportQueue) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        if let Some(held_ms) = self.system_button.update(levels[self.layout.system], now_ms) {
            outcome.action = classify_hold(held_ms);
            if let Some(action) = outcome.action {
                info!("System button held {} ms -> {}", held_ms, action);
            }
        }

        let report = build_report(levels, &self.layout);
        if report != self.previous {
            outcome.changed = true;
            if queue.enqueue(report).is_err() {
                warn!("Report queue full - dropping report");
                outcome.dropped = true;
            }
            // A dropped report is not retried; the shadow still advances.
            self.previous = report;
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_PIN_LAYOUT, REPORT_QUEUE_CAPACITY};
    use crate::hid::DPAD_NEUTRAL;

    const L: PinLayout = DEFAULT_PIN_LAYOUT;

    fn released() -> PinLevels {
        [false; BUTTON_COUNT]
    }

    fn with(pins: &[usize]) -> PinLevels {
        let mut levels = released();
        for &pin in pins {
            levels[pin] = true;
        }
        levels
    }

    fn dpad_levels(index: u8) -> PinLevels {
        let mut levels = released();
        for bit in 0..4 {
            levels[L.dpad[bit]] = index & (1 << bit) != 0;
        }
        levels
    }

    #[test]
    fn dpad_table_is_exact() {
        let expected = [
            0xF, 0x6, 0x2, 0xF, 0x0, 0x7, 0x1, 0x0, 0x4, 0x5, 0x3, 0x4, 0xF, 0x6, 0x2, 0xF,
        ];
        for index in 0..16u8 {
            assert_eq!(dpad_code(index), expected[index as usize], "index {}", index);
            let levels = dpad_levels(index);
            assert_eq!(dpad_index(&levels, &L), index);
            assert_eq!(build_report(&levels, &L).dpad(), expected[index as usize]);
        }
    }

    #[test]
    fn dpad_index_uses_layout_bit_order() {
        // Default wiring: bit0 = pin 6, bit1 = pin 8, bit2 = pin 9, bit3 = pin 7.
        assert_eq!(dpad_index(&with(&[6]), &L), 0b0001);
        assert_eq!(dpad_index(&with(&[8]), &L), 0b0010);
        assert_eq!(dpad_index(&with(&[9]), &L), 0b0100);
        assert_eq!(dpad_index(&with(&[7]), &L), 0b1000);
    }

    #[test]
    fn dpad_code_ignores_upper_bits() {
        assert_eq!(dpad_code(0xF4), dpad_code(0x04));
    }

    #[test]
    fn all_released_is_neutral() {
        let report = build_report(&released(), &L);
        assert!(report.is_neutral());
        assert_eq!(report.dpad(), DPAD_NEUTRAL);
    }

    #[test]
    fn direct_button_mapping() {
        let cases = [
            (L.system, Button::Menu),
            (L.options, Button::Options),
            (L.stadia, Button::Stadia),
            (L.capture, Button::Capture),
            (L.l3, Button::L3),
            (L.r3, Button::R3),
            (L.x, Button::X),
            (L.y, Button::Y),
            (L.r1, Button::R1),
            (L.l1, Button::L1),
            (L.a, Button::A),
            (L.b, Button::B),
            (L.r2, Button::R2),
            (L.l2, Button::L2),
        ];
        for (pin, button) in cases {
            let report = build_report(&with(&[pin]), &L);
            assert!(report.button(button), "{:?}", button);
            let others = Button::ALL.iter().filter(|&&b| b != button);
            for &other in others {
                assert!(!report.button(other), "{:?} leaked into {:?}", button, other);
            }
        }
    }

    #[test]
    fn assistant_is_never_driven() {
        let all: PinLevels = [true; BUTTON_COUNT];
        assert!(!build_report(&all, &L).button(Button::Assistant));
    }

    #[test]
    fn triggers_drive_axes_digitally() {
        let report = build_report(&with(&[L.l2]), &L);
        assert_eq!(report.axis(Axis::L2), 0xFF);
        assert_eq!(report.axis(Axis::R2), 0);

        let report = build_report(&with(&[L.r2]), &L);
        assert_eq!(report.axis(Axis::L2), 0);
        assert_eq!(report.axis(Axis::R2), 0xFF);
    }

    #[test]
    fn sticks_stay_centred() {
        let all: PinLevels = [true; BUTTON_COUNT];
        let report = build_report(&all, &L);
        for axis in [Axis::LeftX, Axis::LeftY, Axis::RightX, Axis::RightY] {
            assert_eq!(report.axis(axis), 0x80);
        }
    }

    #[test]
    fn system_button_edges() {
        let mut button = SystemButton::new();
        assert_eq!(button.update(false, 0), None);
        assert_eq!(button.update(true, 100), None);
        assert!(button.is_pressed());
        assert_eq!(button.update(true, 2_000), None);
        assert_eq!(button.update(false, 3_100), Some(3_000));
        assert!(!button.is_pressed());
        // Edge state reset: a new press measures from its own edge.
        assert_eq!(button.update(true, 5_000), None);
        assert_eq!(button.update(false, 5_010), Some(10));
    }

    #[test]
    fn unchanged_input_enqueues_nothing() {
        let queue = ReportQueue::new();
        let mut sampler = Sampler::new(L);
        for now in 0..100 {
            let outcome = sampler.tick(&released(), now, &queue);
            assert!(!outcome.changed);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn each_change_enqueues_once() {
        let queue = ReportQueue::new();
        let mut sampler = Sampler::new(L);

        assert!(sampler.tick(&with(&[L.a]), 0, &queue).changed);
        assert!(!sampler.tick(&with(&[L.a]), 1, &queue).changed);
        assert!(sampler.tick(&released(), 2, &queue).changed);
        assert!(!sampler.tick(&released(), 3, &queue).changed);

        assert_eq!(queue.len(), 2);
        assert!(queue.try_dequeue().unwrap().button(Button::A));
        assert!(queue.try_dequeue().unwrap().is_neutral());
        assert!(sampler.previous().is_neutral());
    }

    #[test]
    fn full_queue_drops_without_retry() {
        let queue = ReportQueue::new();
        for _ in 0..REPORT_QUEUE_CAPACITY {
            queue.enqueue(neutral_report()).unwrap();
        }

        let mut sampler = Sampler::new(L);
        let outcome = sampler.tick(&with(&[L.b]), 0, &queue);
        assert!(outcome.changed);
        assert!(outcome.dropped);
        assert!(sampler.previous().button(Button::B));

        // Same input next tick: no second attempt.
        let outcome = sampler.tick(&with(&[L.b]), 1, &queue);
        assert!(!outcome.changed);
        assert_eq!(queue.len(), REPORT_QUEUE_CAPACITY);
    }

    #[test]
    fn long_press_tiers_through_sampler() {
        let cases = [
            (2_999, None),
            (3_000, Some(SystemAction::ClearBonds)),
            (9_999, Some(SystemAction::ClearBonds)),
            (10_000, Some(SystemAction::ResetToBootloader)),
        ];
        for (hold, expected) in cases {
            let queue = ReportQueue::new();
            let mut sampler = Sampler::new(L);
            let press = sampler.tick(&with(&[L.system]), 1_000, &queue);
            assert_eq!(press.action, None);
            let release = sampler.tick(&released(), 1_000 + hold, &queue);
            assert_eq!(release.action, expected, "hold {}", hold);
        }
    }

    #[test]
    fn system_button_is_reported_as_menu() {
        let queue = ReportQueue::new();
        let mut sampler = Sampler::new(L);
        sampler.tick(&with(&[L.system]), 0, &queue);
        assert!(queue.try_dequeue().unwrap().button(Button::Menu));
    }
}
