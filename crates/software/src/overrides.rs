//! Live performance overrides which take precedence over stored pattern data until restored.

use crate::song::{NUM_SEQUENCES, Part};
use num_derive::{FromPrimitive, ToPrimitive};
use wmidi::U7;

/// The value a MIDI controller or mod CV input writes to.
#[derive(Debug, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlTarget {
    /// Jumps to a sequence, 0–15.
    NextSequence = 1,
    /// First step, 0–15.
    Start = 2,
    /// Sequence length, 1–16.
    Length = 3,
    /// Holds the transport stopped or lets it run.
    RunStop = 4,
    /// Part one's gate length, 1–32.
    GateOne = 5,
    /// Part two's gate length, 1–32.
    GateTwo = 6,
    /// Swaps forward and backward playback.
    Direction = 7,
    /// Swaps the MIDI key maps.
    KeyMap = 8,
}

/// What the engine must do in response to a control change, beyond recording the override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlAction {
    /// Move to the given sequence.
    JumpTo(u8),
    /// The run/stop control moved to "run".
    Run,
    /// The run/stop control moved to "stop".
    Stop,
}

/// The set of overrides currently in effect. A field of `None` (or `false`) defers to the stored pattern value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControlOverrides {
    start: Option<u8>,
    length: Option<u8>,
    gate: [Option<u8>; 2],
    direction_flip: bool,
    transpose: [Option<i8>; 2],
    run_stop_hold: bool,
    key_map_flip: bool,
}

impl ControlOverrides {
    /// Scales a 0–127 control value into the target's native range and records it.
    ///
    /// Jumps and run/stop transitions are returned for the caller to act on; run/stop only reports a change of state,
    /// so a controller parked at one end does not retrigger the transport.
    pub fn apply(&mut self, target: ControlTarget, value: U7) -> Option<ControlAction> {
        let value = u8::from(value);
        let high = value >= 64;
        match target {
            ControlTarget::NextSequence => Some(ControlAction::JumpTo((value >> 3).min(NUM_SEQUENCES - 1))),
            ControlTarget::Start => {
                self.start = Some(value >> 3);
                None
            }
            ControlTarget::Length => {
                self.length = Some((value >> 3) + 1);
                None
            }
            ControlTarget::RunStop => {
                let hold = !high;
                if hold == self.run_stop_hold {
                    return None;
                }
                self.run_stop_hold = hold;
                Some(if hold { ControlAction::Stop } else { ControlAction::Run })
            }
            ControlTarget::GateOne => {
                self.gate[Part::One.index()] = Some((value >> 2) + 1);
                None
            }
            ControlTarget::GateTwo => {
                self.gate[Part::Two.index()] = Some((value >> 2) + 1);
                None
            }
            ControlTarget::Direction => {
                self.direction_flip = high;
                None
            }
            ControlTarget::KeyMap => {
                self.key_map_flip = high;
                None
            }
        }
    }

    /// Clears every override.
    pub fn restore(&mut self) {
        *self = Self::default();
    }

    /// Clears only the run/stop override, so the panel switch regains control.
    pub fn restore_run_stop(&mut self) {
        self.run_stop_hold = false;
    }

    /// Returns `true` if no override is in effect.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Start step override.
    pub fn start(&self) -> Option<u8> {
        self.start
    }

    /// Length override.
    pub fn length(&self) -> Option<u8> {
        self.length
    }

    /// Gate length override for a part.
    pub fn gate(&self, part: Part) -> Option<u8> {
        self.gate[part.index()]
    }

    /// Whether forward and backward playback are swapped.
    pub fn direction_flip(&self) -> bool {
        self.direction_flip
    }

    /// Transpose override for a part, replacing the stored offset while present.
    pub fn transpose(&self, part: Part) -> Option<i8> {
        self.transpose[part.index()]
    }

    /// Sets a part's transpose override, clamped to ±12 semitones.
    pub fn set_transpose(&mut self, part: Part, semitones: i8) {
        self.transpose[part.index()] = Some(semitones.clamp(-12, 12));
    }

    /// Whether the run/stop override is holding the transport stopped.
    pub fn run_stop_hold(&self) -> bool {
        self.run_stop_hold
    }

    /// Whether the MIDI key maps are swapped.
    pub fn key_map_flip(&self) -> bool {
        self.key_map_flip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(overrides: &mut ControlOverrides, target: ControlTarget, value: u8) -> Option<ControlAction> {
        overrides.apply(target, U7::from_u8_lossy(value))
    }

    #[test]
    fn scaling() {
        let mut overrides = ControlOverrides::default();

        assert_eq!(Some(ControlAction::JumpTo(0)), apply(&mut overrides, ControlTarget::NextSequence, 7));
        assert_eq!(Some(ControlAction::JumpTo(15)), apply(&mut overrides, ControlTarget::NextSequence, 127));

        apply(&mut overrides, ControlTarget::Start, 127);
        assert_eq!(Some(15), overrides.start(), "Expected left but got right");
        apply(&mut overrides, ControlTarget::Start, 8);
        assert_eq!(Some(1), overrides.start(), "Expected left but got right");

        apply(&mut overrides, ControlTarget::Length, 0);
        assert_eq!(Some(1), overrides.length(), "Expected left but got right");
        apply(&mut overrides, ControlTarget::Length, 127);
        assert_eq!(Some(16), overrides.length(), "Expected left but got right");

        apply(&mut overrides, ControlTarget::GateOne, 0);
        assert_eq!(Some(1), overrides.gate(Part::One), "Expected left but got right");
        apply(&mut overrides, ControlTarget::GateTwo, 127);
        assert_eq!(Some(32), overrides.gate(Part::Two), "Expected left but got right");

        apply(&mut overrides, ControlTarget::Direction, 63);
        assert!(!overrides.direction_flip());
        apply(&mut overrides, ControlTarget::Direction, 64);
        assert!(overrides.direction_flip());

        apply(&mut overrides, ControlTarget::KeyMap, 100);
        assert!(overrides.key_map_flip());
    }

    #[test]
    fn run_stop_reports_transitions_only() {
        let mut overrides = ControlOverrides::default();
        assert_eq!(None, apply(&mut overrides, ControlTarget::RunStop, 127), "Already running");
        assert_eq!(Some(ControlAction::Stop), apply(&mut overrides, ControlTarget::RunStop, 10));
        assert_eq!(None, apply(&mut overrides, ControlTarget::RunStop, 0), "Already held");
        assert!(overrides.run_stop_hold());
        assert_eq!(Some(ControlAction::Run), apply(&mut overrides, ControlTarget::RunStop, 64));
        assert!(!overrides.run_stop_hold());
    }

    #[test]
    fn restore_clears_everything() {
        let mut overrides = ControlOverrides::default();
        apply(&mut overrides, ControlTarget::Start, 40);
        apply(&mut overrides, ControlTarget::RunStop, 0);
        overrides.set_transpose(Part::Two, 0);
        assert!(!overrides.is_empty());

        overrides.restore_run_stop();
        assert!(!overrides.run_stop_hold());
        assert_eq!(Some(5), overrides.start(), "Restoring run/stop should leave the start override alone");

        overrides.restore();
        assert!(overrides.is_empty());
    }

    #[test]
    fn zero_transpose_is_distinct_from_absent() {
        let mut overrides = ControlOverrides::default();
        assert_eq!(None, overrides.transpose(Part::One), "Expected left but got right");
        overrides.set_transpose(Part::One, 0);
        assert_eq!(Some(0), overrides.transpose(Part::One), "Expected left but got right");
        overrides.set_transpose(Part::Two, 30);
        assert_eq!(Some(12), overrides.transpose(Part::Two), "Expected left but got right");
    }
}
