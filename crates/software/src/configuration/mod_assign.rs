use crate::overrides::ControlTarget;
use num_derive::{FromPrimitive, ToPrimitive};

/// Determines what a mod CV input controls.
///
/// The key-map flip is deliberately absent: it is only reachable over MIDI.
#[derive(Debug, Default, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModAssign {
    /// The input is ignored.
    #[default]
    None,
    /// Jumps to a sequence.
    NextSequence,
    /// Overrides the start step.
    Start,
    /// Overrides the sequence length.
    Length,
    /// Stops and restarts the transport.
    RunStop,
    /// Overrides part one's gate length.
    GateOne,
    /// Overrides part two's gate length.
    GateTwo,
    /// Flips forward and backward playback.
    Direction,
}

impl ModAssign {
    /// The override the input drives, if any.
    pub fn target(&self) -> Option<ControlTarget> {
        match self {
            Self::None => None,
            Self::NextSequence => Some(ControlTarget::NextSequence),
            Self::Start => Some(ControlTarget::Start),
            Self::Length => Some(ControlTarget::Length),
            Self::RunStop => Some(ControlTarget::RunStop),
            Self::GateOne => Some(ControlTarget::GateOne),
            Self::GateTwo => Some(ControlTarget::GateTwo),
            Self::Direction => Some(ControlTarget::Direction),
        }
    }
}

impl super::CycleConfig for ModAssign {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::CycleConfig;

    #[test]
    fn cycles_through_every_target() {
        let mut assign = ModAssign::None;
        let mut targets = 0;
        loop {
            assign = assign.cycle();
            if assign == ModAssign::None {
                break;
            }
            assert!(assign.target().is_some(), "Every assignment but None should drive a target");
            targets += 1;
        }
        assert_eq!(7, targets, "Expected left but got right");
    }
}
