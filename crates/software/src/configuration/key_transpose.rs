use crate::song::Part;
use num_derive::{FromPrimitive, ToPrimitive};

/// Determines which parts follow transpose keys received over MIDI.
#[derive(Debug, Default, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyTranspose {
    /// Transpose keys are ignored.
    Off,
    /// Only part one is transposed.
    PartOne,
    /// Only part two is transposed.
    PartTwo,
    /// Both parts are transposed together.
    #[default]
    BothParts,
}

impl KeyTranspose {
    /// Returns `true` if transpose keys should affect the given part.
    pub fn applies_to(&self, part: Part) -> bool {
        match self {
            Self::Off => false,
            Self::PartOne => part == Part::One,
            Self::PartTwo => part == Part::Two,
            Self::BothParts => true,
        }
    }
}

impl super::CycleConfig for KeyTranspose {}
