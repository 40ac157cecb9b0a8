use super::MAX_DEGREE;

const RANDOM_BYTE: u8 = 253;
const HOLD_BYTE: u8 = 254;
const REST_BYTE: u8 = 255;

/// What a single step of a part plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepNote {
    /// A scale degree, 0–48, relative to the part's base note.
    Degree(u8),
    /// A degree picked uniformly at random from 0–47 each time the step plays.
    Random,
    /// Leaves whatever the part is playing untouched.
    Hold,
    /// Silences the part.
    Rest,
}

impl StepNote {
    /// Decodes the stored byte form. Degrees above 48 and unknown markers decode as [`StepNote::Rest`].
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0..=MAX_DEGREE => Self::Degree(byte),
            RANDOM_BYTE => Self::Random,
            HOLD_BYTE => Self::Hold,
            _ => Self::Rest,
        }
    }

    /// Encodes to the stored byte form.
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Degree(degree) => degree.min(MAX_DEGREE),
            Self::Random => RANDOM_BYTE,
            Self::Hold => HOLD_BYTE,
            Self::Rest => REST_BYTE,
        }
    }
}
