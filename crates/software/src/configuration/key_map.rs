use num_derive::{FromPrimitive, ToPrimitive};

/// Determines how incoming MIDI note numbers are mapped onto sequencer functions.
///
/// Two layouts exist so a controller's keyboard can be split either with sequence triggers at the bottom (map A)
/// or with the transpose octave at the bottom (map B). The key-map-flip override swaps between them live.
#[derive(Debug, Default, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyMap {
    /// Sequence triggers on notes 24–39, transport keys on 41–47, transpose on 48–72.
    #[default]
    A,
    /// Transpose on notes 24–47, sequence triggers on 48–63, transport keys on 65–71.
    B,
}

impl KeyMap {
    /// Returns the other layout.
    pub fn flipped(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl super::CycleConfig for KeyMap {}
