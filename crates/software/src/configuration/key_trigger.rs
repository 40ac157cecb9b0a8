use num_derive::{FromPrimitive, ToPrimitive};

/// Determines what releasing a sequence trigger key does.
#[derive(Debug, Default, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyTrigger {
    /// The triggered sequence keeps playing after the key is released.
    #[default]
    Latch,
    /// Playback stops when the most recently pressed trigger key is released.
    Momentary,
}

impl super::CycleConfig for KeyTrigger {}
