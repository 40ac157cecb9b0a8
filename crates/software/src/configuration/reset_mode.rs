use num_derive::{FromPrimitive, ToPrimitive};

/// Determines where playback resumes after a reset (reset input, MIDI start, or a new song load).
#[derive(Debug, Default, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetMode {
    /// Restart the whole song from sequence 0.
    #[default]
    Song,
    /// Restart the sequence currently playing.
    Sequence,
}

impl super::CycleConfig for ResetMode {}
