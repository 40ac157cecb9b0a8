//! Pattern data: sixteen [`Sequence`]s of sixteen steps for two parts, and the [`SongStore`] accessors the engine reads
//! them through.

mod sequence;
pub use sequence::*;

mod step;
pub use step::*;

use crate::scale::Scale;
use num_derive::{FromPrimitive, ToPrimitive};

/// Number of sequences in a song.
pub const NUM_SEQUENCES: u8 = 16;
/// Number of steps in a sequence. Step indices always wrap within this range, whatever the configured length.
pub const NUM_STEPS: u8 = 16;
/// Highest programmable step degree: four octaves above the base note.
pub const MAX_DEGREE: u8 = 48;
/// Highest per-sequence loop count.
pub const MAX_LOOPS: u8 = 15;

/// One of the two voices every sequence drives.
#[derive(Debug, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Part {
    /// The first voice.
    One,
    /// The second voice.
    Two,
}

impl Part {
    /// Both parts, in order.
    pub const ALL: [Part; 2] = [Part::One, Part::Two];

    /// Zero-based index, for addressing per-part arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Converts a raw part number, ignoring anything other than 0 and 1.
    pub fn from_index(index: u8) -> Option<Self> {
        num_traits::FromPrimitive::from_u8(index)
    }
}

/// The order in which a sequence's steps are visited.
#[derive(Debug, Default, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// From the last step down to the first.
    Backward,
    /// Forward then backward, turning around at each end without repeating the end steps.
    PingPong,
    /// A uniformly random step each time; loop counting proceeds as though playing forward.
    Random,
    /// From the first step up to the last.
    #[default]
    Forward,
}

impl Direction {
    /// Swaps forward and backward; other directions are unaffected.
    pub fn flipped(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
            other => other,
        }
    }
}

/// Read-only access to stored pattern data, addressed by sequence index.
///
/// Accessors never fail: an out-of-range sequence or step yields a safe default rather than an error, as nothing
/// upstream of the engine can act on one.
pub trait SongStore {
    /// First step played, 0–15.
    fn start(&self, seq: u8) -> u8;
    /// Number of steps in a pass, 1–16.
    fn length(&self, seq: u8) -> u8;
    /// Traversal order.
    fn direction(&self, seq: u8) -> Direction;
    /// Number of additional passes before chaining, 0–15.
    fn loop_count(&self, seq: u8) -> u8;
    /// The sequence chained to once looping is complete.
    fn next_sequence(&self, seq: u8) -> u8;
    /// Gate length in clock ticks, 1–48.
    fn gate(&self, seq: u8, part: Part) -> u8;
    /// Scale degrees are quantized to.
    fn scale(&self, seq: u8, part: Part) -> Scale;
    /// Octave span, 1–4.
    fn span(&self, seq: u8, part: Part) -> u8;
    /// Transposition in semitones, −12..=12.
    fn offset(&self, seq: u8, part: Part) -> i8;
    /// What a step plays.
    fn note(&self, seq: u8, part: Part, step: u8) -> StepNote;
    /// Step length in clock ticks; 0 means use the global clock divider.
    fn step_length(&self, seq: u8, step: u8) -> u8;
}

/// An in-memory song.
#[derive(Clone, Debug, PartialEq)]
pub struct Song {
    sequences: [Sequence; NUM_SEQUENCES as usize],
}

static FALLBACK: Sequence = Sequence::blank(0);

impl Default for Song {
    fn default() -> Self {
        Self::new()
    }
}

impl Song {
    /// Constructs a factory-blank song.
    pub fn new() -> Self {
        let mut sequences = [Sequence::blank(0); NUM_SEQUENCES as usize];
        for (index, sequence) in sequences.iter_mut().enumerate() {
            *sequence = Sequence::blank(index as u8);
        }
        Self { sequences }
    }

    /// Returns every sequence to factory blank.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Returns a sequence; out-of-range indices yield a factory-blank sequence.
    pub fn sequence(&self, seq: u8) -> &Sequence {
        self.sequences.get(seq as usize).unwrap_or(&FALLBACK)
    }

    /// Returns a sequence for editing, or `None` if the index is out of range.
    pub fn sequence_mut(&mut self, seq: u8) -> Option<&mut Sequence> {
        self.sequences.get_mut(seq as usize)
    }

    /// Replaces a sequence; out-of-range indices are ignored.
    pub fn set_sequence(&mut self, seq: u8, sequence: Sequence) {
        if let Some(slot) = self.sequence_mut(seq) {
            *slot = sequence;
        }
    }
}

impl SongStore for Song {
    fn start(&self, seq: u8) -> u8 {
        self.sequence(seq).start()
    }

    fn length(&self, seq: u8) -> u8 {
        self.sequence(seq).length()
    }

    fn direction(&self, seq: u8) -> Direction {
        self.sequence(seq).direction()
    }

    fn loop_count(&self, seq: u8) -> u8 {
        self.sequence(seq).loop_count()
    }

    fn next_sequence(&self, seq: u8) -> u8 {
        self.sequence(seq).next_sequence()
    }

    fn gate(&self, seq: u8, part: Part) -> u8 {
        self.sequence(seq).part(part).gate()
    }

    fn scale(&self, seq: u8, part: Part) -> Scale {
        self.sequence(seq).part(part).scale()
    }

    fn span(&self, seq: u8, part: Part) -> u8 {
        self.sequence(seq).part(part).span()
    }

    fn offset(&self, seq: u8, part: Part) -> i8 {
        self.sequence(seq).part(part).offset()
    }

    fn note(&self, seq: u8, part: Part, step: u8) -> StepNote {
        self.sequence(seq).note(part, step)
    }

    fn step_length(&self, seq: u8, step: u8) -> u8 {
        self.sequence(seq).step_length(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_song_chains_each_sequence_to_itself() {
        let song = Song::new();
        for seq in 0..NUM_SEQUENCES {
            assert_eq!(seq, song.next_sequence(seq), "Expected left but got right");
            assert_eq!(16, song.length(seq), "Expected left but got right");
            assert_eq!(Direction::Forward, song.direction(seq), "Expected left but got right");
        }
    }

    #[test]
    fn blank_song_is_all_rests() {
        let song = Song::new();
        for part in Part::ALL {
            for step in 0..NUM_STEPS {
                assert_eq!(StepNote::Rest, song.note(3, part, step), "Expected left but got right");
            }
        }
    }

    #[test]
    fn out_of_range_sequence_reads_as_blank() {
        let song = Song::new();
        assert_eq!(16, song.length(200), "Expected left but got right");
        assert_eq!(0, song.start(200), "Expected left but got right");
        assert_eq!(StepNote::Rest, song.note(200, Part::Two, 3), "Expected left but got right");
    }

    #[test]
    fn direction_flip_only_swaps_forward_and_backward() {
        assert_eq!(Direction::Backward, Direction::Forward.flipped());
        assert_eq!(Direction::Forward, Direction::Backward.flipped());
        assert_eq!(Direction::PingPong, Direction::PingPong.flipped());
        assert_eq!(Direction::Random, Direction::Random.flipped());
    }

    #[test]
    fn part_from_index() {
        assert_eq!(Some(Part::One), Part::from_index(0));
        assert_eq!(Some(Part::Two), Part::from_index(1));
        assert_eq!(None, Part::from_index(2));
    }
}
