//! Scale quantization and octave-span folding for step degrees.
//!
//! Step degrees run from 0 to [`MAX_DEGREE`](crate::song::MAX_DEGREE), i.e., four octaves above the base note. Both
//! transforms only ever move a degree down, so a quantized note never lands above what was programmed.

use crate::song::MAX_DEGREE;
use num_derive::{FromPrimitive, ToPrimitive};

const MAJOR: &[u8] = &[0, 2, 4, 5, 7, 9, 11];
const NATURAL_MINOR: &[u8] = &[0, 2, 3, 5, 7, 8, 10];
const HARMONIC_MINOR: &[u8] = &[0, 2, 3, 5, 7, 8, 11];
const WHOLE_TONE: &[u8] = &[0, 2, 4, 6, 8, 10];
const PENTATONIC: &[u8] = &[0, 2, 4, 7, 9];
const DIMINISHED: &[u8] = &[0, 2, 3, 5, 6, 8, 9, 11];

/// The scale a part's degrees are quantized to.
#[derive(Debug, Default, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Scale {
    /// Every semitone; degrees pass through untouched.
    #[default]
    Chromatic,
    /// Ionian.
    Major,
    /// Aeolian.
    NaturalMinor,
    /// Aeolian with a raised seventh.
    HarmonicMinor,
    /// Six equal steps per octave.
    WholeTone,
    /// Major pentatonic.
    Pentatonic,
    /// Whole-half octatonic.
    Diminished,
    /// Degrees are used as raw control levels rather than pitches; no quantization.
    Level,
}

impl Scale {
    fn pitch_classes(&self) -> Option<&'static [u8]> {
        match self {
            Self::Chromatic | Self::Level => None,
            Self::Major => Some(MAJOR),
            Self::NaturalMinor => Some(NATURAL_MINOR),
            Self::HarmonicMinor => Some(HARMONIC_MINOR),
            Self::WholeTone => Some(WHOLE_TONE),
            Self::Pentatonic => Some(PENTATONIC),
            Self::Diminished => Some(DIMINISHED),
        }
    }

    /// Snaps a degree down to the nearest member of the scale.
    ///
    /// Degrees above [`MAX_DEGREE`] are returned unchanged.
    pub fn quantize(&self, degree: u8) -> u8 {
        if degree > MAX_DEGREE {
            return degree;
        }
        let Some(pitch_classes) = self.pitch_classes() else {
            return degree;
        };

        let octave = degree / 12;
        let pitch_class = degree % 12;
        // every table starts at 0, so a match always exists
        let snapped = pitch_classes
            .iter()
            .rev()
            .find(|&&pc| pc <= pitch_class)
            .copied()
            .unwrap_or(0);
        octave * 12 + snapped
    }
}

/// Folds a degree down so it falls within a span of 1–4 octaves.
///
/// Upper octaves are shifted down by whole octaves. A span of 1 lands every degree in 12–24, one octave above the
/// base note. Degrees above [`MAX_DEGREE`] and unknown spans pass through unchanged.
pub fn span_adjust(degree: u8, span: u8) -> u8 {
    if degree > MAX_DEGREE {
        return degree;
    }
    match span {
        3 if degree > 36 => degree - 12,
        2 if degree > 24 => degree - 12,
        1 => match degree {
            37.. => degree - 24,
            25..=36 => degree - 12,
            13..=24 => degree,
            _ => degree + 12,
        },
        _ => degree,
    }
}
