use super::{Direction, MAX_DEGREE, MAX_LOOPS, NUM_SEQUENCES, NUM_STEPS, Part, StepNote};
use crate::scale::Scale;
use num_traits::{FromPrimitive, ToPrimitive};

/// Size in bytes of a serialized [`Sequence`].
pub const SEQUENCE_IMAGE_SIZE: usize = 128;

/// Largest per-step length override in clock ticks.
pub const MAX_STEP_LENGTH: u8 = 31;
/// Largest stored gate length in clock ticks.
pub const MAX_GATE: u8 = 48;
/// Largest octave span.
pub const MAX_SPAN: u8 = 4;
/// Largest transposition in semitones, in either direction.
pub const MAX_OFFSET: i8 = 12;

const IMAGE_NOTES: [usize; 2] = [0, 16];
const IMAGE_STEP_LENGTHS: usize = 32;
const IMAGE_START: usize = 64;
const IMAGE_LENGTH: usize = 65;
const IMAGE_DIRECTION: usize = 66;
const IMAGE_LOOP_COUNT: usize = 67;
const IMAGE_NEXT_SEQUENCE: usize = 68;
const IMAGE_PART_PARAMS: [usize; 2] = [69, 73];
const IMAGE_VERSION: usize = 126;
const IMAGE_MARK: usize = 127;

const IMAGE_VERSION_NUMBER: u8 = 0x01;
const CONFIGURED_MARK: u8 = 0x55;
// filler for unused regions so a half-written image is easy to spot in a dump
const PADDING: [(usize, usize, u8); 3] = [(48, 64, 0xe1), (77, 96, 0xe2), (96, 126, 0xe3)];

/// Per-part settings of a sequence.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PartSettings {
    gate: u8,
    scale: Scale,
    span: u8,
    offset: i8,
}

impl PartSettings {
    const fn blank() -> Self {
        Self {
            gate: 5,
            scale: Scale::Chromatic,
            span: MAX_SPAN,
            offset: 0,
        }
    }

    /// Gate length in clock ticks.
    pub fn gate(&self) -> u8 {
        self.gate
    }

    /// Sets the gate length, clamped to 1–48 ticks.
    pub fn set_gate(&mut self, gate: u8) {
        self.gate = gate.clamp(1, MAX_GATE);
    }

    /// Scale degrees are quantized to.
    pub fn scale(&self) -> Scale {
        self.scale
    }

    /// Sets the quantization scale.
    pub fn set_scale(&mut self, scale: Scale) {
        self.scale = scale;
    }

    /// Octave span.
    pub fn span(&self) -> u8 {
        self.span
    }

    /// Sets the octave span, clamped to 1–4.
    pub fn set_span(&mut self, span: u8) {
        self.span = span.clamp(1, MAX_SPAN);
    }

    /// Transposition in semitones.
    pub fn offset(&self) -> i8 {
        self.offset
    }

    /// Sets the transposition, clamped to ±12 semitones.
    pub fn set_offset(&mut self, offset: i8) {
        self.offset = offset.clamp(-MAX_OFFSET, MAX_OFFSET);
    }
}

/// A single pattern: traversal parameters plus sixteen steps for each part.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sequence {
    start: u8,
    length: u8,
    direction: Direction,
    loop_count: u8,
    next_sequence: u8,
    parts: [PartSettings; 2],
    notes: [[StepNote; NUM_STEPS as usize]; 2],
    step_lengths: [u8; NUM_STEPS as usize],
}

impl Sequence {
    /// A factory-blank sequence: every step a rest, full length, chained to itself.
    pub const fn blank(index: u8) -> Self {
        Self {
            start: 0,
            length: NUM_STEPS,
            direction: Direction::Forward,
            loop_count: 0,
            next_sequence: index % NUM_SEQUENCES,
            parts: [PartSettings::blank(); 2],
            notes: [[StepNote::Rest; NUM_STEPS as usize]; 2],
            step_lengths: [0; NUM_STEPS as usize],
        }
    }

    /// First step played.
    pub fn start(&self) -> u8 {
        self.start
    }

    /// Sets the first step, clamped to 0–15.
    pub fn set_start(&mut self, start: u8) {
        self.start = start.min(NUM_STEPS - 1);
    }

    /// Number of steps in a pass.
    pub fn length(&self) -> u8 {
        self.length
    }

    /// Sets the number of steps in a pass, clamped to 1–16.
    pub fn set_length(&mut self, length: u8) {
        self.length = length.clamp(1, NUM_STEPS);
    }

    /// Traversal order.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Sets the traversal order.
    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    /// Additional passes before chaining.
    pub fn loop_count(&self) -> u8 {
        self.loop_count
    }

    /// Sets the number of additional passes, clamped to 0–15.
    pub fn set_loop_count(&mut self, loop_count: u8) {
        self.loop_count = loop_count.min(MAX_LOOPS);
    }

    /// The sequence chained to when looping completes.
    pub fn next_sequence(&self) -> u8 {
        self.next_sequence
    }

    /// Sets the chained sequence, clamped to 0–15.
    pub fn set_next_sequence(&mut self, next_sequence: u8) {
        self.next_sequence = next_sequence.min(NUM_SEQUENCES - 1);
    }

    /// Per-part settings.
    pub fn part(&self, part: Part) -> &PartSettings {
        &self.parts[part.index()]
    }

    /// Per-part settings, for editing.
    pub fn part_mut(&mut self, part: Part) -> &mut PartSettings {
        &mut self.parts[part.index()]
    }

    /// What a step plays; out-of-range steps read as rests.
    pub fn note(&self, part: Part, step: u8) -> StepNote {
        self.notes[part.index()]
            .get(step as usize)
            .copied()
            .unwrap_or(StepNote::Rest)
    }

    /// Programs a step; out-of-range steps are ignored and degrees are clamped to 48.
    pub fn set_note(&mut self, part: Part, step: u8, note: StepNote) {
        let note = match note {
            StepNote::Degree(degree) => StepNote::Degree(degree.min(MAX_DEGREE)),
            other => other,
        };
        if let Some(slot) = self.notes[part.index()].get_mut(step as usize) {
            *slot = note;
        }
    }

    /// A step's length override in clock ticks, 0 when the global divider applies.
    pub fn step_length(&self, step: u8) -> u8 {
        self.step_lengths.get(step as usize).copied().unwrap_or(0)
    }

    /// Sets a step's length override, clamped to 0–31; out-of-range steps are ignored.
    pub fn set_step_length(&mut self, step: u8, length: u8) {
        if let Some(slot) = self.step_lengths.get_mut(step as usize) {
            *slot = length.min(MAX_STEP_LENGTH);
        }
    }

    /// Serializes to the stored image, which ends with a version byte and the configured marker.
    pub fn to_image(&self) -> [u8; SEQUENCE_IMAGE_SIZE] {
        let mut image = [0; SEQUENCE_IMAGE_SIZE];
        for (from, to, fill) in PADDING {
            image[from..to].fill(fill);
        }

        for part in Part::ALL {
            let base = IMAGE_NOTES[part.index()];
            for (offset, note) in self.notes[part.index()].iter().enumerate() {
                image[base + offset] = note.to_byte();
            }

            let params = IMAGE_PART_PARAMS[part.index()];
            let settings = self.part(part);
            image[params] = settings.gate;
            image[params + 1] = settings.scale.to_u8().unwrap_or(0);
            image[params + 2] = settings.span;
            image[params + 3] = settings.offset as u8;
        }
        image[IMAGE_STEP_LENGTHS..IMAGE_STEP_LENGTHS + NUM_STEPS as usize].copy_from_slice(&self.step_lengths);

        image[IMAGE_START] = self.start;
        image[IMAGE_LENGTH] = self.length;
        image[IMAGE_DIRECTION] = self.direction.to_u8().unwrap_or(0);
        image[IMAGE_LOOP_COUNT] = self.loop_count;
        image[IMAGE_NEXT_SEQUENCE] = self.next_sequence;
        image[IMAGE_VERSION] = IMAGE_VERSION_NUMBER;
        image[IMAGE_MARK] = CONFIGURED_MARK;
        image
    }

    /// Deserializes a stored image, returning `None` if the configured marker is missing.
    ///
    /// Every field is clamped to its legal range, so a damaged image still yields a playable sequence.
    pub fn from_image(image: &[u8; SEQUENCE_IMAGE_SIZE]) -> Option<Self> {
        if image[IMAGE_MARK] != CONFIGURED_MARK {
            return None;
        }

        let mut sequence = Self::blank(0);
        sequence.set_start(image[IMAGE_START]);
        sequence.set_length(image[IMAGE_LENGTH]);
        sequence.set_direction(Direction::from_u8(image[IMAGE_DIRECTION]).unwrap_or_default());
        sequence.set_loop_count(image[IMAGE_LOOP_COUNT]);
        sequence.set_next_sequence(image[IMAGE_NEXT_SEQUENCE]);

        for part in Part::ALL {
            let base = IMAGE_NOTES[part.index()];
            for step in 0..NUM_STEPS {
                sequence.set_note(part, step, StepNote::from_byte(image[base + step as usize]));
            }

            let params = IMAGE_PART_PARAMS[part.index()];
            let settings = sequence.part_mut(part);
            settings.set_gate(image[params]);
            settings.set_scale(Scale::from_u8(image[params + 1]).unwrap_or_default());
            settings.set_span(image[params + 2]);
            settings.set_offset(image[params + 3] as i8);
        }
        for step in 0..NUM_STEPS {
            sequence.set_step_length(step, image[IMAGE_STEP_LENGTHS + step as usize]);
        }
        Some(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_clamp() {
        let mut sequence = Sequence::blank(2);
        sequence.set_start(40);
        sequence.set_length(0);
        sequence.set_loop_count(99);
        sequence.set_next_sequence(16);
        sequence.set_step_length(3, 200);
        sequence.set_note(Part::One, 0, StepNote::Degree(60));
        sequence.part_mut(Part::Two).set_offset(-40);
        sequence.part_mut(Part::Two).set_gate(0);
        sequence.part_mut(Part::Two).set_span(9);

        assert_eq!(15, sequence.start(), "Expected left but got right");
        assert_eq!(1, sequence.length(), "Expected left but got right");
        assert_eq!(15, sequence.loop_count(), "Expected left but got right");
        assert_eq!(15, sequence.next_sequence(), "Expected left but got right");
        assert_eq!(31, sequence.step_length(3), "Expected left but got right");
        assert_eq!(StepNote::Degree(48), sequence.note(Part::One, 0), "Expected left but got right");
        assert_eq!(-12, sequence.part(Part::Two).offset(), "Expected left but got right");
        assert_eq!(1, sequence.part(Part::Two).gate(), "Expected left but got right");
        assert_eq!(4, sequence.part(Part::Two).span(), "Expected left but got right");
    }

    #[test]
    fn image_layout() {
        let mut sequence = Sequence::blank(7);
        sequence.set_note(Part::Two, 0, StepNote::Degree(12));
        sequence.set_step_length(15, 9);
        sequence.set_direction(Direction::PingPong);
        sequence.part_mut(Part::One).set_offset(-3);

        let image = sequence.to_image();
        assert_eq!(12, image[16], "Expected left but got right");
        assert_eq!(255, image[0], "Expected left but got right");
        assert_eq!(9, image[47], "Expected left but got right");
        assert_eq!(0xe1, image[48], "Expected left but got right");
        assert_eq!(1, image[66], "Expected left but got right");
        assert_eq!(7, image[68], "Expected left but got right");
        assert_eq!(0xfd, image[72], "Expected left but got right");
        assert_eq!(0x55, image[127], "Expected left but got right");
        assert_eq!(Some(sequence), Sequence::from_image(&image), "Expected left but got right");
    }

    #[test]
    fn image_without_marker_is_rejected() {
        let mut image = Sequence::blank(0).to_image();
        image[127] = 0xff;
        assert_eq!(None, Sequence::from_image(&image), "Expected left but got right");
    }

    #[test]
    fn damaged_fields_are_clamped() {
        let mut image = [0xff; SEQUENCE_IMAGE_SIZE];
        image[127] = 0x55;
        let sequence = Sequence::from_image(&image).unwrap();
        assert_eq!(16, sequence.length(), "Expected left but got right");
        assert_eq!(Direction::Forward, sequence.direction(), "Expected left but got right");
        assert_eq!(Scale::Chromatic, sequence.part(Part::One).scale(), "Expected left but got right");
        assert_eq!(-1, sequence.part(Part::One).offset(), "Expected left but got right");
        assert_eq!(31, sequence.step_length(0), "Expected left but got right");
    }
}
