//! Per-part note lifecycle: note-on and note-off to the MIDI and CV outputs, gate timing, and the watchdog which kills
//! notes nobody is servicing.

use crate::song::{MAX_DEGREE, Part};
use core::ops::RangeInclusive;
use wmidi::{Channel, MidiMessage, Note, U7};

/// Engine pitches which may be played; anything transposed outside is dropped.
pub const PLAYABLE: RangeInclusive<i16> = 12..=103;
/// Distance from an engine pitch to the MIDI note number it is sent as.
pub const MIDI_NOTE_OFFSET: u8 = 24;
/// Velocity of every note-on.
pub const VELOCITY: U7 = U7::from_u8_lossy(100);
/// Highest CV calibration octave.
pub const MAX_CALIBRATION_OCTAVE: u8 = 6;

/// A pitch in the engine's range, where 0 is the bottom of the CV output and each unit is a semitone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pitch(u8);

impl Pitch {
    /// Wraps a raw engine pitch.
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Raw engine pitch.
    pub fn value(self) -> u8 {
        self.0
    }

    /// The MIDI note this pitch is sent as.
    pub fn to_midi(self) -> Note {
        Note::from(U7::from_u8_lossy(self.0.saturating_add(MIDI_NOTE_OFFSET)))
    }
}

/// Something notes are played on.
pub trait NoteSink {
    /// Starts a note.
    fn note_on(&mut self, part: Part, pitch: Pitch, velocity: U7);
    /// Stops the note previously started on a part.
    fn note_off(&mut self, part: Part, pitch: Pitch);
}

/// The CV/gate output. Calibration sets a raw pitch directly, outside normal gate timing.
pub trait CvSink: NoteSink {
    /// Holds a part's CV at the given pitch with the gate open.
    fn calibrate(&mut self, part: Part, pitch: Pitch);
}

/// A MIDI transmitter.
pub trait MidiOut {
    /// Queues a message for transmission.
    fn send(&mut self, message: &MidiMessage<'_>);
}

/// Both outputs, plus the channel each part sends on.
pub struct Outputs<M, C> {
    /// MIDI output, which also carries transport echo.
    pub midi: M,
    /// CV/gate output.
    pub cv: C,
    channels: [Channel; 2],
}

impl<M: MidiOut, C: CvSink> Outputs<M, C> {
    /// Bundles the outputs; parts send on channels 1 and 2 until told otherwise.
    pub fn new(midi: M, cv: C) -> Self {
        Self {
            midi,
            cv,
            channels: [Channel::Ch1, Channel::Ch2],
        }
    }

    /// The channel a part sends on.
    pub fn channel(&self, part: Part) -> Channel {
        self.channels[part.index()]
    }

    /// Sets the channel a part sends on.
    pub fn set_channel(&mut self, part: Part, channel: Channel) {
        self.channels[part.index()] = channel;
    }

    /// Sends a message on the MIDI output.
    pub fn send(&mut self, message: &MidiMessage<'_>) {
        self.midi.send(message);
    }
}

impl<M: MidiOut, C: CvSink> NoteSink for Outputs<M, C> {
    fn note_on(&mut self, part: Part, pitch: Pitch, velocity: U7) {
        let channel = self.channel(part);
        self.midi
            .send(&MidiMessage::NoteOn(channel, pitch.to_midi(), velocity));
        self.cv.note_on(part, pitch, velocity);
    }

    fn note_off(&mut self, part: Part, pitch: Pitch) {
        let channel = self.channel(part);
        self.midi
            .send(&MidiMessage::NoteOff(channel, pitch.to_midi(), U7::MIN));
        self.cv.note_off(part, pitch);
    }
}

/// Which note-kill timeout to arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Watchdog {
    /// Transport running; notes normally end by gate long before this.
    Running,
    /// Transport stopped; notes are auditions and should die quickly.
    Stopped,
}

/// Note state for both parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteGate {
    active: [Option<Pitch>; 2],
    gate_elapsed: [u8; 2],
    kill_countdown: u16,
    kill_periods: [u16; 2],
}

impl NoteGate {
    /// Constructs an idle gate. The watchdog counts in timer periods: `running` while playing and `stopped` otherwise.
    pub fn new(running: u16, stopped: u16) -> Self {
        Self {
            active: [None; 2],
            gate_elapsed: [0; 2],
            kill_countdown: 0,
            kill_periods: [running, stopped],
        }
    }

    /// The pitch a part is sounding, if any.
    pub fn active(&self, part: Part) -> Option<Pitch> {
        self.active[part.index()]
    }

    /// Clock ticks since a part's note started.
    pub fn gate_elapsed(&self, part: Part) -> u8 {
        self.gate_elapsed[part.index()]
    }

    /// Timer periods left before the watchdog kills every note.
    pub fn kill_countdown(&self) -> u16 {
        self.kill_countdown
    }

    /// Restarts the watchdog.
    pub fn arm(&mut self, watchdog: Watchdog) {
        self.kill_countdown = match watchdog {
            Watchdog::Running => self.kill_periods[0],
            Watchdog::Stopped => self.kill_periods[1],
        };
    }

    /// Stands the watchdog down.
    pub fn disarm(&mut self) {
        self.kill_countdown = 0;
    }

    /// Starts a note for a scale degree, shifted by `offset` semitones. Whatever the part was playing is stopped first.
    ///
    /// Pitches which land outside [`PLAYABLE`] are dropped without stopping the current note.
    pub fn start_note<S: NoteSink>(&mut self, out: &mut S, part: Part, degree: u8, offset: i8, watchdog: Watchdog) {
        let pitch = degree as i16 + 12 + offset as i16;
        if degree > MAX_DEGREE || !PLAYABLE.contains(&pitch) {
            debug!("Dropping out-of-band pitch {} on part {}", pitch, part.index());
            return;
        }
        let pitch = Pitch(pitch as u8);

        self.stop_note(out, part);
        out.note_on(part, pitch, VELOCITY);
        self.active[part.index()] = Some(pitch);
        self.gate_elapsed[part.index()] = 0;
        self.arm(watchdog);
    }

    /// Stops a part's note, if one is sounding.
    pub fn stop_note<S: NoteSink>(&mut self, out: &mut S, part: Part) {
        if let Some(pitch) = self.active[part.index()].take() {
            out.note_off(part, pitch);
        }
    }

    /// Stops both parts.
    pub fn stop_all<S: NoteSink>(&mut self, out: &mut S) {
        for part in Part::ALL {
            self.stop_note(out, part);
        }
    }

    /// Advances gate timers by one clock tick, stopping any note whose elapsed ticks reach its gate length.
    pub fn service_gates<S: NoteSink>(&mut self, out: &mut S, gate: impl Fn(Part) -> u8) {
        for part in Part::ALL {
            if self.active[part.index()].is_none() {
                continue;
            }
            let elapsed = &mut self.gate_elapsed[part.index()];
            *elapsed = elapsed.saturating_add(1);
            if *elapsed >= gate(part) {
                self.stop_note(out, part);
            }
        }
    }

    /// Counts down the watchdog by one timer period, killing every note when it expires.
    ///
    /// Returns `true` if notes were killed.
    pub fn service_watchdog<S: NoteSink>(&mut self, out: &mut S) -> bool {
        if self.kill_countdown == 0 {
            return false;
        }
        self.kill_countdown -= 1;
        if self.kill_countdown > 0 {
            return false;
        }
        if self.active.iter().any(Option::is_some) {
            warn!("Note watchdog expired; killing notes");
        }
        self.stop_all(out);
        true
    }

    /// Holds a part at `octave` (0–6) for CV calibration. Repeating the current octave does not retrigger.
    pub fn calibrate<M: MidiOut, C: CvSink>(
        &mut self,
        out: &mut Outputs<M, C>,
        part: Part,
        octave: u8,
        watchdog: Watchdog,
    ) {
        if octave > MAX_CALIBRATION_OCTAVE {
            return;
        }
        let pitch = Pitch(octave * 12);
        if self.active[part.index()] == Some(pitch) {
            return;
        }

        self.stop_note(out, part);
        let channel = out.channel(part);
        out.midi
            .send(&MidiMessage::NoteOn(channel, pitch.to_midi(), VELOCITY));
        out.cv.calibrate(part, pitch);
        self.active[part.index()] = Some(pitch);
        self.gate_elapsed[part.index()] = 0;
        self.arm(watchdog);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CvEvent, CvRecorder, MidiRecorder};

    fn outputs() -> Outputs<MidiRecorder, CvRecorder> {
        Outputs::new(MidiRecorder::default(), CvRecorder::default())
    }

    #[test]
    fn start_applies_offset_and_sends_to_both_outputs() {
        let mut out = outputs();
        let mut gate = NoteGate::new(100, 10);
        gate.start_note(&mut out, Part::Two, 0, 3, Watchdog::Running);

        assert_eq!(Some(Pitch::new(15)), gate.active(Part::Two), "Expected left but got right");
        assert!(out.midi.contains(&MidiMessage::NoteOn(Channel::Ch2, Note::from(U7::from_u8_lossy(39)), VELOCITY)));
        assert_eq!(
            std::vec![CvEvent::On(Part::Two, 15)],
            out.cv.events,
            "Expected left but got right"
        );
        assert_eq!(100, gate.kill_countdown(), "Expected left but got right");
    }

    #[test]
    fn restarting_stops_the_previous_note() {
        let mut out = outputs();
        let mut gate = NoteGate::new(100, 10);
        gate.start_note(&mut out, Part::One, 0, 0, Watchdog::Stopped);
        gate.start_note(&mut out, Part::One, 0, 0, Watchdog::Stopped);
        assert_eq!(
            std::vec![
                CvEvent::On(Part::One, 12),
                CvEvent::Off(Part::One, 12),
                CvEvent::On(Part::One, 12)
            ],
            out.cv.events,
            "Expected left but got right"
        );
        assert_eq!(10, gate.kill_countdown(), "Expected left but got right");
    }

    #[test]
    fn out_of_band_pitch_is_dropped() {
        let mut out = outputs();
        let mut gate = NoteGate::new(100, 10);
        gate.start_note(&mut out, Part::One, 0, -1, Watchdog::Running);
        assert_eq!(None, gate.active(Part::One), "Expected left but got right");
        assert!(out.cv.events.is_empty());
        assert!(out.midi.sent.is_empty());

        gate.start_note(&mut out, Part::One, 48, 12, Watchdog::Running);
        assert_eq!(Some(Pitch::new(72)), gate.active(Part::One), "Top of the range should play");
    }

    #[test]
    fn gate_closes_exactly_when_elapsed_reaches_length() {
        let mut out = outputs();
        let mut gate = NoteGate::new(100, 10);
        gate.start_note(&mut out, Part::One, 5, 0, Watchdog::Running);

        for tick in 1..4 {
            gate.service_gates(&mut out, |_| 4);
            assert!(gate.active(Part::One).is_some(), "Note ended early at tick {tick}");
        }
        gate.service_gates(&mut out, |_| 4);
        assert_eq!(None, gate.active(Part::One), "Note should end on tick 4");
        assert_eq!(Some(&CvEvent::Off(Part::One, 17)), out.cv.events.last());
    }

    #[test]
    fn watchdog_kills_both_parts() {
        let mut out = outputs();
        let mut gate = NoteGate::new(100, 3);
        gate.start_note(&mut out, Part::One, 0, 0, Watchdog::Stopped);
        gate.start_note(&mut out, Part::Two, 7, 0, Watchdog::Stopped);

        assert!(!gate.service_watchdog(&mut out));
        assert!(!gate.service_watchdog(&mut out));
        assert!(gate.service_watchdog(&mut out));
        assert_eq!(None, gate.active(Part::One), "Expected left but got right");
        assert_eq!(None, gate.active(Part::Two), "Expected left but got right");
        assert!(!gate.service_watchdog(&mut out), "A disarmed watchdog should stay quiet");
    }

    #[test]
    fn calibration_does_not_retrigger() {
        let mut out = outputs();
        let mut gate = NoteGate::new(100, 10);
        gate.calibrate(&mut out, Part::One, 2, Watchdog::Stopped);
        gate.calibrate(&mut out, Part::One, 2, Watchdog::Stopped);
        assert_eq!(std::vec![CvEvent::Calibrate(Part::One, 24)], out.cv.events);

        gate.calibrate(&mut out, Part::One, 7, Watchdog::Stopped);
        assert_eq!(Some(Pitch::new(24)), gate.active(Part::One), "Octave 7 should be ignored");
    }

    extern crate std;
}
