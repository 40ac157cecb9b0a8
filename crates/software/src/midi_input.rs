//! Routing of received MIDI messages to the [`Engine`].
//!
//! Realtime messages drive the clock whatever their channel. Channel messages are only acted on when they arrive on one
//! of the two part channels: notes become sequence triggers, transport keys or transposition according to the active
//! [`KeyMap`], a handful of controllers drive overrides, and everything else is echoed for downstream gear.

mod framer;
pub use framer::*;

use crate::{
    configuration::{KeyMap, KeyTrigger},
    engine::Engine,
    note_gate::{CvSink, MidiOut},
    overrides::ControlTarget,
    song::SongStore,
    song_file::NUM_SONGS,
};
use num_traits::FromPrimitive;
use wmidi::{ControlFunction, MidiMessage, U7};

const CC_KEY_MAP: u8 = 1;
const CC_TARGETS: core::ops::RangeInclusive<u8> = 20..=25;
const CC_RESTORE: u8 = 31;
const CC_DIRECTION: u8 = 64;
// controllers from here up are channel mode messages
const CC_CHANNEL_MODE: u8 = 120;

/// What a note-on does under a key map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyAction {
    /// Jump to a sequence and run.
    Trigger(u8),
    /// Start the transport.
    Run,
    /// Stop the transport.
    Stop,
    /// Back to the top, as the reset input.
    Reset,
    /// Drop every override.
    Restore,
    /// Transpose by the given semitones.
    Transpose(i8),
}

impl KeyAction {
    /// Decodes a note number under the given key map.
    pub fn decode(map: KeyMap, note: u8) -> Option<Self> {
        match map {
            KeyMap::A => match note {
                24..=39 => Some(Self::Trigger(note - 24)),
                41 => Some(Self::Run),
                43 => Some(Self::Stop),
                45 => Some(Self::Reset),
                47 => Some(Self::Restore),
                48..=72 => Some(Self::Transpose(note as i8 - 60)),
                _ => None,
            },
            KeyMap::B => match note {
                24..=47 => Some(Self::Transpose(note as i8 - 36)),
                48..=63 => Some(Self::Trigger(note - 48)),
                65 => Some(Self::Run),
                67 => Some(Self::Stop),
                69 => Some(Self::Reset),
                71 => Some(Self::Restore),
                _ => None,
            },
        }
    }
}

/// A song load asked for over MIDI; page storage is slow, so the caller schedules it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SongRequest {
    /// Song slot, 0–7.
    pub song: u8,
}

/// Receive-side state: remembers the last trigger key for momentary triggering.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MidiInput {
    last_trigger: Option<u8>,
}

impl MidiInput {
    /// Acts on a received message. Returns a song request for Song Select, which the caller must schedule.
    pub fn receive<S: SongStore, M: MidiOut, C: CvSink>(
        &mut self,
        engine: &mut Engine<S, M, C>,
        message: &MidiMessage<'_>,
    ) -> Option<SongRequest> {
        match message {
            MidiMessage::TimingClock => engine.midi_tick(),
            MidiMessage::Start => engine.midi_start(),
            MidiMessage::Continue => engine.midi_continue(),
            MidiMessage::Stop => engine.midi_stop(),
            MidiMessage::SongPositionPointer(position) => engine.seek_to_song_position(*position),
            MidiMessage::SongSelect(song) => {
                let song = u8::from(*song);
                if song < NUM_SONGS {
                    info!("Song select {}", song);
                    return Some(SongRequest { song });
                }
            }
            MidiMessage::Reset => engine.outputs_mut().send(message),
            MidiMessage::NoteOn(channel, note, velocity) if engine.config().listens_on(*channel) => {
                if u8::from(*velocity) == 0 {
                    self.key_released(engine, u8::from(*note));
                } else {
                    self.key_pressed(engine, u8::from(*note));
                }
            }
            MidiMessage::NoteOff(channel, note, _) if engine.config().listens_on(*channel) => {
                self.key_released(engine, u8::from(*note));
            }
            MidiMessage::ControlChange(channel, function, value) if engine.config().listens_on(*channel) => {
                Self::control_change(engine, message, *function, *value);
            }
            MidiMessage::PolyphonicKeyPressure(channel, ..)
            | MidiMessage::ProgramChange(channel, _)
            | MidiMessage::ChannelPressure(channel, _)
            | MidiMessage::PitchBendChange(channel, _)
                if engine.config().listens_on(*channel) =>
            {
                engine.outputs_mut().send(message);
            }
            _ => {}
        }
        None
    }

    fn key_map<S: SongStore, M: MidiOut, C: CvSink>(engine: &Engine<S, M, C>) -> KeyMap {
        let map = engine.config().key_map();
        if engine.overrides().key_map_flip() {
            map.flipped()
        } else {
            map
        }
    }

    fn key_pressed<S: SongStore, M: MidiOut, C: CvSink>(&mut self, engine: &mut Engine<S, M, C>, note: u8) {
        let Some(action) = KeyAction::decode(Self::key_map(engine), note) else {
            return;
        };
        debug!("Key action {}", action);
        match action {
            KeyAction::Trigger(seq) => {
                self.last_trigger = Some(seq);
                engine.key_trigger(seq);
            }
            KeyAction::Run => engine.run_command(),
            KeyAction::Stop => engine.stop_command(),
            KeyAction::Reset => engine.analog_reset_edge(),
            KeyAction::Restore => engine.restore_overrides(),
            KeyAction::Transpose(semitones) => engine.key_transpose(semitones),
        }
    }

    fn key_released<S: SongStore, M: MidiOut, C: CvSink>(&mut self, engine: &mut Engine<S, M, C>, note: u8) {
        if engine.config().key_trigger() != KeyTrigger::Momentary {
            return;
        }
        if let Some(KeyAction::Trigger(seq)) = KeyAction::decode(Self::key_map(engine), note) {
            if self.last_trigger == Some(seq) {
                engine.stop_command();
                self.last_trigger = None;
            }
        }
    }

    fn control_change<S: SongStore, M: MidiOut, C: CvSink>(
        engine: &mut Engine<S, M, C>,
        message: &MidiMessage<'_>,
        function: ControlFunction,
        value: U7,
    ) {
        match u8::from(function) {
            CC_KEY_MAP => engine.control_change(ControlTarget::KeyMap, value),
            cc if CC_TARGETS.contains(&cc) => {
                if let Some(target) = ControlTarget::from_u8(cc - CC_TARGETS.start() + 1) {
                    engine.control_change(target, value);
                }
            }
            CC_RESTORE => {
                if u8::from(value) >= 64 {
                    engine.restore_overrides();
                }
            }
            CC_DIRECTION => engine.control_change(ControlTarget::Direction, value),
            cc if cc < CC_CHANNEL_MODE => engine.outputs_mut().send(message),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        configuration::SystemConfig,
        song::Song,
        testing::{CvRecorder, MidiRecorder},
    };
    use wmidi::{Channel, Note, U14};

    type TestEngine = Engine<Song, MidiRecorder, CvRecorder>;

    fn engine(configure: impl FnOnce(&mut SystemConfig)) -> TestEngine {
        let mut config = SystemConfig::default();
        config.set_tempo(0);
        configure(&mut config);
        Engine::new(Song::new(), config, MidiRecorder::default(), CvRecorder::default())
    }

    fn note_on(channel: Channel, note: u8) -> MidiMessage<'static> {
        MidiMessage::NoteOn(channel, Note::from(U7::from_u8_lossy(note)), U7::from_u8_lossy(100))
    }

    fn note_off(channel: Channel, note: u8) -> MidiMessage<'static> {
        MidiMessage::NoteOff(channel, Note::from(U7::from_u8_lossy(note)), U7::MIN)
    }

    fn cc(channel: Channel, controller: u8, value: u8) -> MidiMessage<'static> {
        MidiMessage::ControlChange(
            channel,
            ControlFunction::from(U7::from_u8_lossy(controller)),
            U7::from_u8_lossy(value),
        )
    }

    #[test]
    fn key_map_a() {
        assert_eq!(Some(KeyAction::Trigger(0)), KeyAction::decode(KeyMap::A, 24));
        assert_eq!(Some(KeyAction::Trigger(15)), KeyAction::decode(KeyMap::A, 39));
        assert_eq!(None, KeyAction::decode(KeyMap::A, 40));
        assert_eq!(Some(KeyAction::Run), KeyAction::decode(KeyMap::A, 41));
        assert_eq!(Some(KeyAction::Stop), KeyAction::decode(KeyMap::A, 43));
        assert_eq!(Some(KeyAction::Reset), KeyAction::decode(KeyMap::A, 45));
        assert_eq!(Some(KeyAction::Restore), KeyAction::decode(KeyMap::A, 47));
        assert_eq!(Some(KeyAction::Transpose(-12)), KeyAction::decode(KeyMap::A, 48));
        assert_eq!(Some(KeyAction::Transpose(12)), KeyAction::decode(KeyMap::A, 72));
        assert_eq!(None, KeyAction::decode(KeyMap::A, 73));
    }

    #[test]
    fn key_map_b() {
        assert_eq!(Some(KeyAction::Transpose(-12)), KeyAction::decode(KeyMap::B, 24));
        assert_eq!(Some(KeyAction::Transpose(11)), KeyAction::decode(KeyMap::B, 47));
        assert_eq!(Some(KeyAction::Trigger(0)), KeyAction::decode(KeyMap::B, 48));
        assert_eq!(Some(KeyAction::Trigger(15)), KeyAction::decode(KeyMap::B, 63));
        assert_eq!(Some(KeyAction::Run), KeyAction::decode(KeyMap::B, 65));
        assert_eq!(Some(KeyAction::Stop), KeyAction::decode(KeyMap::B, 67));
        assert_eq!(Some(KeyAction::Reset), KeyAction::decode(KeyMap::B, 69));
        assert_eq!(Some(KeyAction::Restore), KeyAction::decode(KeyMap::B, 71));
        assert_eq!(None, KeyAction::decode(KeyMap::B, 64));
    }

    #[test]
    fn trigger_key_jumps_and_runs() {
        let mut engine = engine(|_| {});
        let mut input = MidiInput::default();
        input.receive(&mut engine, &note_on(Channel::Ch1, 30));
        assert!(engine.is_playing());
        assert_eq!(6, engine.playing_sequence(), "Expected left but got right");
    }

    #[test]
    fn other_channels_are_ignored() {
        let mut engine = engine(|_| {});
        let mut input = MidiInput::default();
        input.receive(&mut engine, &note_on(Channel::Ch3, 30));
        input.receive(&mut engine, &cc(Channel::Ch3, 7, 100));
        assert!(!engine.is_playing());
        assert!(engine.outputs().midi.sent.is_empty());
    }

    #[test]
    fn key_map_flip_override_swaps_layouts() {
        let mut engine = engine(|_| {});
        let mut input = MidiInput::default();
        input.receive(&mut engine, &cc(Channel::Ch2, 1, 127));
        assert!(engine.overrides().key_map_flip());

        input.receive(&mut engine, &note_on(Channel::Ch1, 40));
        assert_eq!(Some(4), engine.overrides().transpose(crate::song::Part::One), "Expected left but got right");
    }

    #[test]
    fn momentary_release_stops_transport() {
        let mut engine = engine(|config| config.set_key_trigger(KeyTrigger::Momentary));
        let mut input = MidiInput::default();
        input.receive(&mut engine, &note_on(Channel::Ch1, 25));
        input.receive(&mut engine, &note_on(Channel::Ch1, 26));
        input.receive(&mut engine, &note_off(Channel::Ch1, 25));
        assert!(engine.is_playing(), "Releasing an older trigger should not stop");

        let zero_velocity = MidiMessage::NoteOn(Channel::Ch1, Note::from(U7::from_u8_lossy(26)), U7::MIN);
        input.receive(&mut engine, &zero_velocity);
        assert!(!engine.is_playing());
    }

    #[test]
    fn latch_release_keeps_playing() {
        let mut engine = engine(|_| {});
        let mut input = MidiInput::default();
        input.receive(&mut engine, &note_on(Channel::Ch1, 25));
        input.receive(&mut engine, &note_off(Channel::Ch1, 25));
        assert!(engine.is_playing());
    }

    #[test]
    fn controllers_route_to_overrides() {
        let mut engine = engine(|_| {});
        let mut input = MidiInput::default();
        input.receive(&mut engine, &cc(Channel::Ch1, 21, 80));
        assert_eq!(Some(10), engine.overrides().start(), "Expected left but got right");
        input.receive(&mut engine, &cc(Channel::Ch1, 64, 127));
        assert!(engine.overrides().direction_flip());

        input.receive(&mut engine, &cc(Channel::Ch1, 31, 10));
        assert!(!engine.overrides().is_empty(), "Low values should not restore");
        input.receive(&mut engine, &cc(Channel::Ch1, 31, 127));
        assert!(engine.overrides().is_empty());
    }

    #[test]
    fn unhandled_controllers_are_echoed() {
        let mut engine = engine(|_| {});
        let mut input = MidiInput::default();
        input.receive(&mut engine, &cc(Channel::Ch2, 7, 90));
        input.receive(&mut engine, &cc(Channel::Ch2, 123, 0));
        assert!(engine.outputs().midi.contains(&cc(Channel::Ch2, 7, 90)));
        assert!(!engine.outputs().midi.contains(&cc(Channel::Ch2, 123, 0)));
    }

    #[test]
    fn song_select_requests_load() {
        let mut engine = engine(|_| {});
        let mut input = MidiInput::default();
        assert_eq!(
            Some(SongRequest { song: 3 }),
            input.receive(&mut engine, &MidiMessage::SongSelect(U7::from_u8_lossy(3)))
        );
        assert_eq!(None, input.receive(&mut engine, &MidiMessage::SongSelect(U7::from_u8_lossy(8))));
    }

    #[test]
    fn realtime_drives_the_clock() {
        let mut engine = engine(|_| {});
        let mut input = MidiInput::default();
        input.receive(&mut engine, &MidiMessage::Start);
        assert!(engine.is_playing());
        input.receive(&mut engine, &MidiMessage::TimingClock);
        assert_eq!(1, engine.playback().clock_tick_count(), "Expected left but got right");
        input.receive(&mut engine, &MidiMessage::SongPositionPointer(U14::try_from(2u16).unwrap()));
        assert_eq!(12, engine.playback().clock_tick_count(), "Expected left but got right");
        input.receive(&mut engine, &MidiMessage::Stop);
        assert!(!engine.is_playing());
    }
}
