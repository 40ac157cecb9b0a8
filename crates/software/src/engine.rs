//! The single owned context every timer, edge and MIDI event passes through.
//!
//! The firmware keeps one [`Engine`] behind a mutex and calls into it from each task. Calls run to completion and never
//! block, so holding the lock across one call is enough to serialize the clock, sequencer and note gate.

use crate::{
    clock::{Clock, TransportState, timer_periods},
    configuration::SystemConfig,
    note_gate::{CvSink, MidiOut, NoteGate, Outputs, Watchdog},
    overrides::{ControlAction, ControlOverrides, ControlTarget},
    scale::span_adjust,
    sequencer::{Pattern, Playback},
    song::{MAX_DEGREE, NUM_SEQUENCES, Part, SongStore, StepNote},
};
use bitmask_enum::bitmask;
use embassy_time::Duration;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use wmidi::{ControlFunction, MidiMessage, U7, U14};

/// Notes still sounding this long after the last clock tick are killed.
pub const NOTE_KILL_RUNNING: Duration = Duration::from_secs(10);
/// Audition notes played while stopped are killed after this long.
pub const NOTE_KILL_STOPPED: Duration = Duration::from_millis(204);
/// Seed for step and note randomization, so power-up behavior is repeatable.
pub const RNG_SEED: u64 = 123_456;

const ALL_NOTES_OFF: ControlFunction = ControlFunction::ALL_NOTES_OFF;

/// Edge-triggered signals for the user interface, consumed with [`Engine::take_notifications`].
#[bitmask(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Notification {
    /// The playing sequence, step or transport state changed.
    PlaybackChanged,
    /// An override was set or restored.
    OverrideChanged,
    /// A clock tick landed on a step boundary; blink the clock LED.
    ClockPulse,
    /// A control change was accepted; blink the mod LED.
    ModActivity,
}

/// The sequencer and everything it drives.
pub struct Engine<S, M, C> {
    song: S,
    config: SystemConfig,
    clock: Clock,
    playback: Playback,
    overrides: ControlOverrides,
    notes: NoteGate,
    outputs: Outputs<M, C>,
    rng: SmallRng,
    notifications: Notification,
    mod_readings: [Option<u16>; 2],
}

impl<S: SongStore, M: MidiOut, C: CvSink> Engine<S, M, C> {
    /// Constructs a stopped engine positioned at the top of `song`.
    pub fn new(song: S, config: SystemConfig, midi: M, cv: C) -> Self {
        let mut engine = Self {
            song,
            config,
            clock: Clock::new(),
            playback: Playback::new(),
            overrides: ControlOverrides::default(),
            notes: NoteGate::new(timer_periods(NOTE_KILL_RUNNING), timer_periods(NOTE_KILL_STOPPED)),
            outputs: Outputs::new(midi, cv),
            rng: SmallRng::seed_from_u64(RNG_SEED),
            notifications: Notification::none(),
            mod_readings: [None; 2],
        };
        engine.set_config(config);
        engine.reset();
        engine
    }

    //
    // clock source
    //

    /// Services one period of the fixed-rate timer: the note watchdog, the lockout windows and the internal tempo.
    pub fn tick(&mut self) {
        self.notes.service_watchdog(&mut self.outputs);
        if self.clock.tick() {
            self.outputs.send(&MidiMessage::TimingClock);
            if self.clock.is_playing() {
                self.step_clock(false);
            }
        }
    }

    /// Sets the internal tempo in BPM; below 20 selects external clock.
    pub fn set_tempo(&mut self, bpm: u8) {
        self.clock.set_tempo(bpm);
        self.config.set_tempo(bpm);
    }

    /// Handles MIDI Timing Clock. Ignored while following the internal tempo.
    pub fn midi_tick(&mut self) {
        if !self.clock.accept_midi_clock() {
            return;
        }
        self.outputs.send(&MidiMessage::TimingClock);
        if self.clock.is_playing() {
            self.step_clock(false);
        }
    }

    /// Handles MIDI Start: plays from the top. Ignored while following the internal tempo.
    pub fn midi_start(&mut self) {
        if !self.clock.follows_midi() {
            return;
        }
        self.clock.set_playing(true);
        self.outputs.send(&MidiMessage::Start);
        self.restart();
        info!("MIDI start");
    }

    /// Handles MIDI Continue. Ignored while following the internal tempo.
    pub fn midi_continue(&mut self) {
        if !self.clock.follows_midi() {
            return;
        }
        self.clock.set_playing(true);
        self.outputs.send(&MidiMessage::Continue);
        self.notifications |= Notification::PlaybackChanged;
        info!("MIDI continue");
    }

    /// Handles MIDI Stop. Ignored while following the internal tempo.
    pub fn midi_stop(&mut self) {
        if !self.clock.follows_midi() {
            return;
        }
        self.clock.set_playing(false);
        self.outputs.send(&MidiMessage::Stop);
        self.silence();
        self.notifications |= Notification::PlaybackChanged;
        info!("MIDI stop");
    }

    /// Handles a rising edge on the analog clock input.
    pub fn analog_clock_edge(&mut self) {
        if !self.clock.accept_analog_clock() {
            return;
        }
        self.outputs.send(&MidiMessage::TimingClock);
        if self.clock.is_playing() {
            self.step_clock(true);
        }
    }

    /// Handles a rising edge on the analog reset input: back to the top of the song, in any clock mode.
    pub fn analog_reset_edge(&mut self) {
        if self.clock.accept_analog_reset() {
            self.restart();
        }
    }

    /// Starts the transport if stopped, continuing from the current position.
    pub fn run_command(&mut self) {
        if self.clock.set_playing(true) {
            self.outputs.send(&MidiMessage::Continue);
            self.notifications |= Notification::PlaybackChanged;
            info!("Transport running");
        }
    }

    /// Stops the transport if running, silencing both parts.
    pub fn stop_command(&mut self) {
        if self.clock.set_playing(false) {
            self.outputs.send(&MidiMessage::Stop);
            self.silence();
            self.notifications |= Notification::PlaybackChanged;
            info!("Transport stopped");
        }
    }

    /// The panel run/stop switch: takes control back from any run/stop override, then flips the transport.
    pub fn toggle_run_stop(&mut self) {
        self.restore_run_stop();
        if self.clock.is_playing() {
            self.stop_command();
        } else {
            self.run_command();
        }
    }

    fn step_clock(&mut self, analog: bool) {
        if analog || self.playback.clock_div_count() == 0 {
            self.notifications |= Notification::ClockPulse;
        }
        self.on_clock_tick();
    }

    fn watchdog(&self) -> Watchdog {
        if self.clock.is_playing() {
            Watchdog::Running
        } else {
            Watchdog::Stopped
        }
    }

    fn silence(&mut self) {
        self.notes.stop_all(&mut self.outputs);
        for part in Part::ALL {
            let channel = self.outputs.channel(part);
            self.outputs
                .send(&MidiMessage::ControlChange(channel, ALL_NOTES_OFF, U7::MIN));
        }
    }

    fn restart(&mut self) {
        self.notes.stop_all(&mut self.outputs);
        self.reset_song_position();
    }

    fn reset_song_position(&mut self) {
        let pattern = Pattern::new(&self.song, &self.overrides, self.config.clock_divider());
        self.playback
            .reset_song_position(&pattern, self.config.reset_mode());
        self.notifications |= Notification::PlaybackChanged;
    }

    //
    // step sequencer
    //

    /// Advances the sequencer by one 24ppqn clock tick: services gates and, on a step boundary, plays the next step.
    ///
    /// Nothing happens while the run/stop override holds the transport.
    pub fn on_clock_tick(&mut self) {
        if self.overrides.run_stop_hold() {
            return;
        }

        let pattern = Pattern::new(&self.song, &self.overrides, self.config.clock_divider());
        let sounding = self.playback.playing_sequence();
        self.notes
            .service_gates(&mut self.outputs, |part| pattern.gate(sounding, part));

        if self.playback.clock_div_count() == 0 {
            let seq = self.playback.current_sequence();
            let step = self.playback.compute_current_step(&pattern, &mut self.rng);
            let watchdog = self.watchdog();

            for part in Part::ALL {
                let note = match self.song.note(seq, part, step) {
                    StepNote::Random => StepNote::Degree(self.rng.gen_range(0..MAX_DEGREE)),
                    note => note,
                };
                match note {
                    StepNote::Degree(degree) => {
                        let degree = span_adjust(degree, self.song.span(seq, part));
                        let degree = self.song.scale(seq, part).quantize(degree);
                        self.notes.stop_note(&mut self.outputs, part);
                        self.notes.start_note(
                            &mut self.outputs,
                            part,
                            degree,
                            pattern.offset(seq, part),
                            watchdog,
                        );
                    }
                    StepNote::Rest => self.notes.stop_note(&mut self.outputs, part),
                    StepNote::Hold | StepNote::Random => {}
                }
            }

            self.playback.latch(step);
            self.notifications |= Notification::PlaybackChanged;
            self.playback.advance_step(&pattern);
        }
        self.playback.count_tick(&pattern);
        self.notes.arm(Watchdog::Running);
    }

    /// Jumps to a song position in MIDI Song Position Pointer units (6 clock ticks each), echoing the pointer.
    pub fn seek_to_song_position(&mut self, position: U14) {
        self.outputs.send(&MidiMessage::SongPositionPointer(position));
        self.notes.stop_all(&mut self.outputs);
        let pattern = Pattern::new(&self.song, &self.overrides, self.config.clock_divider());
        self.playback.seek(
            &pattern,
            &mut self.rng,
            u16::from(position),
            self.config.reset_mode(),
        );
        self.notifications |= Notification::PlaybackChanged;
        debug!("Seek to song position {}", u16::from(position));
    }

    /// Moves to a sequence: at the next loop boundary while playing, immediately while stopped.
    pub fn set_next_sequence(&mut self, seq: u8) {
        if seq >= NUM_SEQUENCES {
            return;
        }
        let playing = self.clock.is_playing();
        if !playing {
            self.notes.stop_all(&mut self.outputs);
        }
        let pattern = Pattern::new(&self.song, &self.overrides, self.config.clock_divider());
        self.playback
            .set_next_sequence(&pattern, seq, playing, self.config.reset_mode());
        self.notifications |= Notification::PlaybackChanged;
    }

    /// A sequence trigger key: moves to the sequence and makes sure the transport is running.
    pub fn key_trigger(&mut self, seq: u8) {
        if seq >= NUM_SEQUENCES {
            return;
        }
        self.set_next_sequence(seq);
        self.run_command();
    }

    /// A transpose key: overrides the offset of whichever parts are configured to follow transpose keys.
    pub fn key_transpose(&mut self, semitones: i8) {
        if !(-12..=12).contains(&semitones) {
            return;
        }
        let assign = self.config.key_transpose();
        for part in Part::ALL.into_iter().filter(|&part| assign.applies_to(part)) {
            self.overrides.set_transpose(part, semitones);
        }
        self.notifications |= Notification::OverrideChanged;
    }

    //
    // overrides
    //

    /// Applies a 0–127 control value to an override target.
    pub fn control_change(&mut self, target: ControlTarget, value: U7) {
        match self.overrides.apply(target, value) {
            Some(ControlAction::JumpTo(seq)) => self.set_next_sequence(seq),
            Some(ControlAction::Run) => self.run_command(),
            Some(ControlAction::Stop) => self.stop_command(),
            None => {}
        }
        self.notifications |= Notification::OverrideChanged | Notification::ModActivity;
    }

    /// Drops every override, returning to stored pattern values.
    pub fn restore_overrides(&mut self) {
        self.overrides.restore();
        self.notifications |= Notification::OverrideChanged;
        debug!("Overrides restored");
    }

    /// Drops only the run/stop override.
    pub fn restore_run_stop(&mut self) {
        self.overrides.restore_run_stop();
        self.notifications |= Notification::OverrideChanged;
    }

    /// Feeds a 10-bit mod CV reading. A changed reading on an assigned input becomes a control change.
    pub fn mod_input(&mut self, input: usize, reading: u16) {
        let Some(last) = self.mod_readings.get_mut(input) else {
            return;
        };
        if *last == Some(reading) {
            return;
        }
        *last = Some(reading);

        if let Some(target) = self.config.mod_assign(input).target() {
            self.control_change(target, U7::from_u8_lossy((reading >> 3).min(127) as u8));
        }
    }

    //
    // notes
    //

    /// Plays a preview note for a scale degree, as when editing a step.
    pub fn play_audition_note(&mut self, part: Part, degree: u8) {
        let pattern = Pattern::new(&self.song, &self.overrides, self.config.clock_divider());
        let offset = pattern.offset(self.playback.current_sequence(), part);
        let watchdog = self.watchdog();
        self.notes.stop_note(&mut self.outputs, part);
        self.notes
            .start_note(&mut self.outputs, part, degree, offset, watchdog);
    }

    /// Enters CV calibration, which requires the transport stopped.
    pub fn begin_cv_calibration(&mut self) {
        self.stop_command();
    }

    /// Holds a part at a calibration octave, 0–6.
    pub fn set_cv_calibration(&mut self, part: Part, octave: u8) {
        let watchdog = self.watchdog();
        self.notes
            .calibrate(&mut self.outputs, part, octave, watchdog);
    }

    //
    // lifecycle
    //

    /// Returns to the top of the song with notes silenced and every override dropped.
    pub fn reset(&mut self) {
        self.notes.stop_all(&mut self.outputs);
        self.notes.disarm();
        self.reset_song_position();
        self.restore_overrides();
    }

    /// Called once a new song is in place.
    pub fn new_song_loaded(&mut self) {
        info!("Song loaded");
        self.reset();
    }

    /// Replaces the song, stopping the transport first.
    pub fn load_song(&mut self, song: S) {
        self.stop_command();
        self.song = song;
        self.new_song_loaded();
    }

    /// Edits the song in place, stopping the transport first.
    pub fn edit_song<R>(&mut self, edit: impl FnOnce(&mut S) -> R) -> R {
        self.stop_command();
        edit(&mut self.song)
    }

    /// Replaces the system configuration, applying its tempo and MIDI channels.
    pub fn set_config(&mut self, config: SystemConfig) {
        self.config = config;
        self.clock.set_tempo(config.tempo());
        for part in Part::ALL {
            self.outputs.set_channel(part, config.midi_channel(part));
        }
    }

    /// Returns and clears the pending notifications.
    pub fn take_notifications(&mut self) -> Notification {
        core::mem::replace(&mut self.notifications, Notification::none())
    }

    /// The pattern data.
    pub fn song(&self) -> &S {
        &self.song
    }

    /// The system configuration.
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Clock arbitration state.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Traversal state.
    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    /// Overrides in effect.
    pub fn overrides(&self) -> &ControlOverrides {
        &self.overrides
    }

    /// Note state.
    pub fn notes(&self) -> &NoteGate {
        &self.notes
    }

    /// Note and MIDI outputs.
    pub fn outputs(&self) -> &Outputs<M, C> {
        &self.outputs
    }

    /// Note and MIDI outputs, for the firmware to drain.
    pub fn outputs_mut(&mut self) -> &mut Outputs<M, C> {
        &mut self.outputs
    }

    /// Returns `true` while the song is playing.
    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    /// Transport state as displayed.
    pub fn transport_state(&self) -> TransportState {
        self.clock.state()
    }

    /// The sequence most recently played, for display.
    pub fn playing_sequence(&self) -> u8 {
        self.playback.playing_sequence()
    }

    /// The step most recently played, for display.
    pub fn playing_step(&self) -> u8 {
        self.playback.playing_step()
    }
}
