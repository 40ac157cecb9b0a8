//! The step-traversal state machine: which step plays next, when a sequence has looped enough times, and which sequence
//! follows it.
//!
//! [`Playback`] owns the traversal cursor and counters. It reads pattern data through a [`Pattern`], which layers the
//! live [`ControlOverrides`] over a [`SongStore`], and never starts or stops notes itself; the
//! [`Engine`](crate::engine::Engine) does that with the step indices it hands back.

use crate::{
    configuration::ResetMode,
    overrides::ControlOverrides,
    song::{Direction, NUM_SEQUENCES, NUM_STEPS, Part, SongStore},
};
use rand::Rng;

/// Number of clock ticks in one MIDI Song Position Pointer unit.
pub const TICKS_PER_SONG_POSITION: u32 = 6;

/// Stored pattern data as seen through the overrides currently in effect.
pub struct Pattern<'a, S> {
    song: &'a S,
    overrides: &'a ControlOverrides,
    clock_divider: u8,
}

impl<'a, S: SongStore> Pattern<'a, S> {
    /// Layers `overrides` over `song`. Steps without their own length last `clock_divider` ticks.
    pub fn new(song: &'a S, overrides: &'a ControlOverrides, clock_divider: u8) -> Self {
        Self {
            song,
            overrides,
            clock_divider: clock_divider.max(1),
        }
    }

    /// The underlying song.
    pub fn song(&self) -> &S {
        self.song
    }

    /// First step, 0–15.
    pub fn start(&self, seq: u8) -> u8 {
        self.overrides.start().unwrap_or_else(|| self.song.start(seq))
    }

    /// Steps per pass, at least 1.
    pub fn length(&self, seq: u8) -> u8 {
        self.overrides
            .length()
            .unwrap_or_else(|| self.song.length(seq))
            .max(1)
    }

    /// Traversal order, with forward and backward swapped while the direction flip is held.
    pub fn direction(&self, seq: u8) -> Direction {
        let direction = self.song.direction(seq);
        if self.overrides.direction_flip() {
            direction.flipped()
        } else {
            direction
        }
    }

    /// Gate length in ticks.
    pub fn gate(&self, seq: u8, part: Part) -> u8 {
        self.overrides
            .gate(part)
            .unwrap_or_else(|| self.song.gate(seq, part))
    }

    /// Semitone transposition: the transpose override if present, else the stored offset.
    pub fn offset(&self, seq: u8, part: Part) -> i8 {
        self.overrides
            .transpose(part)
            .unwrap_or_else(|| self.song.offset(seq, part))
    }

    /// How many ticks a step lasts.
    pub fn step_length(&self, seq: u8, step: u8) -> u8 {
        match self.song.step_length(seq, step) {
            0 => self.clock_divider,
            length => length,
        }
    }
}

/// Whether a ping-pong traversal is currently heading up or back down.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PingPongPhase {
    /// Towards the last step.
    #[default]
    Ping,
    /// Towards the first step.
    Pong,
}

/// Position and counters of the sequence being played.
///
/// The cursor counts from 0 to `length - 1` regardless of the start step; [`compute_current_step`] adds the start and
/// wraps into the fixed 0–15 index space. A cursor of `None` means the position has just been reset and the next
/// advance must establish it.
///
/// [`compute_current_step`]: Playback::compute_current_step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playback {
    current_sequence: u8,
    cursor: Option<i8>,
    loop_count: u8,
    ping_pong: PingPongPhase,
    next_cued: Option<u8>,
    clock_div_count: u8,
    clock_tick_count: u32,
    playing_sequence: u8,
    playing_step: u8,
}

impl Default for Playback {
    fn default() -> Self {
        Self::new()
    }
}

impl Playback {
    /// Constructs playback state positioned nowhere; call [`reset_song_position`](Self::reset_song_position) before use.
    pub fn new() -> Self {
        Self {
            current_sequence: 0,
            cursor: None,
            loop_count: 0,
            ping_pong: PingPongPhase::default(),
            next_cued: None,
            clock_div_count: 0,
            clock_tick_count: 0,
            playing_sequence: 0,
            playing_step: 0,
        }
    }

    /// The sequence the cursor is in. It may already be ahead of the sequence shown as playing.
    pub fn current_sequence(&self) -> u8 {
        self.current_sequence
    }

    /// The cursor, or `None` right after a reset.
    pub fn cursor(&self) -> Option<i8> {
        self.cursor
    }

    /// Completed passes of the current sequence.
    pub fn loop_count(&self) -> u8 {
        self.loop_count
    }

    /// Ping-pong heading.
    pub fn ping_pong(&self) -> PingPongPhase {
        self.ping_pong
    }

    /// The sequence waiting to take over at the next loop boundary.
    pub fn next_cued(&self) -> Option<u8> {
        self.next_cued
    }

    /// Ticks elapsed in the current step; 0 means the next tick starts a new step.
    pub fn clock_div_count(&self) -> u8 {
        self.clock_div_count
    }

    /// Ticks since the song position was last reset, at 24ppqn.
    pub fn clock_tick_count(&self) -> u32 {
        self.clock_tick_count
    }

    /// The sequence whose step was most recently committed.
    pub fn playing_sequence(&self) -> u8 {
        self.playing_sequence
    }

    /// The step most recently committed.
    pub fn playing_step(&self) -> u8 {
        self.playing_step
    }

    /// Queues a sequence to take over at the next loop boundary without interrupting the current pass.
    pub fn cue(&mut self, seq: u8) {
        if seq < NUM_SEQUENCES {
            self.next_cued = Some(seq);
        }
    }

    /// The step the cursor points at. Random sequences pick a fresh step within the current length each call.
    ///
    /// The result always lies in 0–15.
    pub fn compute_current_step<S: SongStore, R: Rng>(&self, pattern: &Pattern<'_, S>, rng: &mut R) -> u8 {
        let seq = self.current_sequence;
        let start = pattern.start(seq) as i16;
        // the stored direction decides randomness; the flip only swaps forward and backward
        let offset = if pattern.song().direction(seq) == Direction::Random {
            rng.gen_range(0..pattern.length(seq)) as i16
        } else {
            self.cursor.unwrap_or(0) as i16
        };
        (offset + start).rem_euclid(NUM_STEPS as i16) as u8
    }

    fn cursor_step<S: SongStore>(&self, pattern: &Pattern<'_, S>) -> u8 {
        let start = pattern.start(self.current_sequence) as i16;
        (self.cursor.unwrap_or(0) as i16 + start).rem_euclid(NUM_STEPS as i16) as u8
    }

    /// Records the step just committed, for display.
    pub fn latch(&mut self, step: u8) {
        self.playing_sequence = self.current_sequence;
        self.playing_step = step;
    }

    /// Moves the cursor one step in the current direction, handling the loop boundary when an end is reached.
    pub fn advance_step<S: SongStore>(&mut self, pattern: &Pattern<'_, S>) {
        let seq = self.current_sequence;
        let last = pattern.length(seq) as i8 - 1;
        let direction = pattern.direction(seq);

        let Some(cursor) = self.cursor else {
            self.loop_end(pattern);
            return;
        };

        match direction {
            Direction::PingPong => match self.ping_pong {
                PingPongPhase::Pong => {
                    let cursor = cursor - 1;
                    if cursor <= 0 {
                        self.cursor = Some(0);
                        self.ping_pong = PingPongPhase::Ping;
                        self.loop_end(pattern);
                    } else {
                        self.cursor = Some(cursor);
                    }
                }
                PingPongPhase::Ping => {
                    let cursor = cursor + 1;
                    if cursor >= last {
                        self.cursor = Some(last);
                        self.ping_pong = PingPongPhase::Pong;
                        self.loop_end(pattern);
                    } else {
                        self.cursor = Some(cursor);
                    }
                }
            },
            Direction::Forward | Direction::Random => {
                let cursor = cursor + 1;
                if cursor > last {
                    self.cursor = Some(0);
                    self.loop_end(pattern);
                } else {
                    self.cursor = Some(cursor);
                }
            }
            Direction::Backward => {
                let cursor = cursor - 1;
                if cursor < 0 {
                    self.cursor = Some(last);
                    self.loop_end(pattern);
                } else {
                    self.cursor = Some(cursor);
                }
            }
        }
    }

    /// Handles a traversal boundary: counts the pass, cues the chained sequence once looping is done, and switches to
    /// whatever is cued. The cue is always consumed.
    fn loop_end<S: SongStore>(&mut self, pattern: &Pattern<'_, S>) {
        let forced = self.cursor.is_none();
        if !forced {
            self.loop_count = self.loop_count.saturating_add(1);
            if self.loop_count > pattern.song().loop_count(self.current_sequence) && self.next_cued.is_none() {
                self.next_cued = Some(pattern.song().next_sequence(self.current_sequence));
            }
        }

        let cued = self.next_cued.take();
        let target = match cued {
            Some(seq) if forced || seq != self.current_sequence => seq,
            None if forced => self.current_sequence,
            _ => return,
        };

        if target != self.current_sequence {
            debug!("Switching from sequence {} to {}", self.current_sequence, target);
        }
        self.current_sequence = target;
        self.ping_pong = PingPongPhase::Ping;
        self.loop_count = 0;
        self.cursor = Some(match pattern.direction(target) {
            Direction::Backward => pattern.length(target) as i8 - 1,
            _ => 0,
        });
    }

    /// Returns to the top of the song (or of the current sequence, per `reset_mode`) with the counters cleared.
    pub fn reset_song_position<S: SongStore>(&mut self, pattern: &Pattern<'_, S>, reset_mode: ResetMode) {
        let cue = match reset_mode {
            ResetMode::Song => 0,
            ResetMode::Sequence => self.current_sequence,
        };
        self.next_cued = Some(cue);
        self.cursor = None;
        self.loop_count = 0;
        self.ping_pong = PingPongPhase::Ping;
        self.clock_div_count = 0;
        self.clock_tick_count = 0;
        self.advance_step(pattern);
        self.latch(self.cursor_step(pattern));
    }

    /// Moves to `seq`. While playing, the switch waits for the next loop boundary; while stopped it happens immediately
    /// from a fresh song position. Out-of-range sequences are ignored.
    pub fn set_next_sequence<S: SongStore>(
        &mut self,
        pattern: &Pattern<'_, S>,
        seq: u8,
        playing: bool,
        reset_mode: ResetMode,
    ) {
        if seq >= NUM_SEQUENCES {
            return;
        }
        if playing {
            self.cue(seq);
            return;
        }

        self.reset_song_position(pattern, reset_mode);
        if seq != self.current_sequence {
            self.next_cued = Some(seq);
            self.cursor = None;
            self.advance_step(pattern);
        }
        self.latch(self.cursor_step(pattern));
    }

    /// Counts one clock tick within the step just committed, returning to 0 once the step's length has elapsed.
    pub fn count_tick<S: SongStore>(&mut self, pattern: &Pattern<'_, S>) {
        self.clock_div_count = self.clock_div_count.saturating_add(1);
        if self.clock_div_count >= pattern.step_length(self.playing_sequence, self.playing_step) {
            self.clock_div_count = 0;
        }
        self.clock_tick_count = self.clock_tick_count.wrapping_add(1);
    }

    /// Reconstructs the position live playback would reach `position * 6` ticks after a reset, by replaying the
    /// traversal and summing each visited step's length.
    ///
    /// When the position falls inside a step, that step is committed and the divider counter is left at the ticks
    /// already spent in it, exactly as if the ticks had been played.
    pub fn seek<S: SongStore, R: Rng>(
        &mut self,
        pattern: &Pattern<'_, S>,
        rng: &mut R,
        position: u16,
        reset_mode: ResetMode,
    ) {
        self.reset_song_position(pattern, reset_mode);
        let target = position as u32 * TICKS_PER_SONG_POSITION;
        let mut elapsed = 0;
        loop {
            let step = self.compute_current_step(pattern, rng);
            let length = pattern.step_length(self.current_sequence, step) as u32;
            if elapsed + length > target {
                let remainder = target - elapsed;
                if remainder > 0 {
                    self.latch(step);
                    self.advance_step(pattern);
                }
                self.clock_div_count = remainder as u8;
                break;
            }
            elapsed += length;
            self.latch(step);
            self.advance_step(pattern);
        }
        self.clock_tick_count = target;
    }
}
