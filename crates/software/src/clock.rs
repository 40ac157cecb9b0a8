//! Clock source arbitration: the internal tempo generator, MIDI clock and the analog clock and reset inputs.
//!
//! Everything here counts in periods of the fixed [`TIMER_PERIOD`]. The [`Clock`] decides whether an event is accepted;
//! the [`Engine`](crate::engine::Engine) acts on the answer.

use embassy_time::Duration;

/// Period of the timer which drives [`Clock::tick`].
pub const TIMER_PERIOD: Duration = Duration::from_micros(256);
/// Slowest internal tempo in BPM. Anything slower selects the external clock.
pub const MIN_TEMPO: u8 = 20;
/// Fastest internal tempo in BPM.
pub const MAX_TEMPO: u8 = 250;

/// How long MIDI clock keeps the analog clock input locked out after each MIDI tick.
pub const MIDI_OVERRIDE: Duration = Duration::from_secs(1);
/// How long the analog clock input is ignored after an accepted pulse.
pub const CLOCK_IGNORE: Duration = Duration::from_micros(8_192);
/// How long the analog reset input is ignored after an accepted pulse.
pub const RESET_IGNORE: Duration = Duration::from_micros(102_400);

// each timer period adds this to the accumulator
const INCREMENT: u32 = 250;
// accumulator units per minute of 24ppqn ticks: 60s / 256us * 250 / 24
const UNITS_PER_BPM: u32 = 2_441_406;

const INTERVALS: [u32; MAX_TEMPO as usize + 1] = {
    let mut table = [0; MAX_TEMPO as usize + 1];
    let mut bpm = 0;
    while bpm <= MAX_TEMPO as usize {
        let divisor = if bpm < MIN_TEMPO as usize { MIN_TEMPO as usize } else { bpm };
        table[bpm] = UNITS_PER_BPM / divisor as u32;
        bpm += 1;
    }
    table
};

/// Converts a duration to a count of whole timer periods.
pub const fn timer_periods(duration: Duration) -> u16 {
    let periods = duration.as_micros() / TIMER_PERIOD.as_micros();
    if periods > u16::MAX as u64 {
        u16::MAX
    } else {
        periods as u16
    }
}

/// Where clock ticks come from and whether they advance the song.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportState {
    /// Ticks are echoed but do not advance the song.
    Stopped,
    /// Playing to the internal tempo.
    PlayingInternal,
    /// Playing to MIDI or analog clock.
    PlayingExternal,
}

/// Clock arbitration and transport state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clock {
    tempo: Option<u8>,
    interval: u32,
    accumulator: u32,
    playing: bool,
    midi_override: u16,
    clock_ignore: u16,
    reset_ignore: u16,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    /// A stopped clock following external sources.
    pub fn new() -> Self {
        Self {
            tempo: None,
            interval: INTERVALS[MIN_TEMPO as usize],
            accumulator: 0,
            playing: false,
            midi_override: 0,
            clock_ignore: 0,
            reset_ignore: 0,
        }
    }

    /// Advances by one timer period. Returns `true` when the internal generator emits a clock tick.
    ///
    /// Lockout windows count down here whatever the clock mode.
    pub fn tick(&mut self) -> bool {
        self.midi_override = self.midi_override.saturating_sub(1);
        self.clock_ignore = self.clock_ignore.saturating_sub(1);
        self.reset_ignore = self.reset_ignore.saturating_sub(1);

        if self.tempo.is_none() {
            return false;
        }
        self.accumulator += INCREMENT;
        if self.accumulator >= self.interval {
            self.accumulator -= self.interval;
            return true;
        }
        false
    }

    /// Selects the internal tempo in BPM, clamped to 250. Below 20 the clock follows MIDI and the analog input instead.
    pub fn set_tempo(&mut self, bpm: u8) {
        self.tempo = match bpm {
            0..MIN_TEMPO => None,
            _ => Some(bpm.min(MAX_TEMPO)),
        };
        self.interval = INTERVALS[self.tempo.unwrap_or(0) as usize];
        info!("Clock tempo set to {} (0 = external)", self.tempo.unwrap_or(0));
    }

    /// The internal tempo, or `None` when following external clock.
    pub fn tempo(&self) -> Option<u8> {
        self.tempo
    }

    /// Accumulator units between internal ticks at the current tempo.
    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Returns `true` while following the internal tempo.
    pub fn is_internal(&self) -> bool {
        self.tempo.is_some()
    }

    /// Returns `true` while the song is playing.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Sets whether the song is playing, returning `true` if that changed.
    pub fn set_playing(&mut self, playing: bool) -> bool {
        let changed = self.playing != playing;
        self.playing = playing;
        changed
    }

    /// Transport state as displayed.
    pub fn state(&self) -> TransportState {
        match (self.playing, self.is_internal()) {
            (false, _) => TransportState::Stopped,
            (true, true) => TransportState::PlayingInternal,
            (true, false) => TransportState::PlayingExternal,
        }
    }

    /// Returns `true` if MIDI transport messages should be obeyed, i.e., in external mode.
    pub fn follows_midi(&self) -> bool {
        !self.is_internal()
    }

    /// Decides whether a MIDI clock tick is accepted. Accepting locks out the analog clock for [`MIDI_OVERRIDE`].
    pub fn accept_midi_clock(&mut self) -> bool {
        if self.is_internal() {
            return false;
        }
        self.midi_override = timer_periods(MIDI_OVERRIDE);
        true
    }

    /// Decides whether an analog clock edge is accepted. It is refused in internal mode, while MIDI clock is present
    /// and within [`CLOCK_IGNORE`] of the last accepted edge.
    pub fn accept_analog_clock(&mut self) -> bool {
        if self.is_internal() || self.midi_override > 0 || self.clock_ignore > 0 {
            return false;
        }
        self.clock_ignore = timer_periods(CLOCK_IGNORE);
        true
    }

    /// Decides whether an analog reset edge is accepted, in any mode.
    pub fn accept_analog_reset(&mut self) -> bool {
        if self.reset_ignore > 0 {
            return false;
        }
        self.reset_ignore = timer_periods(RESET_IGNORE);
        true
    }
}
