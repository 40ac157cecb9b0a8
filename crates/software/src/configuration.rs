//! This module contains both user-configurable settings (implemented as enums) and traits to make them easier to work with in code.

mod key_map;
pub use key_map::*;

mod key_transpose;
pub use key_transpose::*;

mod key_trigger;
pub use key_trigger::*;

mod mod_assign;
pub use mod_assign::*;

mod reset_mode;
pub use reset_mode::*;

use crate::song::Part;
use num_traits::{FromPrimitive, ToPrimitive};
use wmidi::Channel;

/// A trait which allows infinite cycling of an enum's variants.
///
/// Useful for pushbutton user interfaces, allowing presses to advance from the current to the next variant,
/// cycling back to the beginning when all variants have been exhausted.
pub trait CycleConfig {
    /// Return the next variant, cycling back to the beginning as needed.
    fn cycle(self) -> Self
    where
        Self: FromPrimitive + ToPrimitive + Sized,
    {
        let index = self
            .to_u8()
            .expect("enum variants should be castable to u8");
        match <Self as FromPrimitive>::from_u8(index + 1) {
            Some(new_selection) => new_selection,
            None => FromPrimitive::from_u8(0).expect("enum should not be empty"),
        }
    }
}

/// Size in bytes of the page a [`SystemConfig`] is persisted to.
pub const CONFIG_PAGE_SIZE: usize = 32;

/// The smallest clock divider, i.e., one step per clock tick.
pub const MIN_CLOCK_DIVIDER: u8 = 1;
/// The largest clock divider, i.e., one step per quarter note at 24ppqn.
pub const MAX_CLOCK_DIVIDER: u8 = 24;

const CONFIGURED_MARK: u8 = 0x55;

const PARAM_CLOCK_DIVIDER: usize = 0;
const PARAM_MOD_ASSIGN: [usize; 2] = [1, 2];
const PARAM_MIDI_CHANNEL: [usize; 2] = [4, 5];
const PARAM_KEY_TRANSPOSE: usize = 6;
const PARAM_KEY_TRIGGER: usize = 7;
const PARAM_TEMPO: usize = 9;
const PARAM_RESET_MODE: usize = 10;
const PARAM_CURRENT_SONG: usize = 11;
const PARAM_KEY_MAP: usize = 12;
const PARAM_CONFIGURED: usize = 31;

/// Device-wide settings which persist across songs.
///
/// Setters clamp rather than reject, so a value read back from a damaged page still yields a usable configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SystemConfig {
    clock_divider: u8,
    tempo: u8,
    reset_mode: ResetMode,
    key_map: KeyMap,
    key_trigger: KeyTrigger,
    key_transpose: KeyTranspose,
    mod_assign: [ModAssign; 2],
    midi_channel: [Channel; 2],
    current_song: u8,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            clock_divider: 6,
            tempo: 100,
            reset_mode: ResetMode::default(),
            key_map: KeyMap::default(),
            key_trigger: KeyTrigger::default(),
            key_transpose: KeyTranspose::default(),
            mod_assign: [ModAssign::None; 2],
            midi_channel: [Channel::Ch1, Channel::Ch2],
            current_song: 0,
        }
    }
}

impl SystemConfig {
    /// Number of clock ticks per step for steps without their own length.
    pub fn clock_divider(&self) -> u8 {
        self.clock_divider
    }

    /// Sets the clock divider, clamped to 1–24.
    pub fn set_clock_divider(&mut self, divider: u8) {
        self.clock_divider = divider.clamp(MIN_CLOCK_DIVIDER, MAX_CLOCK_DIVIDER);
    }

    /// Internal tempo in BPM; anything below 20 selects the external clock.
    pub fn tempo(&self) -> u8 {
        self.tempo
    }

    /// Setter.
    pub fn set_tempo(&mut self, tempo: u8) {
        self.tempo = tempo;
    }

    /// Getter.
    pub fn reset_mode(&self) -> ResetMode {
        self.reset_mode
    }

    /// Setter.
    pub fn set_reset_mode(&mut self, reset_mode: ResetMode) {
        self.reset_mode = reset_mode;
    }

    /// Getter.
    pub fn key_map(&self) -> KeyMap {
        self.key_map
    }

    /// Setter.
    pub fn set_key_map(&mut self, key_map: KeyMap) {
        self.key_map = key_map;
    }

    /// Getter.
    pub fn key_trigger(&self) -> KeyTrigger {
        self.key_trigger
    }

    /// Setter.
    pub fn set_key_trigger(&mut self, key_trigger: KeyTrigger) {
        self.key_trigger = key_trigger;
    }

    /// Getter.
    pub fn key_transpose(&self) -> KeyTranspose {
        self.key_transpose
    }

    /// Setter.
    pub fn set_key_transpose(&mut self, key_transpose: KeyTranspose) {
        self.key_transpose = key_transpose;
    }

    /// Returns what the given mod CV input (0 or 1) controls. Out-of-range inputs are unassigned.
    pub fn mod_assign(&self, input: usize) -> ModAssign {
        self.mod_assign.get(input).copied().unwrap_or(ModAssign::None)
    }

    /// Assigns a mod CV input (0 or 1); out-of-range inputs are ignored.
    pub fn set_mod_assign(&mut self, input: usize, assign: ModAssign) {
        if let Some(slot) = self.mod_assign.get_mut(input) {
            *slot = assign;
        }
    }

    /// The MIDI channel a part sends on and listens to.
    pub fn midi_channel(&self, part: Part) -> Channel {
        self.midi_channel[part.index()]
    }

    /// Setter.
    pub fn set_midi_channel(&mut self, part: Part, channel: Channel) {
        self.midi_channel[part.index()] = channel;
    }

    /// The song slot (0–7) last loaded from storage.
    pub fn current_song(&self) -> u8 {
        self.current_song
    }

    /// Sets the current song slot, clamped to 0–7.
    pub fn set_current_song(&mut self, song: u8) {
        self.current_song = song.min(crate::song_file::NUM_SONGS - 1);
    }

    /// Returns `true` if the given channel belongs to either part.
    pub fn listens_on(&self, channel: Channel) -> bool {
        self.midi_channel.contains(&channel)
    }

    /// Restores a configuration from its persisted page.
    ///
    /// A page without the configured marker (e.g., never-written storage) yields factory defaults.
    pub fn from_page(page: &[u8; CONFIG_PAGE_SIZE]) -> Self {
        if page[PARAM_CONFIGURED] != CONFIGURED_MARK {
            warn!("System config page is not configured; using defaults");
            return Self::default();
        }

        let mut config = Self::default();
        config.set_clock_divider(page[PARAM_CLOCK_DIVIDER]);
        config.set_tempo(page[PARAM_TEMPO]);
        config.reset_mode = ResetMode::from_u8(page[PARAM_RESET_MODE]).unwrap_or_default();
        config.key_map = KeyMap::from_u8(page[PARAM_KEY_MAP]).unwrap_or_default();
        config.key_trigger = KeyTrigger::from_u8(page[PARAM_KEY_TRIGGER]).unwrap_or_default();
        config.key_transpose =
            KeyTranspose::from_u8(page[PARAM_KEY_TRANSPOSE]).unwrap_or_default();
        for (input, &param) in PARAM_MOD_ASSIGN.iter().enumerate() {
            config.mod_assign[input] = ModAssign::from_u8(page[param]).unwrap_or_default();
        }
        for part in Part::ALL {
            if let Ok(channel) = Channel::from_index(page[PARAM_MIDI_CHANNEL[part.index()]]) {
                config.midi_channel[part.index()] = channel;
            }
        }
        config.set_current_song(page[PARAM_CURRENT_SONG]);
        config
    }

    /// Serializes the configuration to a page, marking it as configured. Unused bytes are `0xff`.
    pub fn to_page(&self) -> [u8; CONFIG_PAGE_SIZE] {
        let mut page = [0xff; CONFIG_PAGE_SIZE];
        page[PARAM_CLOCK_DIVIDER] = self.clock_divider;
        page[PARAM_TEMPO] = self.tempo;
        page[PARAM_RESET_MODE] = self.reset_mode as u8;
        page[PARAM_KEY_MAP] = self.key_map as u8;
        page[PARAM_KEY_TRIGGER] = self.key_trigger as u8;
        page[PARAM_KEY_TRANSPOSE] = self.key_transpose as u8;
        for (input, &param) in PARAM_MOD_ASSIGN.iter().enumerate() {
            page[param] = self.mod_assign[input] as u8;
        }
        for part in Part::ALL {
            page[PARAM_MIDI_CHANNEL[part.index()]] = self.midi_channel[part.index()].index();
        }
        page[PARAM_CURRENT_SONG] = self.current_song;
        page[PARAM_CONFIGURED] = CONFIGURED_MARK;
        page
    }
}
