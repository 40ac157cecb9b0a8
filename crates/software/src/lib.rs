//! This crate contains architecture-agnostic logic for a two-part hardware step sequencer. Sixteen sequences of sixteen
//! steps are played back in time with an internal tempo, an analog clock pulse or incoming
//! [MIDI](https://midi.org/midi-1-0) clock, and the resulting notes are sent out over MIDI and as
//! [CV/gate](https://en.wikipedia.org/wiki/CV/gate).
//!
//! The [`Engine`](engine::Engine) is the single owned context through which every timer, edge and MIDI event passes. It
//! never touches hardware; pattern storage, note outputs and page storage are reached through traits so the firmware can
//! supply drivers and the tests can supply recorders.

#![deny(missing_docs)]
#![no_std]

#[macro_use]
mod fmt;

pub mod clock;
pub mod configuration;
pub mod cv;
pub mod engine;
pub mod midi_input;
pub mod note_gate;
pub mod overrides;
pub mod scale;
pub mod sequencer;
pub mod song;
pub mod song_file;

#[cfg(test)]
mod testing;
