//! Recording doubles for the output traits.

extern crate std;

use crate::{
    note_gate::{CvSink, MidiOut, NoteSink, Pitch},
    song::Part,
    song_file::PageStorage,
};
use std::vec::Vec;
use wmidi::{MidiMessage, U7};

/// Encodes a message the way a UART would see it.
pub fn encode(message: &MidiMessage<'_>) -> Vec<u8> {
    let mut bytes = std::vec![0; message.bytes_size()];
    if message.copy_to_slice(&mut bytes).is_err() {
        panic!("message should fit its own size");
    }
    bytes
}

/// Keeps every message sent, encoded.
#[derive(Default)]
pub struct MidiRecorder {
    pub sent: Vec<Vec<u8>>,
}

impl MidiRecorder {
    pub fn contains(&self, message: &MidiMessage<'_>) -> bool {
        let expected = encode(message);
        self.sent.iter().any(|sent| *sent == expected)
    }

    pub fn count(&self, message: &MidiMessage<'_>) -> usize {
        let expected = encode(message);
        self.sent.iter().filter(|sent| **sent == expected).count()
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }
}

impl MidiOut for MidiRecorder {
    fn send(&mut self, message: &MidiMessage<'_>) {
        self.sent.push(encode(message));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvEvent {
    On(Part, u8),
    Off(Part, u8),
    Calibrate(Part, u8),
}

#[derive(Default)]
pub struct CvRecorder {
    pub events: Vec<CvEvent>,
}

impl NoteSink for CvRecorder {
    fn note_on(&mut self, part: Part, pitch: Pitch, _velocity: U7) {
        self.events.push(CvEvent::On(part, pitch.value()));
    }

    fn note_off(&mut self, part: Part, pitch: Pitch) {
        self.events.push(CvEvent::Off(part, pitch.value()));
    }
}

impl CvSink for CvRecorder {
    fn calibrate(&mut self, part: Part, pitch: Pitch) {
        self.events.push(CvEvent::Calibrate(part, pitch.value()));
    }
}

/// Page storage backed by a flat byte array, erased to `0xff`.
pub struct MemoryStorage {
    pub bytes: Vec<u8>,
    pub fail_at: Option<u16>,
}

impl MemoryStorage {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: std::vec![0xff; size],
            fail_at: None,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct StorageFault;

impl PageStorage for MemoryStorage {
    type Error = StorageFault;

    fn read_page(&mut self, address: u16, page: &mut [u8; 32]) -> Result<(), Self::Error> {
        if self.fail_at == Some(address) {
            return Err(StorageFault);
        }
        let start = address as usize;
        page.copy_from_slice(&self.bytes[start..start + 32]);
        Ok(())
    }

    fn write_page(&mut self, address: u16, page: &[u8; 32]) -> Result<(), Self::Error> {
        if self.fail_at == Some(address) {
            return Err(StorageFault);
        }
        let start = address as usize;
        self.bytes[start..start + 32].copy_from_slice(page);
        Ok(())
    }
}
