use tinyvec::ArrayVec;

const SYSEX_START: u8 = 0xf0;
const SYSEX_END: u8 = 0xf7;
const REALTIME: u8 = 0xf8;

/// Splits a serial MIDI byte stream into complete messages.
///
/// Running status is honored for channel messages. Realtime bytes are passed through immediately, even in the middle of
/// another message, without disturbing it. System exclusive data is skipped.
#[derive(Debug, Default, Clone)]
pub struct MidiFramer {
    status: Option<u8>,
    data: ArrayVec<[u8; 2]>,
    in_sysex: bool,
}

impl MidiFramer {
    /// Feeds one byte, returning a message once one is complete.
    pub fn push(&mut self, byte: u8) -> Option<ArrayVec<[u8; 3]>> {
        if byte >= REALTIME {
            let mut message = ArrayVec::new();
            message.push(byte);
            return Some(message);
        }

        if byte & 0x80 != 0 {
            self.data.clear();
            self.in_sysex = byte == SYSEX_START;
            self.status = match byte {
                SYSEX_START | SYSEX_END => None,
                status => Some(status),
            };
            // a status with no data bytes is complete on its own
            return self.complete();
        }

        if self.in_sysex {
            return None;
        }
        data_length(self.status?)?;
        self.data.push(byte);
        self.complete()
    }

    fn complete(&mut self) -> Option<ArrayVec<[u8; 3]>> {
        let status = self.status?;
        let expected = data_length(status)?;
        if self.data.len() < expected {
            return None;
        }

        let mut message = ArrayVec::new();
        message.push(status);
        message.extend_from_slice(&self.data);
        self.data.clear();
        // system common messages cancel running status
        if status >= SYSEX_START {
            self.status = None;
        }
        Some(message)
    }
}

fn data_length(status: u8) -> Option<usize> {
    match status & 0xf0 {
        0x80 | 0x90 | 0xa0 | 0xb0 | 0xe0 => Some(2),
        0xc0 | 0xd0 => Some(1),
        _ => match status {
            0xf1 | 0xf3 => Some(1),
            0xf2 => Some(2),
            0xf6 => Some(0),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;
    use std::vec::Vec;

    fn frame(bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut framer = MidiFramer::default();
        bytes
            .iter()
            .filter_map(|&byte| framer.push(byte))
            .map(|message| message.to_vec())
            .collect()
    }

    #[test]
    fn running_status() {
        assert_eq!(
            std::vec![std::vec![0x90, 60, 100], std::vec![0x90, 62, 0], std::vec![0xc1, 5], std::vec![0xc1, 6]],
            frame(&[0x90, 60, 100, 62, 0, 0xc1, 5, 6]),
            "Expected left but got right"
        );
    }

    #[test]
    fn realtime_interleaves() {
        assert_eq!(
            std::vec![std::vec![0xf8], std::vec![0xb0, 20, 64]],
            frame(&[0xb0, 20, 0xf8, 64]),
            "Expected left but got right"
        );
    }

    #[test]
    fn sysex_is_skipped() {
        assert_eq!(
            std::vec![std::vec![0x80, 60, 0]],
            frame(&[0xf0, 0x00, 0x01, 0x72, 0xf7, 0x80, 60, 0]),
            "Expected left but got right"
        );
    }

    #[test]
    fn system_common_cancels_running_status() {
        assert_eq!(
            std::vec![std::vec![0xf2, 0x10, 0x00], std::vec![0xf3, 2]],
            frame(&[0xf2, 0x10, 0x00, 0x05, 0xf3, 2]),
            "Expected left but got right"
        );
    }

    #[test]
    fn stray_data_is_ignored() {
        assert!(frame(&[1, 2, 3]).is_empty());
    }
}
