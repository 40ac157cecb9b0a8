//! Conversion of engine pitches to control voltages and DAC codes.

use crate::note_gate::Pitch;
use measurements::Voltage;

/// Highest pitch the CV output can reach: six octaves above its zero.
pub const MAX_CV_PITCH: u8 = 72;

/// The voltage for a pitch at 1 V/octave, or `None` above [`MAX_CV_PITCH`].
pub fn pitch_voltage(pitch: Pitch) -> Option<Voltage> {
    if pitch.value() > MAX_CV_PITCH {
        return None;
    }
    Some(Voltage::from_volts(pitch.value() as f64 / 12.0))
}

/// Maps output voltages onto DAC codes, accounting for the gain of the analog stage after the DAC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DacScale {
    full_scale: Voltage,
    max_code: u16,
}

impl DacScale {
    /// `full_scale` is the output voltage when the DAC is at `max_code`.
    pub fn new(full_scale: Voltage, max_code: u16) -> Self {
        Self { full_scale, max_code }
    }

    /// The DAC code nearest to `voltage`, clamped to the DAC's range.
    pub fn code(&self, voltage: Voltage) -> u16 {
        let fraction = voltage.as_volts() / self.full_scale.as_volts();
        let code = fraction * self.max_code as f64 + 0.5;
        if code <= 0.0 {
            0
        } else if code >= self.max_code as f64 {
            self.max_code
        } else {
            code as u16
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_volt_per_octave() {
        assert_eq!(Some(Voltage::from_volts(0.0)), pitch_voltage(Pitch::new(0)));
        assert_eq!(Some(Voltage::from_volts(2.0)), pitch_voltage(Pitch::new(24)));
        assert_eq!(Some(Voltage::from_volts(6.0)), pitch_voltage(Pitch::new(72)));
        assert_eq!(None, pitch_voltage(Pitch::new(73)), "Expected left but got right");
    }

    #[test]
    fn dac_codes() {
        let scale = DacScale::new(Voltage::from_volts(8.0), 4095);
        assert_eq!(0, scale.code(Voltage::from_volts(0.0)), "Expected left but got right");
        assert_eq!(2048, scale.code(Voltage::from_volts(4.0)), "Expected left but got right");
        assert_eq!(4095, scale.code(Voltage::from_volts(9.0)), "Should clamp to the top code");
        assert_eq!(0, scale.code(Voltage::from_volts(-1.0)), "Should clamp to the bottom code");
    }
}
