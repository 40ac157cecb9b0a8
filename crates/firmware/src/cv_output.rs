//! CV/gate outputs: one DAC channel and one gate pin per part.

use defmt::*;
use embassy_stm32::{
    dac::{DacCh1, DacCh2, Value},
    gpio::Output,
    mode::Async,
    peripherals::DAC1,
};
use measurements::Voltage;
use stepseq_lib::{
    cv::{DacScale, pitch_voltage},
    note_gate::{CvSink, NoteSink, Pitch},
    song::Part,
};
use wmidi::U7;

/// Output voltage when the DAC is at full scale; the op-amp stage after the DAC amplifies its 3.3 V range to 8 V.
const FULL_SCALE_VOLTS: f64 = 8.0;
const DAC_MAX_CODE: u16 = 4095;

/// Drives the pitch CVs and gates of both parts.
pub struct CvOutput {
    part_one: DacCh1<'static, DAC1, Async>,
    part_two: DacCh2<'static, DAC1, Async>,
    gates: [Output<'static>; 2],
    scale: DacScale,
}

impl CvOutput {
    /// Wraps the DAC channels and the gate pins of parts 1 and 2.
    pub fn new(
        part_one: DacCh1<'static, DAC1, Async>,
        part_two: DacCh2<'static, DAC1, Async>,
        gates: [Output<'static>; 2],
    ) -> Self {
        Self {
            part_one,
            part_two,
            gates,
            scale: DacScale::new(Voltage::from_volts(FULL_SCALE_VOLTS), DAC_MAX_CODE),
        }
    }

    /// Sets a part's pitch CV. Returns `false` if the pitch is beyond the CV range.
    fn set_pitch(&mut self, part: Part, pitch: Pitch) -> bool {
        let Some(voltage) = pitch_voltage(pitch) else {
            debug!("Pitch {} is above the CV range", pitch.value());
            return false;
        };
        let value = Value::Bit12Right(self.scale.code(voltage));
        match part {
            Part::One => self.part_one.set(value),
            Part::Two => self.part_two.set(value),
        }
        true
    }
}

impl NoteSink for CvOutput {
    fn note_on(&mut self, part: Part, pitch: Pitch, _velocity: U7) {
        if self.set_pitch(part, pitch) {
            self.gates[part.index()].set_high();
        }
    }

    fn note_off(&mut self, part: Part, _pitch: Pitch) {
        // the pitch CV is left where it was so release stages keep their frequency
        self.gates[part.index()].set_low();
    }
}

impl CvSink for CvOutput {
    fn calibrate(&mut self, part: Part, pitch: Pitch) {
        if self.set_pitch(part, pitch) {
            self.gates[part.index()].set_high();
        }
    }
}
