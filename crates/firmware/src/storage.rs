//! Song and configuration storage on a 24LC256 I²C EEPROM.

use embassy_stm32::{
    i2c::{Error, I2c, Master},
    mode::Blocking,
};
use embassy_time::{Duration, block_for};
use stepseq_lib::song_file::{PAGE_SIZE, PageStorage};

/// Bus address with A0–A2 tied low.
const ADDRESS: u8 = 0x50;
/// Maximum self-timed write cycle.
const WRITE_CYCLE: Duration = Duration::from_millis(5);

/// The EEPROM, accessed one 32-byte page at a time.
pub struct Eeprom {
    i2c: I2c<'static, Blocking, Master>,
}

impl Eeprom {
    /// Wraps the bus the EEPROM is attached to.
    pub fn new(i2c: I2c<'static, Blocking, Master>) -> Self {
        Self { i2c }
    }
}

impl PageStorage for Eeprom {
    type Error = Error;

    fn read_page(&mut self, address: u16, page: &mut [u8; PAGE_SIZE]) -> Result<(), Self::Error> {
        self.i2c.blocking_write_read(ADDRESS, &address.to_be_bytes(), page)
    }

    fn write_page(&mut self, address: u16, page: &[u8; PAGE_SIZE]) -> Result<(), Self::Error> {
        let mut frame = [0; PAGE_SIZE + 2];
        frame[..2].copy_from_slice(&address.to_be_bytes());
        frame[2..].copy_from_slice(page);
        self.i2c.blocking_write(ADDRESS, &frame)?;
        // the device NAKs until the write cycle completes
        block_for(WRITE_CYCLE);
        Ok(())
    }
}
