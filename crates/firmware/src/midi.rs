//! MIDI DIN input and output over USART6 at 31 250 baud.
//!
//! Outgoing messages are queued by the engine through [`MidiTx`] and drained by [`midi_tx_task`], so engine calls never
//! wait on the serial line.

use crate::{EngineAsyncMutex, SONG_REQUEST};
use defmt::*;
use embassy_stm32::{
    mode::Async,
    usart::{RingBufferedUartRx, UartTx},
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, pipe::Pipe};
use stepseq_lib::{
    midi_input::{MidiFramer, MidiInput},
    note_gate::MidiOut,
};
use wmidi::MidiMessage;

/// Serial MIDI's fixed baud rate.
pub const BAUD_RATE: u32 = 31_250;

const TX_QUEUE_SIZE: usize = 256;

static TX_QUEUE: Pipe<CriticalSectionRawMutex, TX_QUEUE_SIZE> = Pipe::new();

/// Engine-side handle on the outgoing queue.
pub struct MidiTx;

impl MidiOut for MidiTx {
    fn send(&mut self, message: &MidiMessage<'_>) {
        let mut bytes = [0; 3];
        let Ok(len) = message.copy_to_slice(&mut bytes) else {
            warn!("Dropping oversized outgoing MIDI message");
            return;
        };
        if TX_QUEUE.free_capacity() < len {
            warn!("MIDI output queue full; dropping message");
            return;
        }
        // capacity was checked above and the queue has a single producer
        let _ = TX_QUEUE.try_write(&bytes[..len]);
    }
}

/// Drains the outgoing queue to the UART.
#[embassy_executor::task]
pub async fn midi_tx_task(mut tx: UartTx<'static, Async>) -> ! {
    let mut buf = [0; TX_QUEUE_SIZE];
    loop {
        let n = TX_QUEUE.read(&mut buf).await;
        if let Err(e) = tx.write(&buf[..n]).await {
            error!("MIDI write failed: {}", e);
        }
    }
}

/// Frames incoming bytes into messages and hands them to the engine.
#[embassy_executor::task]
pub async fn midi_rx_task(mut rx: RingBufferedUartRx<'static>, engine: &'static EngineAsyncMutex) -> ! {
    let mut framer = MidiFramer::default();
    let mut input = MidiInput::default();
    let mut buf = [0; 32];
    loop {
        let n = match rx.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                // an overrun loses bytes mid-message; the framer resynchronizes on the next status byte
                warn!("MIDI read error: {}", e);
                framer = MidiFramer::default();
                continue;
            }
        };

        for &byte in &buf[..n] {
            let Some(frame) = framer.push(byte) else {
                continue;
            };
            let Ok(message) = MidiMessage::from_bytes(&frame) else {
                debug!("Ignoring unparsable MIDI frame");
                continue;
            };
            if let Some(request) = input.receive(&mut *engine.lock().await, &message) {
                SONG_REQUEST.signal(request);
            }
        }
    }
}
