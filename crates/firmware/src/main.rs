//! stepseq is [Embassy](https://embassy.dev)-based firmware for a two-part hardware step sequencer. The firmware runs on
//! the [Nucleo-F767ZI development board](https://www.st.com/en/evaluation-tools/nucleo-f767zi.html), which is powered by
//! an F7-series STM32 microcontroller.
//!
//! Sixteen sequences of sixteen steps, stored as eight songs on an I²C EEPROM, are played in time with the internal
//! tempo, an analog clock input or incoming MIDI clock. Each of the two parts is sent out over MIDI DIN and as
//! [CV/gate](https://en.wikipedia.org/wiki/CV/gate). All sequencing logic lives in `stepseq_lib`; this crate owns the
//! peripherals and feeds timer ticks, edges and MIDI bytes into its [`Engine`].
//!

#![no_std]
#![no_main]

mod cv_output;
mod midi;
mod storage;

use crate::{
    cv_output::CvOutput,
    midi::{MidiTx, midi_rx_task, midi_tx_task},
    storage::Eeprom,
};
use defmt::*;
use embassy_executor::Spawner;
use embassy_stm32::{
    Config,
    adc::{Adc, AdcChannel, AnyAdcChannel},
    bind_interrupts,
    dac::Dac,
    exti::ExtiInput,
    gpio::{Level, Output, Pull, Speed},
    i2c::{Config as I2cConfig, I2c},
    peripherals::{self, ADC1},
    time::Hertz,
    usart::{self, Uart},
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex, signal::Signal};
use embassy_time::{Duration, Ticker};
use static_cell::StaticCell;
use stepseq_lib::{
    clock::TIMER_PERIOD,
    configuration::CycleConfig as _,
    engine::{Engine, Notification},
    midi_input::SongRequest,
    song::Song,
    song_file::{FileEvent, SongFile, read_config, write_config},
};

use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(
    #[doc(hidden)]
    struct Irqs {
        USART6 => usart::InterruptHandler<peripherals::USART6>;
    }
);

type EngineAsyncMutex = mutex::Mutex<CriticalSectionRawMutex, Engine<Song, MidiTx, CvOutput>>;

/// Song Select requests, picked up by the panel task which owns storage.
static SONG_REQUEST: Signal<CriticalSectionRawMutex, SongRequest> = Signal::new();

/// Period of the panel task: LEDs, mod inputs and one page of any running load or save.
const PANEL_PERIOD: Duration = Duration::from_millis(16);

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Initializing stepseq");

    let mut config = Config::default();
    {
        use embassy_stm32::rcc::*;
        // hse: high-speed external clock
        config.rcc.hse = Some(Hse {
            freq: Hertz(8_000_000),
            mode: HseMode::Bypass,
        });

        // pll: phase-locked loop, crucial for dividing clock
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL216,
            divp: Some(PllPDiv::DIV2), // 8mhz / 4 * 216 / 2 = 216Mhz
            divq: None,
            divr: None,
        });
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;
        config.rcc.sys = Sysclk::PLL1_P;
    }
    let p = embassy_stm32::init(config);

    // the configuration is read before anything is spawned so the engine starts with the saved tempo and channels
    let i2c = I2c::new_blocking(p.I2C1, p.PB8, p.PB9, {
        let mut i2c_config = I2cConfig::default();
        i2c_config.frequency = Hertz(400_000);
        i2c_config
    });
    let mut eeprom = Eeprom::new(i2c);
    let system_config = read_config(&mut eeprom);

    // per RM0410, DAC channel 1 outputs on port A, pin 4 and channel 2 on pin 5
    let (dac_ch1, dac_ch2) = Dac::new(p.DAC1, p.DMA1_CH5, p.DMA1_CH6, p.PA4, p.PA5).split();
    let gates = [
        Output::new(p.PG0, Level::Low, Speed::Low),
        Output::new(p.PG1, Level::Low, Speed::Low),
    ];
    let cv = CvOutput::new(dac_ch1, dac_ch2, gates);

    static ENGINE: StaticCell<EngineAsyncMutex> = StaticCell::new();
    let engine = ENGINE.init(mutex::Mutex::new(Engine::new(
        Song::new(),
        system_config,
        MidiTx,
        cv,
    )));

    let mut uart_config = usart::Config::default();
    uart_config.baudrate = midi::BAUD_RATE;
    let uart = unwrap!(Uart::new(
        p.USART6,
        p.PC7,
        p.PC6,
        Irqs,
        p.DMA2_CH6,
        p.DMA2_CH1,
        uart_config
    ));
    let (tx, rx) = uart.split();
    static RX_DMA_BUFFER: StaticCell<[u8; 64]> = StaticCell::new();
    let rx = rx.into_ring_buffered(RX_DMA_BUFFER.init([0; 64]));
    unwrap!(spawner.spawn(midi_tx_task(tx)));
    unwrap!(spawner.spawn(midi_rx_task(rx, engine)));

    unwrap!(spawner.spawn(timer_task(engine)));

    let clock_in = ExtiInput::new(p.PE2, p.EXTI2, Pull::Down);
    unwrap!(spawner.spawn(clock_in_task(clock_in, engine)));

    let reset_in = ExtiInput::new(p.PE3, p.EXTI3, Pull::Down);
    unwrap!(spawner.spawn(reset_in_task(reset_in, engine)));

    let button = ExtiInput::new(p.PC13, p.EXTI13, Pull::None);
    unwrap!(spawner.spawn(run_stop_task(button, engine)));

    let key_map_button = ExtiInput::new(p.PD1, p.EXTI1, Pull::Up);
    unwrap!(spawner.spawn(key_map_task(key_map_button, engine)));

    let leds = Leds {
        clock: Output::new(p.PB0, Level::Low, Speed::Low),
        activity: Output::new(p.PB7, Level::Low, Speed::Low),
        playing: Output::new(p.PB14, Level::Low, Speed::Low),
    };
    let mod_inputs = ModInputs {
        adc: Adc::new(p.ADC1),
        channels: [p.PA3.degrade_adc(), p.PC0.degrade_adc()],
    };
    unwrap!(spawner.spawn(panel_task(engine, eeprom, leds, mod_inputs)));
}

/// Drives the engine's fixed-period timer, which keeps the internal tempo and every timeout.
#[embassy_executor::task]
async fn timer_task(engine: &'static EngineAsyncMutex) -> ! {
    let mut ticker = Ticker::every(TIMER_PERIOD);
    loop {
        ticker.next().await;
        engine.lock().await.tick();
    }
}

/// Handles pulses on the analog clock input.
#[embassy_executor::task]
async fn clock_in_task(mut input: ExtiInput<'static>, engine: &'static EngineAsyncMutex) -> ! {
    loop {
        input.wait_for_rising_edge().await;
        engine.lock().await.analog_clock_edge();
    }
}

/// Handles pulses on the analog reset input.
#[embassy_executor::task]
async fn reset_in_task(mut input: ExtiInput<'static>, engine: &'static EngineAsyncMutex) -> ! {
    loop {
        input.wait_for_rising_edge().await;
        engine.lock().await.analog_reset_edge();
    }
}

/// Handles presses of the run/stop button.
#[embassy_executor::task]
async fn run_stop_task(mut button: ExtiInput<'static>, engine: &'static EngineAsyncMutex) -> ! {
    loop {
        button.wait_for_rising_edge().await;
        engine.lock().await.toggle_run_stop();
    }
}

/// Cycles the stored key map; the panel task persists the change.
#[embassy_executor::task]
async fn key_map_task(mut button: ExtiInput<'static>, engine: &'static EngineAsyncMutex) -> ! {
    loop {
        button.wait_for_rising_edge().await;
        let mut engine = engine.lock().await;
        let mut config = *engine.config();
        config.set_key_map(config.key_map().cycle());
        engine.set_config(config);
        info!("Key map {}", config.key_map());
    }
}

#[doc(hidden)]
struct Leds {
    clock: Output<'static>,
    activity: Output<'static>,
    playing: Output<'static>,
}

#[doc(hidden)]
struct ModInputs {
    adc: Adc<'static, ADC1>,
    channels: [AnyAdcChannel<ADC1>; 2],
}

/// Slow housekeeping: song loads and saves, configuration persistence, mod inputs and status LEDs.
///
/// The clock and activity LEDs light for one period after each pulse; the playing LED follows the transport.
#[embassy_executor::task]
async fn panel_task(
    engine: &'static EngineAsyncMutex,
    mut eeprom: Eeprom,
    mut leds: Leds,
    mut mod_inputs: ModInputs,
) -> ! {
    let mut song_file = SongFile::new();
    let mut saved_config = *engine.lock().await.config();
    song_file.load(saved_config.current_song());

    let mut ticker = Ticker::every(PANEL_PERIOD);
    loop {
        ticker.next().await;

        if let Some(request) = SONG_REQUEST.try_take() {
            if !song_file.load(request.song) {
                warn!("Ignoring request for song {} while storage is busy", request.song);
            }
        }

        // storage is only touched with the engine unlocked
        if song_file.is_busy() {
            song_file.prepare(&mut *engine.lock().await);
            song_file.transfer(&mut eeprom);
            match song_file.apply(&mut *engine.lock().await) {
                Some(FileEvent::Loaded(song)) => info!("Loaded song {}", song),
                Some(FileEvent::Blank(song)) => info!("Song {} is blank", song),
                Some(FileEvent::Saved(song)) => info!("Saved song {}", song),
                Some(FileEvent::Failed(song)) => error!("Storage failed on song {}", song),
                None => {}
            }
        } else {
            let config = *engine.lock().await.config();
            if config != saved_config {
                match write_config(&mut eeprom, &config) {
                    Ok(()) => saved_config = config,
                    Err(e) => error!("Failed to save system config: {}", e),
                }
            }
        }

        let mut readings = [0; 2];
        for (reading, channel) in readings.iter_mut().zip(mod_inputs.channels.iter_mut()) {
            // the ADC is 12 bits; mod inputs are handled at 10
            *reading = mod_inputs.adc.blocking_read(channel) >> 2;
        }

        let mut engine = engine.lock().await;
        for (input, reading) in readings.into_iter().enumerate() {
            engine.mod_input(input, reading);
        }

        let notifications = engine.take_notifications();
        if notifications.contains(Notification::PlaybackChanged) {
            debug!(
                "Playing sequence {} step {}",
                engine.playing_sequence(),
                engine.playing_step()
            );
        }
        leds.clock
            .set_level(notifications.contains(Notification::ClockPulse).into());
        leds.activity
            .set_level(notifications.contains(Notification::ModActivity).into());
        leds.playing.set_level(engine.is_playing().into());
    }
}
