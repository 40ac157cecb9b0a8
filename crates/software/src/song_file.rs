//! Background load and save of songs to page storage.
//!
//! A song is 16 sequence images of 128 bytes, i.e., 64 pages of 32 bytes. Page storage is far too slow to touch from
//! the real-time path, so [`SongFile`] moves a single page per call and is driven from housekeeping. Each page goes
//! through three phases so that the storage access itself needs no engine: [`SongFile::prepare`] and
//! [`SongFile::apply`] take the engine, [`SongFile::transfer`] takes only the storage. The transport is forced to
//! stopped on either side of every page so playback never reads a half-loaded song.

use crate::{
    configuration::{CONFIG_PAGE_SIZE, SystemConfig},
    engine::Engine,
    note_gate::{CvSink, MidiOut},
    song::{NUM_SEQUENCES, SEQUENCE_IMAGE_SIZE, Sequence, Song},
};

/// Size of a storage page in bytes.
pub const PAGE_SIZE: usize = 32;
/// Number of song slots.
pub const NUM_SONGS: u8 = 8;
/// Pages in one song.
pub const PAGES_PER_SONG: u8 = (NUM_SEQUENCES as usize * PAGES_PER_SEQUENCE) as u8;
/// Address of the system configuration page, just past the last song.
pub const CONFIG_ADDRESS: u16 = 0x4000;

const PAGES_PER_SEQUENCE: usize = SEQUENCE_IMAGE_SIZE / PAGE_SIZE;

/// Byte-addressed storage read and written a page at a time.
pub trait PageStorage {
    /// Error raised by the underlying device.
    type Error;

    /// Reads the page starting at `address`.
    fn read_page(&mut self, address: u16, page: &mut [u8; PAGE_SIZE]) -> Result<(), Self::Error>;

    /// Writes the page starting at `address`.
    fn write_page(&mut self, address: u16, page: &[u8; PAGE_SIZE]) -> Result<(), Self::Error>;
}

/// Storage address of a page of a song.
pub fn page_address(song: u8, page: u8) -> u16 {
    ((song as u16) << 11) | ((page as u16) << 5)
}

/// Reads the system configuration, falling back to defaults if storage fails or was never written.
pub fn read_config<P: PageStorage>(storage: &mut P) -> SystemConfig {
    let mut page = [0; CONFIG_PAGE_SIZE];
    match storage.read_page(CONFIG_ADDRESS, &mut page) {
        Ok(()) => SystemConfig::from_page(&page),
        Err(_) => {
            error!("Failed to read system config");
            SystemConfig::default()
        }
    }
}

/// Writes the system configuration.
pub fn write_config<P: PageStorage>(storage: &mut P, config: &SystemConfig) -> Result<(), P::Error> {
    storage.write_page(CONFIG_ADDRESS, &config.to_page())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Idle,
    Loading { song: u8, page: u8 },
    Saving { song: u8, page: u8 },
    Failed(u8),
}

/// The outcome of a finished file operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FileEvent {
    /// A song was loaded and playback reset to its top.
    Loaded(u8),
    /// A song slot held no song; a factory-blank song was put in place.
    Blank(u8),
    /// A song was saved.
    Saved(u8),
    /// Storage failed; the operation was abandoned.
    Failed(u8),
}

/// The load/save state machine.
#[derive(Debug, Clone)]
pub struct SongFile {
    operation: Operation,
    buffer: [u8; SEQUENCE_IMAGE_SIZE],
}

impl Default for SongFile {
    fn default() -> Self {
        Self::new()
    }
}

impl SongFile {
    /// An idle file manager.
    pub fn new() -> Self {
        Self {
            operation: Operation::Idle,
            buffer: [0; SEQUENCE_IMAGE_SIZE],
        }
    }

    /// Returns `true` while a load or save is in progress.
    pub fn is_busy(&self) -> bool {
        self.operation != Operation::Idle
    }

    /// Starts loading a song. Ignored, returning `false`, if busy or the slot does not exist.
    pub fn load(&mut self, song: u8) -> bool {
        self.begin(Operation::Loading { song, page: 0 }, song)
    }

    /// Starts saving the current song to a slot. Ignored, returning `false`, if busy or the slot does not exist.
    pub fn save(&mut self, song: u8) -> bool {
        self.begin(Operation::Saving { song, page: 0 }, song)
    }

    fn begin(&mut self, operation: Operation, song: u8) -> bool {
        if song >= NUM_SONGS || self.is_busy() {
            return false;
        }
        self.operation = operation;
        true
    }

    /// Moves one page in a single call, holding the engine throughout. See [`prepare`](Self::prepare) for the phased
    /// form that keeps storage access out of the engine's critical section.
    pub fn step<P: PageStorage, M: MidiOut, C: CvSink>(
        &mut self,
        storage: &mut P,
        engine: &mut Engine<Song, M, C>,
    ) -> Option<FileEvent> {
        self.prepare(engine);
        self.transfer(storage);
        self.apply(engine)
    }

    /// First phase of a page: stops the transport and, when saving, snapshots the sequence about to be written.
    pub fn prepare<M: MidiOut, C: CvSink>(&mut self, engine: &mut Engine<Song, M, C>) {
        match self.operation {
            Operation::Idle | Operation::Failed(_) => {}
            Operation::Loading { .. } => engine.stop_command(),
            Operation::Saving { page, .. } => {
                engine.stop_command();
                if page as usize % PAGES_PER_SEQUENCE == 0 {
                    let seq = page / PAGES_PER_SEQUENCE as u8;
                    self.buffer = engine.song().sequence(seq).to_image();
                }
            }
        }
    }

    /// Second phase: moves the page between storage and the internal buffer. Needs no access to the engine.
    pub fn transfer<P: PageStorage>(&mut self, storage: &mut P) {
        let (song, page, result) = match self.operation {
            Operation::Idle | Operation::Failed(_) => return,
            Operation::Loading { song, page } => {
                let offset = Self::offset(page);
                let mut bytes = [0; PAGE_SIZE];
                let result = storage.read_page(page_address(song, page), &mut bytes);
                self.buffer[offset..offset + PAGE_SIZE].copy_from_slice(&bytes);
                (song, page, result)
            }
            Operation::Saving { song, page } => {
                let offset = Self::offset(page);
                let mut bytes = [0; PAGE_SIZE];
                bytes.copy_from_slice(&self.buffer[offset..offset + PAGE_SIZE]);
                (song, page, storage.write_page(page_address(song, page), &bytes))
            }
        };
        if result.is_err() {
            error!("Storage failed on page {} of song {}", page, song);
            self.operation = Operation::Failed(song);
        }
    }

    /// Last phase: applies a loaded sequence to the engine and advances to the next page. Returns an event once the
    /// operation finishes.
    pub fn apply<M: MidiOut, C: CvSink>(&mut self, engine: &mut Engine<Song, M, C>) -> Option<FileEvent> {
        let (event, next) = match self.operation {
            Operation::Idle => return None,
            Operation::Failed(song) => (Some(FileEvent::Failed(song)), Operation::Idle),
            Operation::Loading { song, page } => {
                engine.stop_command();
                match self.apply_loaded(engine, song, page) {
                    None => (None, Operation::Loading { song, page: page + 1 }),
                    event => (event, Operation::Idle),
                }
            }
            Operation::Saving { song, page } => {
                engine.stop_command();
                match Self::apply_saved(engine, song, page) {
                    None => (None, Operation::Saving { song, page: page + 1 }),
                    event => (event, Operation::Idle),
                }
            }
        };
        self.operation = next;
        event
    }

    fn offset(page: u8) -> usize {
        (page as usize % PAGES_PER_SEQUENCE) * PAGE_SIZE
    }

    fn apply_loaded<M: MidiOut, C: CvSink>(
        &mut self,
        engine: &mut Engine<Song, M, C>,
        song: u8,
        page: u8,
    ) -> Option<FileEvent> {
        if Self::offset(page) + PAGE_SIZE == SEQUENCE_IMAGE_SIZE {
            let seq = page / PAGES_PER_SEQUENCE as u8;
            let Some(sequence) = Sequence::from_image(&self.buffer) else {
                warn!("Song {} sequence {} is not configured; clearing song", song, seq);
                engine.edit_song(Song::clear);
                Self::finish_load(engine, song);
                return Some(FileEvent::Blank(song));
            };
            engine.edit_song(|loaded| loaded.set_sequence(seq, sequence));
        }

        if page + 1 == PAGES_PER_SONG {
            Self::finish_load(engine, song);
            return Some(FileEvent::Loaded(song));
        }
        None
    }

    fn finish_load<M: MidiOut, C: CvSink>(engine: &mut Engine<Song, M, C>, song: u8) {
        let mut config = *engine.config();
        config.set_current_song(song);
        engine.set_config(config);
        engine.new_song_loaded();
    }

    fn apply_saved<M: MidiOut, C: CvSink>(engine: &mut Engine<Song, M, C>, song: u8, page: u8) -> Option<FileEvent> {
        if page + 1 == PAGES_PER_SONG {
            let mut config = *engine.config();
            config.set_current_song(song);
            engine.set_config(config);
            info!("Saved song {}", song);
            return Some(FileEvent::Saved(song));
        }
        None
    }
}
