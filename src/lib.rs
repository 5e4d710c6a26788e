/*!
 # Bell Controller Library

 A Rust library for schedule-driven bell controllers: rings audio bells at
 configured times of day, sequences the amplifier relay around each clip, and
 persists the schedule as fixed-layout binary records on the storage medium.

 ## Features

 * Daily and weekly schedule templates (up to 10, each with up to 30 bells per day)
 * Per-second schedule matching with single-fire debounce and next-bell lookup
 * Relay/amplifier warm-up and cool-down delays around playback
 * Manual preset bells triggered on demand, independent of the schedule
 * Binary record persistence compatible with SD-card style media

 ## Example

 ```rust
 use bell_controller::*;

 fn main() -> Result<()> {
     // Build today's bell list (kept time-ascending on insert)
     let mut bells = BellList::new();
     bells.insert(BellEntry::new("Assembly", BellTime::new(7, 0)?, "/sd/chime.mp3")?)?;
     bells.insert(BellEntry::new("Lunch", BellTime::new(12, 0)?, "/sd/lunch.mp3")?)?;

     // One minute before the first bell, it is the next bell
     let now = WallTime::new(6, 59, 0, DayOfWeek::Monday, 9);
     let mut engine = ScheduleEngine::new();
     engine.rebuild(bells, &now);
     assert_eq!(engine.next_bell().map(|(i, _)| i), Some(0));

     Ok(())
 }
 ```
*/

use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for the bell controller library
#[derive(Error, Debug)]
pub enum Error {
    /// Storage medium was not detected at startup
    #[error("Storage medium is not available")]
    StorageUnavailable,

    /// Record open/read/write failure on an available medium
    #[error("Record I/O failed at {}: {source}", path.display())]
    RecordIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Record exists but its size, version or fields are unusable
    #[error("Malformed record at {}: {detail}", path.display())]
    MalformedRecord { path: PathBuf, detail: String },

    /// Multi-step template operation completed partially
    #[error("Template '{name}' is in an inconsistent state: {detail}")]
    InconsistentTemplate { name: String, detail: String },

    /// Name is empty or exceeds the fixed record field
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// A template with this name already exists
    #[error("Template '{0}' already exists")]
    TemplateExists(String),

    /// Template count reached the system-wide limit
    #[error("Template limit reached ({0} max)")]
    TemplateLimit(usize),

    /// Bell list already holds the maximum number of entries
    #[error("Bell list is full ({0} entries max)")]
    BellListFull(usize),

    /// Time-of-day code out of the 0-2359 range or with minute > 59
    #[error("Invalid time-of-day code {0}")]
    InvalidTime(u16),

    /// Audio path exceeds the fixed record field
    #[error("Audio path too long: {0}")]
    AudioPathTooLong(String),

    /// Audio file rejected by the rendering context
    #[error("Unsupported audio format: {0}")]
    UnsupportedAudioFormat(String),

    /// Clock source not found or lost power
    #[error("Clock fault: {0}")]
    ClockFault(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// Re-export modules
pub mod audio;
pub mod engine;
pub mod schedule;
pub mod storage;
pub mod timer;

// Re-export key types
pub use audio::{
    volume_to_gain, AudioCoordinator, AudioPump, AudioRenderer, AudioShared, BellOutputs,
    LogOutputs, SilentRenderer, MAX_VOLUME,
};
pub use engine::{FireState, ScheduleEngine};
pub use schedule::{
    BellEntry, BellList, BellTime, Clock, DayOfWeek, ManualPreset, ScheduleKind, ScheduleTemplate,
    SystemClock, WallTime, MANUAL_PRESET_SLOTS, MAX_BELLS, MAX_TEMPLATES,
};
pub use storage::{Storage, TemplateIndex};
pub use timer::OnDelay;
