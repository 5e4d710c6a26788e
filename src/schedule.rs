/*!
 # Schedule data model

 This module provides the schedule data types for the bell controller:
 bell entries and per-day bell lists, daily/weekly schedule templates,
 manual preset bells, and the wall-clock snapshot the matching engine
 consumes once per tick.
*/

use chrono::{Datelike, Local, Timelike};

use crate::{Error, Result};

/// Maximum number of bells in one day's list
pub const MAX_BELLS: usize = 30;

/// Maximum number of schedule templates system-wide
pub const MAX_TEMPLATES: usize = 10;

/// Number of manual preset slots
pub const MANUAL_PRESET_SLOTS: usize = 4;

/// Maximum name length in bytes (fixed 32-byte record field, NUL-terminated)
pub const MAX_NAME_LEN: usize = 31;

/// Maximum audio path length in bytes (fixed 128-byte record field, NUL-terminated)
pub const MAX_AUDIO_PATH_LEN: usize = 127;

/// Days of the week, Sunday-first to match the clock source's numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayOfWeek {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayOfWeek {
    /// All days in slot order (Sunday = slot 0)
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Sunday,
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
    ];

    /// Day-slot index, 0-6
    pub fn index(self) -> usize {
        self as usize
    }

    /// Day for a slot index, if in range
    pub fn from_index(index: usize) -> Option<DayOfWeek> {
        DayOfWeek::ALL.get(index).copied()
    }

    /// Display label
    pub fn label(self) -> &'static str {
        match self {
            DayOfWeek::Sunday => "Sunday",
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
        }
    }
}

impl std::fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Time of day encoded as `hour * 100 + minute` (0-2359)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BellTime(u16);

impl BellTime {
    /// Creates a time from hour (0-23) and minute (0-59)
    pub fn new(hour: u8, minute: u8) -> Result<BellTime> {
        if hour > 23 || minute > 59 {
            return Err(Error::InvalidTime(hour as u16 * 100 + minute as u16));
        }
        Ok(BellTime(hour as u16 * 100 + minute as u16))
    }

    /// Creates a time from its stored code, rejecting codes that do not
    /// decode to a valid hour/minute pair
    pub fn from_code(code: u16) -> Result<BellTime> {
        if code > 2359 || code % 100 > 59 {
            return Err(Error::InvalidTime(code));
        }
        Ok(BellTime(code))
    }

    /// The stored `hour * 100 + minute` code
    pub fn code(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u8 {
        (self.0 / 100) as u8
    }

    pub fn minute(self) -> u8 {
        (self.0 % 100) as u8
    }
}

impl std::fmt::Display for BellTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// One scheduled bell: name, time of day, and the audio clip it plays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BellEntry {
    /// Bell name shown on the display
    pub name: String,
    /// Time of day the bell rings
    pub time: BellTime,
    /// Path of the audio clip on the storage medium
    pub audio_file: String,
}

impl BellEntry {
    /// Creates an entry, validating the fixed record field limits
    pub fn new(
        name: impl Into<String>,
        time: BellTime,
        audio_file: impl Into<String>,
    ) -> Result<BellEntry> {
        let name = name.into();
        let audio_file = audio_file.into();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(Error::InvalidName(name));
        }
        if audio_file.len() > MAX_AUDIO_PATH_LEN {
            return Err(Error::AudioPathTooLong(audio_file));
        }
        Ok(BellEntry {
            name,
            time,
            audio_file,
        })
    }
}

/// Ordered bell entries for one specific day.
///
/// Entries are kept ascending by time of day at edit time; the matching
/// engine relies on that order for its linear next-bell lookup and does
/// not sort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BellList {
    entries: Vec<BellEntry>,
}

impl BellList {
    pub fn new() -> BellList {
        BellList::default()
    }

    /// Inserts an entry at its time-sorted position.
    ///
    /// Equal times go after existing entries with the same time, so the
    /// earlier-added bell stays the one that fires.
    pub fn insert(&mut self, entry: BellEntry) -> Result<usize> {
        if self.entries.len() >= MAX_BELLS {
            return Err(Error::BellListFull(MAX_BELLS));
        }
        let at = self
            .entries
            .partition_point(|existing| existing.time <= entry.time);
        self.entries.insert(at, entry);
        Ok(at)
    }

    /// Removes and returns the entry at `index`, if present
    pub fn remove(&mut self, index: usize) -> Option<BellEntry> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    pub fn get(&self, index: usize) -> Option<&BellEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BellEntry> {
        self.entries.iter()
    }
}

/// Schedule template type: one shared bell list, or one list per weekday
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleKind {
    #[default]
    Daily,
    Weekly,
}

impl ScheduleKind {
    /// Storage day-slot for the given weekday: weekly templates key by
    /// weekday, daily templates always use slot 0
    pub fn day_slot(self, day: DayOfWeek) -> usize {
        match self {
            ScheduleKind::Daily => 0,
            ScheduleKind::Weekly => day.index(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScheduleKind::Daily => "daily",
            ScheduleKind::Weekly => "weekly",
        }
    }
}

/// Named, reusable bell-timing configuration.
///
/// The name doubles as the storage key: the template record lives at
/// `templates/<name>.bin` and its per-day bell lists under
/// `templates/<name>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleTemplate {
    pub name: String,
    pub kind: ScheduleKind,
}

impl ScheduleTemplate {
    /// Creates a template, validating the fixed record name field
    pub fn new(name: impl Into<String>, kind: ScheduleKind) -> Result<ScheduleTemplate> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(Error::InvalidName(name));
        }
        Ok(ScheduleTemplate { name, kind })
    }
}

/// User-triggerable bell independent of the time schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualPreset {
    /// Disabled presets must be unreachable from the trigger surface
    pub enabled: bool,
    pub name: String,
    pub audio_file: String,
}

impl Default for ManualPreset {
    fn default() -> Self {
        ManualPreset {
            enabled: false,
            name: "Empty".to_string(),
            audio_file: String::new(),
        }
    }
}

/// Wall-clock snapshot taken once per tick from the clock source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub weekday: DayOfWeek,
    /// Day of month, used for day-rollover detection
    pub day: u8,
}

impl WallTime {
    pub fn new(hour: u8, minute: u8, second: u8, weekday: DayOfWeek, day: u8) -> WallTime {
        WallTime {
            hour,
            minute,
            second,
            weekday,
            day,
        }
    }

    /// Current time of day in bell code form (`hour * 100 + minute`)
    pub fn bell_code(&self) -> u16 {
        self.hour as u16 * 100 + self.minute as u16
    }
}

/// Source of wall time, polled once per tick and treated as authoritative
pub trait Clock {
    fn now(&self) -> Result<WallTime>;
}

/// Clock backed by the local system time
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<WallTime> {
        let now = Local::now();
        let weekday = DayOfWeek::from_index(now.weekday().num_days_from_sunday() as usize)
            .ok_or_else(|| Error::ClockFault("weekday out of range".to_string()))?;
        Ok(WallTime {
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
            weekday,
            day: now.day() as u8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bell_time_rejects_invalid_codes() {
        assert!(BellTime::from_code(700).is_ok());
        assert!(BellTime::from_code(2359).is_ok());
        assert!(BellTime::from_code(2400).is_err());
        assert!(BellTime::from_code(1260).is_err());
        assert!(BellTime::new(24, 0).is_err());
    }

    #[test]
    fn bell_time_formats_as_clock() {
        let t = BellTime::new(7, 5).unwrap();
        assert_eq!(t.code(), 705);
        assert_eq!(t.to_string(), "07:05");
    }

    #[test]
    fn bell_list_insert_keeps_ascending_order() {
        let mut list = BellList::new();
        list.insert(BellEntry::new("b", BellTime::from_code(1200).unwrap(), "b.mp3").unwrap())
            .unwrap();
        list.insert(BellEntry::new("a", BellTime::from_code(700).unwrap(), "a.mp3").unwrap())
            .unwrap();
        list.insert(BellEntry::new("c", BellTime::from_code(930).unwrap(), "c.mp3").unwrap())
            .unwrap();
        let codes: Vec<u16> = list.iter().map(|e| e.time.code()).collect();
        assert_eq!(codes, vec![700, 930, 1200]);
    }

    #[test]
    fn bell_list_insert_equal_times_keeps_first_added_first() {
        let mut list = BellList::new();
        list.insert(BellEntry::new("first", BellTime::from_code(800).unwrap(), "1.mp3").unwrap())
            .unwrap();
        list.insert(BellEntry::new("second", BellTime::from_code(800).unwrap(), "2.mp3").unwrap())
            .unwrap();
        assert_eq!(list.get(0).unwrap().name, "first");
        assert_eq!(list.get(1).unwrap().name, "second");
    }

    #[test]
    fn bell_list_enforces_capacity() {
        let mut list = BellList::new();
        for i in 0..MAX_BELLS {
            let time = BellTime::new((i / 60) as u8, (i % 60) as u8).unwrap();
            list.insert(BellEntry::new(format!("bell {i}"), time, "x.mp3").unwrap())
                .unwrap();
        }
        let overflow = BellEntry::new("extra", BellTime::new(23, 59).unwrap(), "x.mp3").unwrap();
        assert!(matches!(
            list.insert(overflow),
            Err(Error::BellListFull(MAX_BELLS))
        ));
    }

    #[test]
    fn entry_validates_field_limits() {
        let time = BellTime::new(7, 0).unwrap();
        assert!(BellEntry::new("", time, "a.mp3").is_err());
        assert!(BellEntry::new("x".repeat(32), time, "a.mp3").is_err());
        assert!(BellEntry::new("ok", time, "p".repeat(128)).is_err());
    }

    #[test]
    fn day_slots_follow_template_kind() {
        assert_eq!(ScheduleKind::Daily.day_slot(DayOfWeek::Friday), 0);
        assert_eq!(ScheduleKind::Weekly.day_slot(DayOfWeek::Friday), 5);
        assert_eq!(DayOfWeek::from_index(7), None);
    }
}
