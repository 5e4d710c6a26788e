/*!
 # Schedule matching engine

 Per-second evaluation of the active day's bell list against the current
 time. The engine owns the runtime schedule state: today's list, the next
 unfired bell, and a debounce state machine that keeps a matched bell from
 firing more than once inside its minute window.

 Nothing here performs I/O and nothing can fail at runtime; when storage
 is gone the engine simply runs against an empty list and stays idle.
*/

use tracing::debug;

use crate::schedule::{BellEntry, BellList, WallTime};

/// Debounce state, re-armed at day rollover or schedule change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireState {
    /// No bell left to ring today
    Idle,
    /// Waiting for the bell at this index
    Armed(usize),
    /// Bell at this index rang; matching is suppressed until the time of
    /// day strictly exceeds its scheduled time
    Fired(usize),
}

/// Runtime schedule state for "today", rebuilt on template change or day
/// rollover
#[derive(Debug)]
pub struct ScheduleEngine {
    today: BellList,
    state: FireState,
    next_bell: Option<usize>,
    last_reported: Option<Option<usize>>,
    last_day: Option<u8>,
}

impl Default for ScheduleEngine {
    fn default() -> Self {
        ScheduleEngine::new()
    }
}

impl ScheduleEngine {
    pub fn new() -> ScheduleEngine {
        ScheduleEngine {
            today: BellList::new(),
            state: FireState::Idle,
            next_bell: None,
            last_reported: None,
            last_day: None,
        }
    }

    /// Installs today's bell list and re-arms the state machine.
    ///
    /// Called at startup, on active-template change, and at day rollover.
    pub fn rebuild(&mut self, today: BellList, now: &WallTime) {
        self.today = today;
        self.last_day = Some(now.day);
        self.next_bell = scan_next(&self.today, now.bell_code());
        self.state = match self.next_bell {
            Some(index) => FireState::Armed(index),
            None => FireState::Idle,
        };
        debug!(
            bells = self.today.len(),
            next = ?self.next_bell,
            "schedule rebuilt"
        );
    }

    /// True when the calendar day differs from the last observed one
    pub fn day_rolled(&self, now: &WallTime) -> bool {
        self.last_day != Some(now.day)
    }

    /// One evaluation pass, run once per second. Returns the index of the
    /// bell that matched this pass, if any; the caller forwards its audio
    /// reference to the trigger coordinator.
    pub fn tick(&mut self, now: &WallTime) -> Option<usize> {
        let code = now.bell_code();
        let mut fired = None;

        let count = self.today.len();
        for i in 0..count {
            let entry_code = self.today.get(i).map(|e| e.time.code()).unwrap_or(0);
            if code == entry_code && !matches!(self.state, FireState::Fired(_)) {
                self.state = FireState::Fired(i);
                fired = Some(i);
                debug!(index = i, time = entry_code, "bell matched");
            }
            if code < entry_code {
                self.next_bell = Some(i);
                break;
            }
            if i == count - 1 && code >= entry_code {
                self.next_bell = None;
                break;
            }
        }
        if count == 0 {
            self.next_bell = None;
        }

        // Release the debounce once the minute window has passed
        if let FireState::Fired(index) = self.state {
            let fired_code = self.today.get(index).map(|e| e.time.code()).unwrap_or(0);
            if code > fired_code {
                debug!(index, "bell debounce released");
                self.state = match self.next_bell {
                    Some(next) => FireState::Armed(next),
                    None => FireState::Idle,
                };
            }
        } else {
            self.state = match self.next_bell {
                Some(next) => FireState::Armed(next),
                None => FireState::Idle,
            };
        }

        fired
    }

    /// The next unfired bell, for display
    pub fn next_bell(&self) -> Option<(usize, &BellEntry)> {
        self.next_bell
            .and_then(|index| self.today.get(index).map(|entry| (index, entry)))
    }

    /// Edge-triggered change report: true exactly once each time the
    /// next-bell value differs from the last reported one, so the display
    /// layer refreshes only on change.
    pub fn next_changed(&mut self) -> bool {
        if self.last_reported != Some(self.next_bell) {
            self.last_reported = Some(self.next_bell);
            true
        } else {
            false
        }
    }

    pub fn state(&self) -> FireState {
        self.state
    }

    pub fn today(&self) -> &BellList {
        &self.today
    }
}

/// First entry whose time of day is strictly greater than `code`
fn scan_next(list: &BellList, code: u16) -> Option<usize> {
    list.iter().position(|entry| entry.time.code() > code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{BellTime, DayOfWeek};

    fn list(codes: &[u16]) -> BellList {
        let mut list = BellList::new();
        for (i, &code) in codes.iter().enumerate() {
            list.insert(
                BellEntry::new(
                    format!("bell {i}"),
                    BellTime::from_code(code).unwrap(),
                    format!("{i}.mp3"),
                )
                .unwrap(),
            )
            .unwrap();
        }
        list
    }

    fn at(hour: u8, minute: u8, second: u8) -> WallTime {
        WallTime::new(hour, minute, second, DayOfWeek::Monday, 9)
    }

    #[test]
    fn scenario_two_bell_day() {
        let mut engine = ScheduleEngine::new();
        engine.rebuild(list(&[700, 1200]), &at(6, 59, 0));
        assert_eq!(engine.next_bell().map(|(i, _)| i), Some(0));
        assert_eq!(engine.state(), FireState::Armed(0));

        assert_eq!(engine.tick(&at(6, 59, 30)), None);

        // 07:00 fires bell 0
        assert_eq!(engine.tick(&at(7, 0, 0)), Some(0));
        assert_eq!(engine.state(), FireState::Fired(0));

        // 07:01 the next bell is index 1
        assert_eq!(engine.tick(&at(7, 1, 0)), None);
        assert_eq!(engine.next_bell().map(|(i, _)| i), Some(1));
        assert_eq!(engine.state(), FireState::Armed(1));

        // 12:00 fires bell 1, 12:01 nothing is left
        assert_eq!(engine.tick(&at(12, 0, 0)), Some(1));
        assert_eq!(engine.tick(&at(12, 1, 0)), None);
        assert_eq!(engine.next_bell().map(|(i, _)| i), None);
        assert_eq!(engine.state(), FireState::Idle);
    }

    #[test]
    fn bell_fires_at_most_once_per_minute_window() {
        let mut engine = ScheduleEngine::new();
        engine.rebuild(list(&[700]), &at(6, 59, 0));
        assert_eq!(engine.tick(&at(7, 0, 0)), Some(0));
        for second in 1..60 {
            assert_eq!(engine.tick(&at(7, 0, second)), None);
        }
    }

    #[test]
    fn duplicate_time_fires_only_first_entry() {
        let mut engine = ScheduleEngine::new();
        engine.rebuild(list(&[800, 800]), &at(7, 59, 0));
        assert_eq!(engine.tick(&at(8, 0, 0)), Some(0));
        assert_eq!(engine.tick(&at(8, 0, 1)), None);
        assert_eq!(engine.tick(&at(8, 1, 0)), None);
    }

    #[test]
    fn empty_list_has_no_next_bell() {
        let mut engine = ScheduleEngine::new();
        engine.rebuild(BellList::new(), &at(10, 0, 0));
        assert_eq!(engine.next_bell().map(|(i, _)| i), None);
        assert_eq!(engine.tick(&at(10, 0, 1)), None);
        assert_eq!(engine.state(), FireState::Idle);
    }

    #[test]
    fn next_bell_is_smallest_index_strictly_after_now() {
        let codes = [600, 700, 930, 1200, 1545];
        let mut engine = ScheduleEngine::new();
        engine.rebuild(list(&codes), &at(0, 0, 0));
        let cases = [
            (at(5, 59, 0), Some(0)),
            (at(6, 0, 0), Some(1)),
            (at(9, 29, 0), Some(2)),
            (at(9, 30, 0), Some(3)),
            (at(15, 45, 0), None),
            (at(23, 0, 0), None),
        ];
        for (now, expected) in cases {
            engine.tick(&now);
            assert_eq!(engine.next_bell().map(|(i, _)| i), expected);
        }
    }

    #[test]
    fn day_rollover_rearms_the_fired_bell() {
        let mut engine = ScheduleEngine::new();
        engine.rebuild(list(&[700]), &at(6, 59, 0));
        assert_eq!(engine.tick(&at(7, 0, 0)), Some(0));

        let next_day = WallTime::new(6, 59, 0, DayOfWeek::Tuesday, 10);
        assert!(engine.day_rolled(&next_day));
        engine.rebuild(list(&[700]), &next_day);
        assert_eq!(
            engine.tick(&WallTime::new(7, 0, 0, DayOfWeek::Tuesday, 10)),
            Some(0)
        );
    }

    #[test]
    fn next_change_reports_are_edge_triggered() {
        let mut engine = ScheduleEngine::new();
        engine.rebuild(list(&[700, 1200]), &at(6, 59, 0));
        assert!(engine.next_changed());
        assert!(!engine.next_changed());

        engine.tick(&at(6, 59, 30));
        assert!(!engine.next_changed());

        engine.tick(&at(7, 0, 0));
        engine.tick(&at(7, 1, 0));
        assert!(engine.next_changed());
        assert!(!engine.next_changed());
    }
}
