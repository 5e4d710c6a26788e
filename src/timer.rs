/*!
 # PLC-style delay timer

 On-delay timer in the programmable-logic-controller tradition: the output
 turns on only after the input has been held true for the preset duration,
 and any input drop resets the count. The timer is a level-triggered state
 machine driven by calling [`OnDelay::feed`] once per loop pass; there are
 no wall-clock callbacks to cancel.
*/

use std::time::{Duration, Instant};

/// On-delay timer: output is on after the input has been true for the
/// preset duration
#[derive(Debug)]
pub struct OnDelay {
    preset: Duration,
    since: Option<Instant>,
}

impl OnDelay {
    pub fn new(preset: Duration) -> OnDelay {
        OnDelay {
            preset,
            since: None,
        }
    }

    pub fn preset(&self) -> Duration {
        self.preset
    }

    /// Drives the timer with the current input level and returns the
    /// output level. A rising edge starts the count; a false input
    /// resets it.
    pub fn feed(&mut self, input: bool) -> bool {
        if input {
            let since = *self.since.get_or_insert_with(Instant::now);
            since.elapsed() >= self.preset
        } else {
            self.since = None;
            false
        }
    }

    /// Elapsed hold time, capped at the preset
    pub fn elapsed(&self) -> Duration {
        self.since
            .map(|since| since.elapsed().min(self.preset))
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn output_off_until_preset_elapses() {
        let mut timer = OnDelay::new(Duration::from_millis(50));
        assert!(!timer.feed(true));
        sleep(Duration::from_millis(10));
        assert!(!timer.feed(true));
        sleep(Duration::from_millis(60));
        assert!(timer.feed(true));
    }

    #[test]
    fn input_drop_resets_the_count() {
        let mut timer = OnDelay::new(Duration::from_millis(40));
        assert!(!timer.feed(true));
        sleep(Duration::from_millis(50));
        assert!(timer.feed(true));
        assert!(!timer.feed(false));
        // Count restarts from the new rising edge
        assert!(!timer.feed(true));
    }

    #[test]
    fn zero_preset_fires_on_first_pass() {
        let mut timer = OnDelay::new(Duration::ZERO);
        assert!(timer.feed(true));
    }

    #[test]
    fn elapsed_is_capped_at_preset() {
        let mut timer = OnDelay::new(Duration::from_millis(20));
        timer.feed(true);
        sleep(Duration::from_millis(40));
        assert_eq!(timer.elapsed(), timer.preset());
        timer.feed(false);
        assert_eq!(timer.elapsed(), Duration::ZERO);
    }
}
