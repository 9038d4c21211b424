use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

const START_WINDOW_SECS: i64 = 3_600;

/// Shared compressor state. `start_times` is the rolling one-hour window the
/// deadband manager keys off; it is pruned on every evaluation whether or
/// not a transition happens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressorState {
    pub running: bool,
    pub last_transition: Option<DateTime<Utc>>,
    pub start_times: Vec<DateTime<Utc>>,
    /// Deadband in effect on the most recent tick, kept with the rest of the
    /// compressor state so a restart resumes with the same band.
    #[serde(default)]
    pub current_deadband_f: f32,
}

/// Outcome of routing the aggregate mode decision through the 3-minute rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    Unchanged,
    Started,
    Stopped,
    /// Start refused: the compressor has not been off long enough.
    HeldOff { remaining_secs: i64 },
    /// Stop refused: the compressor has not run long enough.
    HeldOn { remaining_secs: i64 },
}

impl CompressorState {
    pub fn recent_starts(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::seconds(START_WINDOW_SECS);
        self.start_times.iter().filter(|t| **t > cutoff).count()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(START_WINDOW_SECS);
        self.start_times.retain(|t| *t > cutoff);
    }

    /// Apply the tick's aggregate demand. Accepted transitions stamp
    /// `last_transition`; accepted starts also enter the rolling window.
    pub fn evaluate(
        &mut self,
        want_running: bool,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> GuardVerdict {
        self.prune(now);

        if want_running == self.running {
            return GuardVerdict::Unchanged;
        }

        if want_running {
            if let Some(last) = self.last_transition {
                let elapsed = (now - last).num_seconds();
                if elapsed < config.min_compressor_off_time_secs {
                    return GuardVerdict::HeldOff {
                        remaining_secs: config.min_compressor_off_time_secs - elapsed,
                    };
                }
            }
            self.running = true;
            self.last_transition = Some(now);
            self.start_times.push(now);
            GuardVerdict::Started
        } else {
            if let Some(last) = self.last_transition {
                let elapsed = (now - last).num_seconds();
                if elapsed < config.min_compressor_runtime_secs {
                    return GuardVerdict::HeldOn {
                        remaining_secs: config.min_compressor_runtime_secs - elapsed,
                    };
                }
            }
            self.running = false;
            self.last_transition = Some(now);
            GuardVerdict::Stopped
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 6, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn first_start_is_unrestricted() {
        let config = EngineConfig::default();
        let mut state = CompressorState::default();

        assert_eq!(state.evaluate(true, at(0), &config), GuardVerdict::Started);
        assert!(state.running);
        assert_eq!(state.start_times.len(), 1);
    }

    #[test]
    fn stop_held_within_minimum_runtime() {
        let config = EngineConfig::default();
        let mut state = CompressorState::default();
        state.evaluate(true, at(0), &config);

        let verdict = state.evaluate(false, at(30), &config);
        assert_eq!(verdict, GuardVerdict::HeldOn { remaining_secs: 150 });
        assert!(state.running);

        assert_eq!(state.evaluate(false, at(180), &config), GuardVerdict::Stopped);
        assert!(!state.running);
    }

    #[test]
    fn start_held_within_minimum_off_time() {
        let config = EngineConfig::default();
        let mut state = CompressorState::default();
        state.evaluate(true, at(0), &config);
        state.evaluate(false, at(200), &config);

        let verdict = state.evaluate(true, at(250), &config);
        assert_eq!(verdict, GuardVerdict::HeldOff { remaining_secs: 130 });
        assert!(!state.running);

        assert_eq!(state.evaluate(true, at(380), &config), GuardVerdict::Started);
    }

    #[test]
    fn no_two_same_direction_transitions_inside_the_guard_window() {
        let config = EngineConfig::default();
        let mut state = CompressorState::default();
        let mut transitions: Vec<(i64, GuardVerdict)> = Vec::new();

        // Alternate demand every 20s for half an hour; record what lands.
        for step in 0..90 {
            let t = step * 20;
            let want = (step / 3) % 2 == 0;
            let verdict = state.evaluate(want, at(t), &config);
            if matches!(verdict, GuardVerdict::Started | GuardVerdict::Stopped) {
                transitions.push((t, verdict));
            }
        }

        for pair in transitions.windows(2) {
            let (t0, _) = pair[0];
            let (t1, _) = pair[1];
            assert!(t1 - t0 >= 180, "transitions at {t0}s and {t1}s too close");
        }
    }

    #[test]
    fn start_window_prunes_to_one_hour() {
        let config = EngineConfig::default();
        let mut state = CompressorState::default();

        // Three full cycles, then idle past the window.
        let mut t = 0;
        for _ in 0..3 {
            state.evaluate(true, at(t), &config);
            state.evaluate(false, at(t + 200), &config);
            t += 400;
        }
        assert_eq!(state.recent_starts(at(t)), 3);

        let later = at(t + START_WINDOW_SECS);
        state.evaluate(false, later, &config);
        assert!(state.start_times.is_empty());
        assert_eq!(state.recent_starts(later), 0);
    }

    #[test]
    fn unchanged_demand_never_transitions() {
        let config = EngineConfig::default();
        let mut state = CompressorState::default();

        assert_eq!(state.evaluate(false, at(0), &config), GuardVerdict::Unchanged);
        state.evaluate(true, at(10), &config);
        assert_eq!(state.evaluate(true, at(20), &config), GuardVerdict::Unchanged);
        assert_eq!(state.start_times.len(), 1);
    }
}
