use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::EngineConfig,
    types::{HvacMode, LearningStatus, RateSnapshot},
};

/// EMA-smoothed rate estimate in °F per minute, never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnedRate {
    pub f_per_min: f32,
    pub samples: u32,
}

impl LearnedRate {
    pub fn status(&self, config: &EngineConfig) -> LearningStatus {
        if self.samples < config.direct_average_samples {
            LearningStatus::Learning
        } else {
            LearningStatus::Active
        }
    }

    pub fn snapshot(&self, config: &EngineConfig) -> RateSnapshot {
        RateSnapshot {
            f_per_min: self.f_per_min,
            samples: self.samples,
            status: self.status(config),
        }
    }

    pub fn is_usable(&self, config: &EngineConfig) -> bool {
        self.f_per_min > config.min_rate_f_per_min
    }

    fn fold(&mut self, sample: f32, config: &EngineConfig) {
        self.samples = self.samples.saturating_add(1);
        if self.samples <= config.direct_average_samples {
            // Plain cumulative average while cold; an EMA seeded from zero
            // would drag the estimate down for the first several cycles.
            let n = self.samples as f32;
            self.f_per_min += (sample - self.f_per_min) / n;
        } else {
            self.f_per_min += config.ema_alpha * (sample - self.f_per_min);
        }
        self.f_per_min = self.f_per_min.max(0.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    pub at: DateTime<Utc>,
    pub temp_f: f32,
    pub mode: HvacMode,
}

/// Per-zone learned thermal response plus the bounded sample history the
/// instantaneous rates are computed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneRates {
    pub heating: LearnedRate,
    pub cooling: LearnedRate,
    pub leakage: LearnedRate,
    pub history: VecDeque<HistorySample>,
}

impl ZoneRates {
    pub fn for_mode(&self, mode: HvacMode) -> Option<&LearnedRate> {
        match mode {
            HvacMode::Heat => Some(&self.heating),
            HvacMode::Cool => Some(&self.cooling),
            _ => None,
        }
    }

    /// Append a sample and fold the instantaneous rate into whichever
    /// estimate the elapsed interval belongs to. `active_mode` is the mode
    /// this zone ran during the interval; `other_mode`/`other_target_f`
    /// describe the opposite zone so leakage drift can be attributed.
    pub fn record_sample(
        &mut self,
        temp_f: f32,
        at: DateTime<Utc>,
        active_mode: HvacMode,
        own_target_f: f32,
        other_mode: HvacMode,
        other_target_f: f32,
        config: &EngineConfig,
    ) {
        let previous = self.history.back().copied();
        self.history.push_back(HistorySample {
            at,
            temp_f,
            mode: active_mode,
        });
        while self.history.len() > config.history_len {
            self.history.pop_front();
        }

        let Some(previous) = previous else {
            return;
        };

        let dt_min = (at - previous.at).num_seconds() as f32 / 60.0;
        if dt_min <= 0.0 {
            return;
        }

        let delta = temp_f - previous.temp_f;
        let rate = delta.abs() / dt_min;

        match previous.mode {
            HvacMode::Heat if delta > 0.0 && toward(previous.temp_f, own_target_f, delta) => {
                self.heating.fold(rate, config);
            }
            HvacMode::Cool if delta < 0.0 && toward(previous.temp_f, own_target_f, delta) => {
                self.cooling.fold(rate, config);
            }
            HvacMode::FanOnly | HvacMode::Off
                if other_mode.is_active()
                    && delta.abs() >= config.min_leakage_delta_f
                    && toward(previous.temp_f, other_target_f, delta) =>
            {
                self.leakage.fold(rate, config);
            }
            _ => {}
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn toward(from_f: f32, target_f: f32, delta: f32) -> bool {
    (target_f - from_f) * delta > 0.0
}
