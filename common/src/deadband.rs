use crate::config::{EngineConfig, ExpansionPolicy};

/// Deadband for *entering* a mode this tick. Widens when the compressor has
/// been starting too often so marginal errors stop triggering new cycles;
/// leaving a mode is governed by the resolver's hysteresis band instead.
pub fn current_deadband(config: &EngineConfig, recent_starts: usize) -> f32 {
    match config.deadband_expansion {
        ExpansionPolicy::Step => {
            if recent_starts >= config.max_starts_per_hour {
                config.max_deadband_f
            } else {
                config.base_deadband_f
            }
        }
        ExpansionPolicy::Linear => {
            let limit = config.max_starts_per_hour as f32;
            let fraction = (recent_starts as f32 / limit).min(1.0);
            config.base_deadband_f + (config.max_deadband_f - config.base_deadband_f) * fraction
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_policy_expands_only_at_limit() {
        let config = EngineConfig::default();
        assert_eq!(current_deadband(&config, 0), config.base_deadband_f);
        assert_eq!(current_deadband(&config, 2), config.base_deadband_f);
        assert_eq!(current_deadband(&config, 3), config.max_deadband_f);
        assert_eq!(current_deadband(&config, 7), config.max_deadband_f);
    }

    #[test]
    fn linear_policy_is_monotone_and_caps_at_max() {
        let config = EngineConfig {
            deadband_expansion: ExpansionPolicy::Linear,
            ..EngineConfig::default()
        };

        let mut previous = 0.0;
        for starts in 0..6 {
            let band = current_deadband(&config, starts);
            assert!(band >= previous);
            previous = band;
        }
        assert_eq!(current_deadband(&config, 0), config.base_deadband_f);
        assert_eq!(current_deadband(&config, 5), config.max_deadband_f);
    }

    #[test]
    fn collapses_back_to_base_when_window_drains() {
        let config = EngineConfig::default();
        assert_eq!(current_deadband(&config, 3), config.max_deadband_f);
        assert_eq!(current_deadband(&config, 2), config.base_deadband_f);
    }
}
