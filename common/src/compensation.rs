use crate::{
    config::EngineConfig,
    rates::ZoneRates,
    types::{HvacMode, ZoneId},
};

/// A transient shift of one zone's comparison target for the current tick.
/// The stored user target is never touched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compensation {
    pub zone: ZoneId,
    /// Signed shift added to the zone's comparison target.
    pub offset_f: f32,
    pub predicted_drift_f: f32,
}

/// Minutes until a conditioning zone reaches its target, or `None` when the
/// matching learned rate is still too small to trust.
pub fn time_to_target_min(
    error_f: f32,
    mode: HvacMode,
    rates: &ZoneRates,
    config: &EngineConfig,
) -> Option<f32> {
    let rate = rates.for_mode(mode)?;
    if !rate.is_usable(config) {
        return None;
    }
    Some(error_f.abs() / rate.f_per_min)
}

/// One zone conditioning, the other idle: predict how far the idle zone will
/// drift off its own target while the lead runs, and shift its comparison
/// target to absorb that drift. Lead heating pushes the passive zone warm,
/// so the shift goes down; cooling mirrors.
pub fn passive_compensation(
    lead_mode: HvacMode,
    lead_error_f: f32,
    lead_rates: &ZoneRates,
    passive_zone: ZoneId,
    passive_rates: &ZoneRates,
    config: &EngineConfig,
) -> Option<Compensation> {
    let run_min = time_to_target_min(lead_error_f, lead_mode, lead_rates, config)?;
    if !passive_rates.leakage.is_usable(config) {
        return None;
    }

    let drift = passive_rates.leakage.f_per_min * run_min;
    if drift <= config.min_offset_f {
        return None;
    }
    let drift = drift.min(config.max_offset_f);

    let offset = match lead_mode {
        HvacMode::Heat => -drift,
        HvacMode::Cool => drift,
        _ => return None,
    };

    Some(Compensation {
        zone: passive_zone,
        offset_f: offset,
        predicted_drift_f: drift,
    })
}

/// Both zones running the same mode: the zone predicted to finish first
/// backs its comparison target off by the leakage expected while the slower
/// zone keeps the compressor busy, so it cuts out early instead of
/// overshooting on residual flow.
pub fn shared_run_compensation(
    mode: HvacMode,
    error1_f: f32,
    error2_f: f32,
    rates1: &ZoneRates,
    rates2: &ZoneRates,
    config: &EngineConfig,
) -> Option<Compensation> {
    let time1 = time_to_target_min(error1_f, mode, rates1, config)?;
    let time2 = time_to_target_min(error2_f, mode, rates2, config)?;

    let (lead, lead_rates, lag_min) = if time1 < time2 {
        (ZoneId::Zone1, rates1, time2 - time1)
    } else if time2 < time1 {
        (ZoneId::Zone2, rates2, time1 - time2)
    } else {
        return None;
    };

    if !lead_rates.leakage.is_usable(config) {
        return None;
    }
    let drift = lead_rates.leakage.f_per_min * lag_min;
    if drift <= config.min_offset_f {
        return None;
    }
    let drift = drift.min(config.max_offset_f);

    let offset = match mode {
        HvacMode::Heat => -drift,
        HvacMode::Cool => drift,
        _ => return None,
    };

    Some(Compensation {
        zone: lead,
        offset_f: offset,
        predicted_drift_f: drift,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::LearnedRate;

    fn rates(heating: f32, cooling: f32, leakage: f32) -> ZoneRates {
        ZoneRates {
            heating: LearnedRate {
                f_per_min: heating,
                samples: 5,
            },
            cooling: LearnedRate {
                f_per_min: cooling,
                samples: 5,
            },
            leakage: LearnedRate {
                f_per_min: leakage,
                samples: 5,
            },
            history: Default::default(),
        }
    }

    #[test]
    fn unknown_rate_skips_prediction() {
        let config = EngineConfig::default();
        let lead = rates(0.0, 0.0, 0.1);
        let passive = rates(0.0, 0.0, 0.1);

        let comp = passive_compensation(
            HvacMode::Heat,
            4.0,
            &lead,
            ZoneId::Zone2,
            &passive,
            &config,
        );
        assert_eq!(comp, None);
    }

    #[test]
    fn unlearned_leakage_skips_compensation() {
        let config = EngineConfig::default();
        let lead = rates(0.5, 0.0, 0.0);
        let passive = rates(0.0, 0.0, 0.0);

        let comp = passive_compensation(
            HvacMode::Heat,
            4.0,
            &lead,
            ZoneId::Zone2,
            &passive,
            &config,
        );
        assert_eq!(comp, None);
    }

    #[test]
    fn heating_lead_shifts_passive_target_down() {
        let config = EngineConfig::default();
        // 4°F at 0.5°F/min -> 8 minutes; 0.1°F/min leakage -> 0.8°F drift.
        let lead = rates(0.5, 0.0, 0.0);
        let passive = rates(0.0, 0.0, 0.1);

        let comp = passive_compensation(
            HvacMode::Heat,
            4.0,
            &lead,
            ZoneId::Zone2,
            &passive,
            &config,
        )
        .unwrap();

        assert_eq!(comp.zone, ZoneId::Zone2);
        assert!((comp.predicted_drift_f - 0.8).abs() < 1e-4);
        assert!((comp.offset_f + 0.8).abs() < 1e-4);
    }

    #[test]
    fn cooling_lead_shifts_passive_target_up() {
        let config = EngineConfig::default();
        let lead = rates(0.0, 0.4, 0.0);
        let passive = rates(0.0, 0.0, 0.2);

        let comp = passive_compensation(
            HvacMode::Cool,
            -2.0,
            &lead,
            ZoneId::Zone1,
            &passive,
            &config,
        )
        .unwrap();

        assert!(comp.offset_f > 0.0);
    }

    #[test]
    fn sub_threshold_drift_is_ignored() {
        let config = EngineConfig::default();
        // 1°F at 0.5°F/min -> 2 minutes; 0.1°F/min -> 0.2°F, below 0.3.
        let lead = rates(0.5, 0.0, 0.0);
        let passive = rates(0.0, 0.0, 0.1);

        let comp = passive_compensation(
            HvacMode::Heat,
            1.0,
            &lead,
            ZoneId::Zone2,
            &passive,
            &config,
        );
        assert_eq!(comp, None);
    }

    #[test]
    fn drift_caps_at_max_offset() {
        let config = EngineConfig::default();
        // 8°F at 0.1°F/min -> 80 minutes; 0.2°F/min -> 16°F, capped to 4.
        let lead = rates(0.1, 0.0, 0.0);
        let passive = rates(0.0, 0.0, 0.2);

        let comp = passive_compensation(
            HvacMode::Heat,
            8.0,
            &lead,
            ZoneId::Zone2,
            &passive,
            &config,
        )
        .unwrap();

        assert_eq!(comp.predicted_drift_f, config.max_offset_f);
    }

    #[test]
    fn shared_run_backs_off_the_faster_zone() {
        let config = EngineConfig::default();
        // Zone1 reaches target in 4 min, zone2 in 10; zone1 leaks 0.1°F/min
        // over the 6-minute gap -> 0.6°F back-off.
        let rates1 = rates(0.5, 0.0, 0.1);
        let rates2 = rates(0.2, 0.0, 0.3);

        let comp =
            shared_run_compensation(HvacMode::Heat, 2.0, 2.0, &rates1, &rates2, &config).unwrap();

        assert_eq!(comp.zone, ZoneId::Zone1);
        assert!((comp.predicted_drift_f - 0.6).abs() < 1e-4);
        assert!(comp.offset_f < 0.0);
    }

    #[test]
    fn shared_run_needs_both_rates() {
        let config = EngineConfig::default();
        let rates1 = rates(0.5, 0.0, 0.1);
        let rates2 = rates(0.0, 0.0, 0.3);

        let comp = shared_run_compensation(HvacMode::Heat, 2.0, 2.0, &rates1, &rates2, &config);
        assert_eq!(comp, None);
    }
}
