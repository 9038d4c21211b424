use crate::{
    config::EngineConfig,
    types::{HvacMode, ZoneId},
};

/// Outcome of weighing the two zones' demands against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// No opposing heat/cool pair; every zone keeps its desired mode.
    NoConflict,
    /// Opposing demands: the lead zone keeps its mode, the passive zone is
    /// forced to fan-only for the tick.
    Conflict { lead: ZoneId, passive: ZoneId },
}

/// Desired mode from the signed error (`target − current`). Entering heat or
/// cool requires clearing the deadband; a zone already conditioning holds its
/// mode until the error shrinks past the narrower hysteresis band, so it does
/// not chatter at the boundary. Overshoot past the target releases at once.
pub fn desired_mode(
    error_f: f32,
    deadband_f: f32,
    previous: HvacMode,
    config: &EngineConfig,
) -> HvacMode {
    if error_f > deadband_f {
        return HvacMode::Heat;
    }
    if error_f < -deadband_f {
        return HvacMode::Cool;
    }

    let hold_band = deadband_f * config.hysteresis_fraction;
    match previous {
        HvacMode::Heat if error_f > hold_band => HvacMode::Heat,
        HvacMode::Cool if error_f < -hold_band => HvacMode::Cool,
        _ => HvacMode::FanOnly,
    }
}

/// Resolve lead/passive between opposing desires. The larger |error| wins;
/// errors closer than `conflict_threshold_f` keep the previous lead so the
/// assignment cannot oscillate tick to tick.
pub fn resolve(
    desired1: HvacMode,
    desired2: HvacMode,
    error1_f: f32,
    error2_f: f32,
    previous_lead: Option<ZoneId>,
    config: &EngineConfig,
) -> Resolution {
    let opposing = matches!(
        (desired1, desired2),
        (HvacMode::Heat, HvacMode::Cool) | (HvacMode::Cool, HvacMode::Heat)
    );
    if !opposing {
        return Resolution::NoConflict;
    }

    let abs1 = error1_f.abs();
    let abs2 = error2_f.abs();
    let lead = if (abs1 - abs2).abs() < config.conflict_threshold_f {
        previous_lead.unwrap_or(ZoneId::Zone1)
    } else if abs1 > abs2 {
        ZoneId::Zone1
    } else {
        ZoneId::Zone2
    };

    Resolution::Conflict {
        lead,
        passive: lead.other(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_select_heat_cool_or_satisfied() {
        let config = EngineConfig::default();
        assert_eq!(
            desired_mode(1.0, 0.5, HvacMode::Off, &config),
            HvacMode::Heat
        );
        assert_eq!(
            desired_mode(-1.0, 0.5, HvacMode::Off, &config),
            HvacMode::Cool
        );
        assert_eq!(
            desired_mode(0.2, 0.5, HvacMode::Off, &config),
            HvacMode::FanOnly
        );
    }

    #[test]
    fn held_mode_persists_through_the_hysteresis_band() {
        let config = EngineConfig::default();

        // Inside the deadband but above half of it: keep heating.
        assert_eq!(
            desired_mode(0.4, 0.5, HvacMode::Heat, &config),
            HvacMode::Heat
        );
        // Below half the deadband: release.
        assert_eq!(
            desired_mode(0.2, 0.5, HvacMode::Heat, &config),
            HvacMode::FanOnly
        );
        // Overshot past target: release immediately.
        assert_eq!(
            desired_mode(-0.4, 0.5, HvacMode::Heat, &config),
            HvacMode::FanOnly
        );
        // Same shape on the cooling side.
        assert_eq!(
            desired_mode(-0.4, 0.5, HvacMode::Cool, &config),
            HvacMode::Cool
        );
        assert_eq!(
            desired_mode(0.3, 0.5, HvacMode::Cool, &config),
            HvacMode::FanOnly
        );
    }

    #[test]
    fn fan_only_never_holds() {
        let config = EngineConfig::default();
        assert_eq!(
            desired_mode(0.4, 0.5, HvacMode::FanOnly, &config),
            HvacMode::FanOnly
        );
    }

    #[test]
    fn larger_error_takes_lead() {
        let config = EngineConfig::default();
        let resolution = resolve(HvacMode::Heat, HvacMode::Cool, 6.0, -1.0, None, &config);
        assert_eq!(
            resolution,
            Resolution::Conflict {
                lead: ZoneId::Zone1,
                passive: ZoneId::Zone2,
            }
        );

        let resolution = resolve(HvacMode::Heat, HvacMode::Cool, 1.0, -6.0, None, &config);
        assert_eq!(
            resolution,
            Resolution::Conflict {
                lead: ZoneId::Zone2,
                passive: ZoneId::Zone1,
            }
        );
    }

    #[test]
    fn close_errors_keep_the_previous_lead() {
        let config = EngineConfig::default();
        let resolution = resolve(
            HvacMode::Heat,
            HvacMode::Cool,
            3.0,
            -2.5,
            Some(ZoneId::Zone2),
            &config,
        );
        assert_eq!(
            resolution,
            Resolution::Conflict {
                lead: ZoneId::Zone2,
                passive: ZoneId::Zone1,
            }
        );
    }

    #[test]
    fn tie_with_no_history_goes_to_zone1() {
        let config = EngineConfig::default();
        let resolution = resolve(HvacMode::Cool, HvacMode::Heat, -2.0, 2.0, None, &config);
        assert_eq!(
            resolution,
            Resolution::Conflict {
                lead: ZoneId::Zone1,
                passive: ZoneId::Zone2,
            }
        );
    }

    #[test]
    fn resolution_is_idempotent_for_a_fixed_snapshot() {
        let config = EngineConfig::default();
        let first = resolve(
            HvacMode::Heat,
            HvacMode::Cool,
            3.0,
            -2.0,
            Some(ZoneId::Zone1),
            &config,
        );
        let Resolution::Conflict { lead, .. } = first else {
            panic!("expected a conflict");
        };
        let second = resolve(HvacMode::Heat, HvacMode::Cool, 3.0, -2.0, Some(lead), &config);
        assert_eq!(first, second);
    }

    #[test]
    fn matching_or_idle_demands_do_not_conflict() {
        let config = EngineConfig::default();
        assert_eq!(
            resolve(HvacMode::Heat, HvacMode::Heat, 3.0, 2.0, None, &config),
            Resolution::NoConflict
        );
        assert_eq!(
            resolve(HvacMode::FanOnly, HvacMode::Cool, 0.0, -3.0, None, &config),
            Resolution::NoConflict
        );
        assert_eq!(
            resolve(HvacMode::FanOnly, HvacMode::FanOnly, 0.0, 0.0, None, &config),
            Resolution::NoConflict
        );
    }
}
