use crate::{
    config::EngineConfig,
    types::FanSpeed,
};

/// Fan speed for a zone that is actively heating or cooling, modulated
/// around its nominal speed by how far it still has to go. Large errors
/// boost toward high; very close to target the fan eases one level below
/// nominal so the zone does not blow past its setpoint.
pub fn conditioning_fan_speed(
    error_abs_f: f32,
    nominal: FanSpeed,
    config: &EngineConfig,
) -> FanSpeed {
    if error_abs_f > config.fan_high_error_f {
        FanSpeed::High
    } else if error_abs_f > config.fan_boost2_error_f {
        nominal.step_up(2)
    } else if error_abs_f > config.fan_boost1_error_f {
        nominal.step_up(1)
    } else if error_abs_f < config.fan_ease_error_f {
        nominal.step_down(1)
    } else {
        nominal
    }
}

/// Fan speed for a zone idling while the compressor serves the other zone.
/// With meaningful predicted leakage the fan drops to quiet to limit how
/// much of the stray refrigerant flow gets circulated; otherwise the zone
/// keeps its nominal speed for plain air circulation.
pub fn idle_fan_speed(nominal: FanSpeed, leakage_concern: bool) -> FanSpeed {
    if leakage_concern {
        FanSpeed::Quiet
    } else {
        nominal
    }
}
