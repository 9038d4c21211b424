use serde::{Deserialize, Serialize};

use crate::types::{FanSpeed, ZonePair};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionPolicy {
    /// Jump straight to `max_deadband_f` once the start limit is hit.
    Step,
    /// Widen proportionally as the start count approaches the limit.
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub update_interval_secs: u64,
    pub base_deadband_f: f32,
    pub max_deadband_f: f32,
    pub deadband_expansion: ExpansionPolicy,
    /// Fraction of the deadband below which a held heat/cool mode releases.
    pub hysteresis_fraction: f32,
    pub conflict_threshold_f: f32,
    pub min_offset_f: f32,
    pub max_offset_f: f32,
    pub max_starts_per_hour: usize,
    pub min_compressor_runtime_secs: i64,
    pub min_compressor_off_time_secs: i64,
    pub ema_alpha: f32,
    /// Samples averaged directly before the EMA takes over.
    pub direct_average_samples: u32,
    /// Rates at or below this are treated as unknown for predictions.
    pub min_rate_f_per_min: f32,
    pub min_leakage_delta_f: f32,
    pub history_len: usize,
    pub temp_stale_timeout_secs: i64,
    pub min_target_f: f32,
    pub max_target_f: f32,
    pub min_valid_temp_f: f32,
    pub max_valid_temp_f: f32,
    pub fan_high_error_f: f32,
    pub fan_boost2_error_f: f32,
    pub fan_boost1_error_f: f32,
    pub fan_ease_error_f: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 60,
            base_deadband_f: 0.5,
            max_deadband_f: 1.5,
            deadband_expansion: ExpansionPolicy::Step,
            hysteresis_fraction: 0.5,
            conflict_threshold_f: 2.0,
            min_offset_f: 0.3,
            max_offset_f: 4.0,
            max_starts_per_hour: 3,
            min_compressor_runtime_secs: 180,
            min_compressor_off_time_secs: 180,
            ema_alpha: 0.3,
            direct_average_samples: 3,
            min_rate_f_per_min: 0.001,
            min_leakage_delta_f: 0.05,
            history_len: 10,
            temp_stale_timeout_secs: 300,
            min_target_f: 50.0,
            max_target_f: 90.0,
            min_valid_temp_f: -40.0,
            max_valid_temp_f: 150.0,
            fan_high_error_f: 5.0,
            fan_boost2_error_f: 3.0,
            fan_boost1_error_f: 1.5,
            fan_ease_error_f: 0.5,
        }
    }
}

impl EngineConfig {
    pub fn sanitize(&mut self) {
        self.update_interval_secs = self.update_interval_secs.clamp(5, 600);
        self.base_deadband_f = self.base_deadband_f.clamp(0.1, 5.0);
        self.max_deadband_f = self.max_deadband_f.clamp(self.base_deadband_f, 10.0);
        self.hysteresis_fraction = self.hysteresis_fraction.clamp(0.0, 1.0);
        self.conflict_threshold_f = self.conflict_threshold_f.clamp(0.0, 10.0);
        self.min_offset_f = self.min_offset_f.clamp(0.0, 2.0);
        self.max_offset_f = self.max_offset_f.clamp(self.min_offset_f, 10.0);
        self.max_starts_per_hour = self.max_starts_per_hour.clamp(1, 20);
        self.min_compressor_runtime_secs = self.min_compressor_runtime_secs.clamp(0, 3_600);
        self.min_compressor_off_time_secs = self.min_compressor_off_time_secs.clamp(0, 3_600);
        self.ema_alpha = self.ema_alpha.clamp(0.01, 1.0);
        self.direct_average_samples = self.direct_average_samples.clamp(1, 10);
        self.history_len = self.history_len.clamp(2, 100);
        self.temp_stale_timeout_secs = self.temp_stale_timeout_secs.clamp(30, 3_600);
        if self.min_target_f >= self.max_target_f {
            self.min_target_f = 50.0;
            self.max_target_f = 90.0;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneDefaults {
    pub target_f: f32,
    pub nominal_fan: FanSpeed,
}

impl Default for ZoneDefaults {
    fn default() -> Self {
        Self {
            target_f: 70.0,
            nominal_fan: FanSpeed::Medium,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub engine: EngineConfig,
    pub zones: ZonePair<ZoneDefaults>,
    pub network: NetworkConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_max_deadband_above_base() {
        let mut config = EngineConfig {
            base_deadband_f: 2.0,
            max_deadband_f: 0.5,
            ..EngineConfig::default()
        };
        config.sanitize();
        assert!(config.max_deadband_f >= config.base_deadband_f);
    }

    #[test]
    fn sanitize_restores_inverted_target_range() {
        let mut config = EngineConfig {
            min_target_f: 95.0,
            max_target_f: 60.0,
            ..EngineConfig::default()
        };
        config.sanitize();
        assert!(config.min_target_f < config.max_target_f);
    }
}
