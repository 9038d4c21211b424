use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneId {
    Zone1,
    Zone2,
}

impl ZoneId {
    pub const BOTH: [ZoneId; 2] = [ZoneId::Zone1, ZoneId::Zone2];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zone1 => "zone1",
            Self::Zone2 => "zone2",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Zone1 => Self::Zone2,
            Self::Zone2 => Self::Zone1,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "zone1" => Some(Self::Zone1),
            "zone2" => Some(Self::Zone2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Heat,
    Cool,
    FanOnly,
    Off,
}

impl HvacMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::FanOnly => "fan_only",
            Self::Off => "off",
        }
    }

    /// Heat and cool are the modes that demand the shared compressor.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Heat | Self::Cool)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanSpeed {
    Quiet,
    Low,
    Medium,
    High,
}

impl FanSpeed {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quiet => "quiet",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "quiet" => Some(Self::Quiet),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Self::Quiet => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Self::Quiet,
            1 => Self::Low,
            2 => Self::Medium,
            _ => Self::High,
        }
    }

    pub fn step_up(self, levels: u8) -> Self {
        Self::from_level(self.level().saturating_add(levels).min(3))
    }

    pub fn step_down(self, levels: u8) -> Self {
        Self::from_level(self.level().saturating_sub(levels))
    }
}

/// Fixed two-element zone collection. Lead/passive assignments are expressed
/// as tagged [`ZoneId`] values rather than flags on the zones themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ZonePair<T> {
    pub zone1: T,
    pub zone2: T,
}

impl<T> ZonePair<T> {
    pub fn new(zone1: T, zone2: T) -> Self {
        Self { zone1, zone2 }
    }

    pub fn get(&self, id: ZoneId) -> &T {
        match id {
            ZoneId::Zone1 => &self.zone1,
            ZoneId::Zone2 => &self.zone2,
        }
    }

    pub fn get_mut(&mut self, id: ZoneId) -> &mut T {
        match id {
            ZoneId::Zone1 => &mut self.zone1,
            ZoneId::Zone2 => &mut self.zone2,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(ZoneId, &T) -> U) -> ZonePair<U> {
        ZonePair {
            zone1: f(ZoneId::Zone1, &self.zone1),
            zone2: f(ZoneId::Zone2, &self.zone2),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ZoneId, &T)> {
        [(ZoneId::Zone1, &self.zone1), (ZoneId::Zone2, &self.zone2)].into_iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningStatus {
    Learning,
    Active,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateSnapshot {
    #[serde(rename = "fPerMin")]
    pub f_per_min: f32,
    pub samples: u32,
    pub status: LearningStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneTelemetry {
    #[serde(rename = "currentTemp")]
    pub current_temp_f: Option<f32>,
    #[serde(rename = "targetTemp")]
    pub target_f: f32,
    pub mode: &'static str,
    #[serde(rename = "fanSpeed")]
    pub fan_speed: &'static str,
    #[serde(rename = "nominalFanSpeed")]
    pub nominal_fan: &'static str,
    #[serde(rename = "heatingRate")]
    pub heating_rate: RateSnapshot,
    #[serde(rename = "coolingRate")]
    pub cooling_rate: RateSnapshot,
    #[serde(rename = "leakageRate")]
    pub leakage_rate: RateSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub enabled: bool,
    pub zone1: ZoneTelemetry,
    pub zone2: ZoneTelemetry,
    #[serde(rename = "compressorRunning")]
    pub compressor_running: bool,
    #[serde(rename = "compressorStartsLastHour")]
    pub compressor_starts_last_hour: usize,
    #[serde(rename = "currentDeadband")]
    pub current_deadband_f: f32,
}
