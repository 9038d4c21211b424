use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    compensation::{self, Compensation},
    compressor::{CompressorState, GuardVerdict},
    config::{EngineConfig, RuntimeConfig, ZoneDefaults},
    deadband, fan,
    rates::ZoneRates,
    resolver::{self, Resolution},
    types::{FanSpeed, HvacMode, TelemetrySnapshot, ZoneId, ZonePair, ZoneTelemetry},
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("temperature reading {0}°F is not usable")]
    InvalidTemperature(f32),
    #[error("target {value}°F is outside {min}..{max}°F")]
    TargetOutOfRange { value: f32, min: f32, max: f32 },
    #[error("unknown zone '{0}'")]
    UnknownZone(String),
    #[error("unknown fan speed '{0}'")]
    UnknownFanSpeed(String),
    #[error("unknown enabled value '{0}'")]
    UnknownEnabledValue(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneState {
    pub target_f: f32,
    pub nominal_fan: FanSpeed,
    /// Decision applied last tick; feeds the next tick's hysteresis.
    pub hvac_mode: HvacMode,
    pub fan_speed: FanSpeed,
    pub rates: ZoneRates,
    pub current_temp_f: Option<f32>,
    pub last_update: Option<DateTime<Utc>>,
}

impl ZoneState {
    fn from_defaults(defaults: &ZoneDefaults) -> Self {
        Self {
            target_f: defaults.target_f,
            nominal_fan: defaults.nominal_fan,
            hvac_mode: HvacMode::Off,
            fan_speed: defaults.nominal_fan,
            rates: ZoneRates::default(),
            current_temp_f: None,
            last_update: None,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>, config: &EngineConfig) -> bool {
        self.current_temp_f.is_some()
            && self
                .last_update
                .map(|at| (now - at).num_seconds() <= config.temp_stale_timeout_secs)
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub enabled: bool,
    pub zones: ZonePair<ZoneState>,
    pub compressor: CompressorState,
    pub last_lead: Option<ZoneId>,
}

impl EngineState {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            enabled: true,
            zones: ZonePair::new(
                ZoneState::from_defaults(&config.zones.zone1),
                ZoneState::from_defaults(&config.zones.zone2),
            ),
            compressor: CompressorState::default(),
            last_lead: None,
        }
    }
}

/// Mode/fan changes to push to one physical unit. Fields are `None` when the
/// computed value matches what was last applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneCommand {
    pub zone: ZoneId,
    pub mode: Option<HvacMode>,
    pub fan: Option<FanSpeed>,
}

/// Everything one tick decided, for the host to apply and log.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub commands: Vec<ZoneCommand>,
    pub modes: ZonePair<HvacMode>,
    pub fans: ZonePair<FanSpeed>,
    pub resolution: Resolution,
    pub compensation: Option<Compensation>,
    pub guard: GuardVerdict,
    pub deadband_f: f32,
    pub stale_zones: Vec<ZoneId>,
}

/// The control engine proper: owns the aggregate state, performs no I/O,
/// and is driven by `tick` once per interval. Temperature readings and user
/// commands are pushed in between ticks; their effect lands on the next one.
#[derive(Debug, Clone)]
pub struct DualZoneEngine {
    pub config: EngineConfig,
    state: EngineState,
}

impl DualZoneEngine {
    pub fn new(mut config: EngineConfig, state: EngineState) -> Self {
        config.sanitize();
        Self { config, state }
    }

    pub fn from_config(runtime: &RuntimeConfig) -> Self {
        Self::new(runtime.engine.clone(), EngineState::from_config(runtime))
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn update_temperature(
        &mut self,
        zone: ZoneId,
        temp_f: f32,
        now: DateTime<Utc>,
    ) -> Result<(), CommandError> {
        if !temp_f.is_finite()
            || temp_f < self.config.min_valid_temp_f
            || temp_f > self.config.max_valid_temp_f
        {
            return Err(CommandError::InvalidTemperature(temp_f));
        }
        let zone = self.state.zones.get_mut(zone);
        zone.current_temp_f = Some(temp_f);
        zone.last_update = Some(now);
        Ok(())
    }

    pub fn set_target(&mut self, zone: ZoneId, target_f: f32) -> Result<bool, CommandError> {
        if !target_f.is_finite()
            || target_f < self.config.min_target_f
            || target_f > self.config.max_target_f
        {
            return Err(CommandError::TargetOutOfRange {
                value: target_f,
                min: self.config.min_target_f,
                max: self.config.max_target_f,
            });
        }
        let zone = self.state.zones.get_mut(zone);
        if (zone.target_f - target_f).abs() > f32::EPSILON {
            zone.target_f = target_f;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn set_nominal_fan(&mut self, zone: ZoneId, speed: FanSpeed) -> bool {
        let zone = self.state.zones.get_mut(zone);
        if zone.nominal_fan != speed {
            zone.nominal_fan = speed;
            true
        } else {
            false
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        if self.state.enabled != enabled {
            self.state.enabled = enabled;
            true
        } else {
            false
        }
    }

    pub fn reset_learning(&mut self) {
        self.state.zones.zone1.rates.reset();
        self.state.zones.zone2.rates.reset();
    }

    pub fn telemetry(&self, now: DateTime<Utc>) -> TelemetrySnapshot {
        let recent = self.state.compressor.recent_starts(now);
        TelemetrySnapshot {
            enabled: self.state.enabled,
            zone1: self.zone_telemetry(ZoneId::Zone1),
            zone2: self.zone_telemetry(ZoneId::Zone2),
            compressor_running: self.state.compressor.running,
            compressor_starts_last_hour: recent,
            current_deadband_f: deadband::current_deadband(&self.config, recent),
        }
    }

    fn zone_telemetry(&self, id: ZoneId) -> ZoneTelemetry {
        let zone = self.state.zones.get(id);
        ZoneTelemetry {
            current_temp_f: zone.current_temp_f,
            target_f: zone.target_f,
            mode: zone.hvac_mode.as_str(),
            fan_speed: zone.fan_speed.as_str(),
            nominal_fan: zone.nominal_fan.as_str(),
            heating_rate: zone.rates.heating.snapshot(&self.config),
            cooling_rate: zone.rates.cooling.snapshot(&self.config),
            leakage_rate: zone.rates.leakage.snapshot(&self.config),
        }
    }

    /// One control cycle. The only mutation path besides the command
    /// setters; both zones are decided from a single consistent snapshot.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        if !self.state.enabled {
            return self.tick_disabled(now);
        }

        let fresh = self.state.zones.map(|_, z| z.is_fresh(now, &self.config));
        let stale_zones: Vec<ZoneId> = ZoneId::BOTH
            .into_iter()
            .filter(|id| !*fresh.get(*id))
            .collect();

        self.learn(now, &fresh);

        let recent_starts = self.state.compressor.recent_starts(now);
        let deadband_f = deadband::current_deadband(&self.config, recent_starts);
        self.state.compressor.current_deadband_f = deadband_f;

        let errors = self.state.zones.map(|id, z| {
            if *fresh.get(id) {
                z.current_temp_f.map(|t| z.target_f - t)
            } else {
                None
            }
        });

        // A zone with no usable reading holds its previous mode this tick.
        let mut desired = self.state.zones.map(|id, z| match *errors.get(id) {
            Some(error_f) => resolver::desired_mode(error_f, deadband_f, z.hvac_mode, &self.config),
            None => z.hvac_mode,
        });

        let resolution = resolver::resolve(
            desired.zone1,
            desired.zone2,
            errors.zone1.unwrap_or(0.0),
            errors.zone2.unwrap_or(0.0),
            self.state.last_lead,
            &self.config,
        );
        if let Resolution::Conflict { passive, .. } = resolution {
            *desired.get_mut(passive) = HvacMode::FanOnly;
        }

        let (compensation, leakage_concern) =
            self.compensate(&mut desired, &errors, resolution, deadband_f);

        match (desired.zone1.is_active(), desired.zone2.is_active()) {
            (true, false) => self.state.last_lead = Some(ZoneId::Zone1),
            (false, true) => self.state.last_lead = Some(ZoneId::Zone2),
            _ => {}
        }

        let want_running = desired.zone1.is_active() || desired.zone2.is_active();
        let guard = self.state.compressor.evaluate(want_running, now, &self.config);
        match guard {
            GuardVerdict::HeldOff { .. } => {
                for id in ZoneId::BOTH {
                    if desired.get(id).is_active() {
                        *desired.get_mut(id) = HvacMode::FanOnly;
                    }
                }
            }
            GuardVerdict::HeldOn { .. } => {
                for id in ZoneId::BOTH {
                    let previous = self.state.zones.get(id).hvac_mode;
                    if previous.is_active() {
                        *desired.get_mut(id) = previous;
                    }
                }
            }
            _ => {}
        }

        let fans = self.state.zones.map(|id, z| match *desired.get(id) {
            HvacMode::Heat | HvacMode::Cool => fan::conditioning_fan_speed(
                (*errors.get(id)).unwrap_or(0.0).abs(),
                z.nominal_fan,
                &self.config,
            ),
            HvacMode::FanOnly => fan::idle_fan_speed(z.nominal_fan, *leakage_concern.get(id)),
            HvacMode::Off => FanSpeed::Quiet,
        });

        let commands = self.apply(&desired, &fans);

        TickReport {
            commands,
            modes: desired,
            fans,
            resolution,
            compensation,
            guard,
            deadband_f,
            stale_zones,
        }
    }

    fn tick_disabled(&mut self, now: DateTime<Utc>) -> TickReport {
        let guard = self.state.compressor.evaluate(false, now, &self.config);

        let mut desired = ZonePair::new(HvacMode::Off, HvacMode::Off);
        if matches!(guard, GuardVerdict::HeldOn { .. }) {
            for id in ZoneId::BOTH {
                let previous = self.state.zones.get(id).hvac_mode;
                if previous.is_active() {
                    *desired.get_mut(id) = previous;
                }
            }
        }

        let fans = self.state.zones.map(|id, z| {
            if desired.get(id).is_active() {
                z.fan_speed
            } else {
                FanSpeed::Quiet
            }
        });

        let recent_starts = self.state.compressor.recent_starts(now);
        let deadband_f = deadband::current_deadband(&self.config, recent_starts);
        self.state.compressor.current_deadband_f = deadband_f;
        let commands = self.apply(&desired, &fans);

        TickReport {
            commands,
            modes: desired,
            fans,
            resolution: Resolution::NoConflict,
            compensation: None,
            guard,
            deadband_f,
            stale_zones: Vec::new(),
        }
    }

    fn learn(&mut self, now: DateTime<Utc>, fresh: &ZonePair<bool>) {
        let applied = self.state.zones.map(|_, z| (z.hvac_mode, z.target_f));
        for id in ZoneId::BOTH {
            if !*fresh.get(id) {
                continue;
            }
            let (other_mode, other_target_f) = *applied.get(id.other());
            let zone = self.state.zones.get_mut(id);
            let Some(temp_f) = zone.current_temp_f else {
                continue;
            };
            let own_mode = zone.hvac_mode;
            let own_target_f = zone.target_f;
            zone.rates.record_sample(
                temp_f,
                now,
                own_mode,
                own_target_f,
                other_mode,
                other_target_f,
                &self.config,
            );
        }
    }

    /// Leakage compensation over the resolved modes. Returns the applied
    /// compensation (if any) and the per-zone leakage-exposure flags the fan
    /// calculator keys off. The shifted comparison target may release a zone
    /// into fan-only or let it keep its mode; it is never allowed to
    /// manufacture a new opposing-active pair inside the same tick.
    fn compensate(
        &self,
        desired: &mut ZonePair<HvacMode>,
        errors: &ZonePair<Option<f32>>,
        resolution: Resolution,
        deadband_f: f32,
    ) -> (Option<Compensation>, ZonePair<bool>) {
        let mut leakage_concern = ZonePair::new(false, false);

        let active1 = desired.zone1.is_active();
        let active2 = desired.zone2.is_active();

        if active1 && active2 && desired.zone1 == desired.zone2 {
            let run_mode = desired.zone1;
            let (Some(error1_f), Some(error2_f)) = (errors.zone1, errors.zone2) else {
                return (None, leakage_concern);
            };
            let compensation = compensation::shared_run_compensation(
                run_mode,
                error1_f,
                error2_f,
                &self.state.zones.zone1.rates,
                &self.state.zones.zone2.rates,
                &self.config,
            );
            if let Some(comp) = compensation {
                if let Some(error_f) = *errors.get(comp.zone) {
                    let previous = self.state.zones.get(comp.zone).hvac_mode;
                    let shifted = resolver::desired_mode(
                        error_f + comp.offset_f,
                        deadband_f,
                        previous,
                        &self.config,
                    );
                    *desired.get_mut(comp.zone) = if shifted == run_mode {
                        shifted
                    } else {
                        HvacMode::FanOnly
                    };
                }
            }
            return (compensation, leakage_concern);
        }

        let lead_id = match (active1, active2) {
            (true, false) => ZoneId::Zone1,
            (false, true) => ZoneId::Zone2,
            _ => return (None, leakage_concern),
        };
        let passive_id = lead_id.other();
        let lead_mode = *desired.get(lead_id);
        let Some(lead_error_f) = *errors.get(lead_id) else {
            return (None, leakage_concern);
        };

        let compensation = compensation::passive_compensation(
            lead_mode,
            lead_error_f,
            &self.state.zones.get(lead_id).rates,
            passive_id,
            &self.state.zones.get(passive_id).rates,
            &self.config,
        );
        if let Some(comp) = compensation {
            *leakage_concern.get_mut(passive_id) = true;

            let conflict_forced =
                matches!(resolution, Resolution::Conflict { passive, .. } if passive == passive_id);
            if !conflict_forced {
                if let Some(passive_error_f) = *errors.get(passive_id) {
                    let previous = self.state.zones.get(passive_id).hvac_mode;
                    let shifted = resolver::desired_mode(
                        passive_error_f + comp.offset_f,
                        deadband_f,
                        previous,
                        &self.config,
                    );
                    *desired.get_mut(passive_id) = if shifted == lead_mode {
                        shifted
                    } else {
                        HvacMode::FanOnly
                    };
                }
            }
        }

        (compensation, leakage_concern)
    }

    fn apply(&mut self, desired: &ZonePair<HvacMode>, fans: &ZonePair<FanSpeed>) -> Vec<ZoneCommand> {
        let mut commands = Vec::new();
        for id in ZoneId::BOTH {
            let zone = self.state.zones.get_mut(id);
            let mode = *desired.get(id);
            let fan_speed = *fans.get(id);

            let mut command = ZoneCommand {
                zone: id,
                mode: None,
                fan: None,
            };
            if mode != zone.hvac_mode {
                zone.hvac_mode = mode;
                command.mode = Some(mode);
            }
            if fan_speed != zone.fan_speed {
                zone.fan_speed = fan_speed;
                command.fan = Some(fan_speed);
            }
            if command.mode.is_some() || command.fan.is_some() {
                commands.push(command);
            }
        }
        commands
    }
}
